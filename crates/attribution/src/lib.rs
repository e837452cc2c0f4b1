#![warn(clippy::unwrap_used)]

//! Campaign-name parsing, attribution of campaign-days to business
//! dimensions, and promo-vs-UTM order deduplication.

pub mod dedup;
pub mod mapper;
pub mod parser;
pub mod promo;
pub mod unify;

pub use dedup::{ConversionLike, DedupOutcome, DedupStats, OrderDeduplicator};
pub use mapper::{Attribution, AttributionMapper, MappingOutcome, UnmappedValue};
pub use parser::{CampaignNameParser, ParseOutcome, ParseQuality};
pub use promo::{validate_row, validate_rows, PromoRow, RowRejection};
pub use unify::UnifiedRecordBuilder;
