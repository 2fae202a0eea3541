//! Data models for location enrichment.

mod enrichment;
mod location;
pub mod states;

pub use enrichment::{
    CombinedEnrichmentResult, CrimeData, EnrichmentError, ErrorSource, SchoolConfidence,
    SchoolData, SchoolInfo, SchoolLevel, SchoolSearchPath, SiteResult, StrategyKind, WalkabilityData,
};
pub use location::LocationQuery;
