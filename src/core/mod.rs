pub mod aggregate;
pub mod dedup;
pub mod etl;
pub mod similarity;

pub use crate::domain::model::{
    Coordinate, EnrichmentRecord, Place, SourcePlace, TransformResult, UpsertStats,
};
pub use crate::domain::ports::{Enricher, Pipeline, PlaceStore, SourceFetcher, Storage};
pub use crate::utils::error::Result;
