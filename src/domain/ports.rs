use crate::domain::model::{
    Coordinate, EnrichmentRecord, Place, SourcePlace, TransformResult, UpsertStats,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Raw byte storage underneath file-backed place stores.
pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;

    /// Held while a file is read, modified and written back. Released on drop.
    type Guard: Send;

    /// Exclusive lock on `path`, shared by every process using the same storage.
    fn lock(&self, path: &str) -> impl std::future::Future<Output = Result<Self::Guard>> + Send;
}

/// Durable place storage consumed by the dedup sink.
#[async_trait]
pub trait PlaceStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Place>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Place>>;
    /// Inserts a new record and returns it with its storage-assigned id.
    async fn insert(&self, place: Place) -> Result<Place>;
    /// Replaces the record with the same id.
    async fn update(&self, place: &Place) -> Result<()>;
    async fn count(&self) -> Result<usize>;
    async fn all(&self) -> Result<Vec<Place>>;
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<SourcePlace>>;
}

/// Never fails: lookups that go wrong yield a placeholder record.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, name: &str, coordinate: Option<Coordinate>) -> EnrichmentRecord;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<SourcePlace>>;
    async fn transform(&self, sources: Vec<SourcePlace>) -> Result<TransformResult>;
    async fn load(&self, places: Vec<Place>) -> Result<UpsertStats>;
}
