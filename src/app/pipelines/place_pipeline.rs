use crate::adapters::enrichment::PlacesClient;
use crate::adapters::http::RateLimitedClient;
use crate::adapters::listing::ListingFetcher;
use crate::config::toml_config::TomlConfig;
use crate::core::aggregate::Aggregator;
use crate::core::dedup::PlaceSink;
use crate::core::{
    Enricher, Pipeline, Place, PlaceStore, SourceFetcher, SourcePlace, TransformResult, UpsertStats,
};
use crate::utils::error::Result;
use std::sync::Arc;

/// Listing → enrichment → fusion → upsert, one place at a time.
pub struct PlacePipeline<S: PlaceStore> {
    fetcher: Arc<dyn SourceFetcher>,
    enricher: Option<Arc<dyn Enricher>>,
    aggregator: Aggregator,
    sink: PlaceSink<S>,
    sort_by_coordinates: bool,
}

impl<S: PlaceStore> PlacePipeline<S> {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        enricher: Option<Arc<dyn Enricher>>,
        sink: PlaceSink<S>,
    ) -> Self {
        Self {
            fetcher,
            enricher,
            aggregator: Aggregator::new(),
            sink,
            sort_by_coordinates: true,
        }
    }

    pub fn with_sort_by_coordinates(mut self, enabled: bool) -> Self {
        self.sort_by_coordinates = enabled;
        self
    }

    /// Wires the HTTP client, listing fetcher and places client from configuration.
    ///
    /// A missing API key is not fatal: the pipeline runs in source-only mode.
    pub fn from_config(config: &TomlConfig, store: S) -> Result<Self> {
        let client = Arc::new(RateLimitedClient::from_config(&config.http)?);
        let fetcher: Arc<dyn SourceFetcher> =
            Arc::new(ListingFetcher::from_config(config, Arc::clone(&client))?);

        let enricher: Option<Arc<dyn Enricher>> = match config.api_key() {
            Some(key) => Some(Arc::new(PlacesClient::new(
                Arc::clone(&client),
                &config.enrichment,
                key,
            ))),
            None => {
                tracing::error!(
                    "enrichment.api_key is not configured; places will be stored without coordinates or external ids"
                );
                None
            }
        };

        let sink = PlaceSink::new(store).with_min_description_len(config.storage.min_description_len);
        Ok(Self::new(fetcher, enricher, sink).with_sort_by_coordinates(config.pipeline.sort_by_coordinates))
    }

    pub fn store(&self) -> &S {
        self.sink.store()
    }

    pub fn has_enricher(&self) -> bool {
        self.enricher.is_some()
    }
}

/// Stable: sources with a coordinate first, otherwise in listing order.
pub fn order_by_known_coordinates(sources: &mut [SourcePlace]) {
    sources.sort_by_key(|source| source.coordinate.is_none());
}

#[async_trait::async_trait]
impl<S: PlaceStore> Pipeline for PlacePipeline<S> {
    async fn extract(&self) -> Result<Vec<SourcePlace>> {
        self.fetcher.fetch_all().await
    }

    async fn transform(&self, mut sources: Vec<SourcePlace>) -> Result<TransformResult> {
        if self.sort_by_coordinates {
            order_by_known_coordinates(&mut sources);
        }

        let Some(enricher) = &self.enricher else {
            return Ok(TransformResult {
                places: self.aggregator.aggregate(&sources, &[]),
                matched: 0,
                placeholders: 0,
                enrichment_skipped: true,
            });
        };

        // One lookup per source, in order: aggregation pairs the lists by position.
        let mut enrichments = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let record = enricher.enrich(&source.name, source.coordinate).await;
            tracing::debug!(
                "Enriched {}/{} '{}' -> {}",
                index + 1,
                sources.len(),
                source.name,
                record.external_id().unwrap_or("placeholder")
            );
            enrichments.push(record);
        }

        let placeholders = enrichments.iter().filter(|r| r.is_placeholder()).count();
        Ok(TransformResult {
            places: self.aggregator.aggregate(&sources, &enrichments),
            matched: enrichments.len() - placeholders,
            placeholders,
            enrichment_skipped: false,
        })
    }

    async fn load(&self, places: Vec<Place>) -> Result<UpsertStats> {
        // Fail the run up front if the store is unreachable; per-record errors are contained below.
        let before = self.sink.store().count().await?;
        tracing::debug!("Store holds {} places before load", before);
        Ok(self.sink.upsert(places).await)
    }
}
