use crate::core::Pipeline;
use crate::domain::model::UpsertStats;
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub sources: usize,
    pub matched: usize,
    pub placeholders: usize,
    pub enrichment_skipped: bool,
    pub places: usize,
    pub upsert: UpsertStats,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn inserted(&self) -> usize {
        self.upsert.inserted
    }
}

/// Summary returned to whatever triggered the run. Never carries internal error detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub message: String,
    pub places_count: usize,
}

impl RunReport {
    pub fn from_result(result: &Result<RunStats>) -> Self {
        match result {
            Ok(stats) => Self {
                success: true,
                message: format!(
                    "Processed {} source places: {} new, {} updated, {} unchanged, {} failed",
                    stats.sources,
                    stats.upsert.inserted,
                    stats.upsert.updated,
                    stats.upsert.unchanged,
                    stats.upsert.failed
                ),
                places_count: stats.inserted(),
            },
            Err(e) => Self::failure(e),
        }
    }

    /// Report for a background run, which only yields the number of new places.
    pub fn from_inserted(result: &Result<usize>) -> Self {
        match result {
            Ok(inserted) => Self {
                success: true,
                message: format!("Pipeline finished with {} new places", inserted),
                places_count: *inserted,
            },
            Err(e) => Self::failure(e),
        }
    }

    fn failure(error: &EtlError) -> Self {
        Self {
            success: false,
            message: error.user_friendly_message(),
            places_count: 0,
        }
    }
}

pub struct EtlEngine<P: Pipeline> {
    pipeline: Arc<P>,
}

impl<P: Pipeline + 'static> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<RunStats> {
        execute(self.pipeline.as_ref()).await
    }

    /// Runs the whole pipeline on the caller's task and returns the number of new places.
    pub async fn run_sync(&self) -> Result<usize> {
        self.run().await.map(|stats| stats.inserted())
    }

    /// Spawns the pipeline on the runtime; the handle resolves to the number of new places.
    pub fn run_async(&self) -> JoinHandle<Result<usize>> {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            execute(pipeline.as_ref())
                .await
                .map(|stats| stats.inserted())
        })
    }

    /// Waits for a background run and flattens task failures into [`EtlError`].
    pub async fn join(handle: JoinHandle<Result<usize>>) -> Result<usize> {
        handle.await.map_err(EtlError::from)?
    }

    pub async fn report(&self) -> RunReport {
        RunReport::from_result(&self.run().await)
    }
}

async fn execute<P: Pipeline + ?Sized>(pipeline: &P) -> Result<RunStats> {
    let started = Instant::now();
    tracing::info!("Starting place pipeline run");

    tracing::info!("Extracting source places...");
    let sources = pipeline.extract().await?;
    let source_count = sources.len();
    tracing::info!("Extracted {} source places", source_count);

    tracing::info!("Enriching and aggregating...");
    let transformed = pipeline.transform(sources).await?;
    tracing::info!(
        "Aggregated {} places ({} matched, {} placeholders{})",
        transformed.places.len(),
        transformed.matched,
        transformed.placeholders,
        if transformed.enrichment_skipped {
            ", enrichment skipped"
        } else {
            ""
        }
    );

    let place_count = transformed.places.len();
    tracing::info!("Loading places into the store...");
    let upsert = pipeline.load(transformed.places).await?;

    let stats = RunStats {
        sources: source_count,
        matched: transformed.matched,
        placeholders: transformed.placeholders,
        enrichment_skipped: transformed.enrichment_skipped,
        places: place_count,
        upsert,
        elapsed: started.elapsed(),
    };
    tracing::info!(
        "Run finished in {:?}: {} new places, {} updated",
        stats.elapsed,
        stats.upsert.inserted,
        stats.upsert.updated
    );
    Ok(stats)
}
