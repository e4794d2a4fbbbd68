use clap::Parser;
use place_etl::adapters::export::write_places_csv;
use place_etl::config::cli::Command;
use place_etl::core::PlaceStore;
use place_etl::utils::error::ErrorSeverity;
use place_etl::utils::{logger, validation::Validate};
use place_etl::{
    CliConfig, EtlEngine, EtlError, InMemoryPlaceStore, JsonPlaceStore, LocalStorage,
    PlacePipeline, RunReport, TomlConfig,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("📁 Loading configuration from: {}", cli.config);
    let config = match TomlConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }
    tracing::info!("✅ Configuration '{}' loaded", config.pipeline.name);

    match cli.command {
        Command::Run {
            background,
            dry_run,
        } => {
            let store: Arc<dyn PlaceStore> = if dry_run {
                tracing::info!("🔍 Dry run: places are kept in memory only");
                Arc::new(InMemoryPlaceStore::new())
            } else {
                match open_store(&config).await {
                    Ok(store) => store,
                    Err(e) => exit_with(&e),
                }
            };

            let pipeline = match PlacePipeline::from_config(&config, store) {
                Ok(pipeline) => pipeline,
                Err(e) => exit_with(&e),
            };
            let engine = EtlEngine::new(pipeline);

            let (report, error) = if background {
                let result = EtlEngine::<PlacePipeline<Arc<dyn PlaceStore>>>::join(engine.run_async()).await;
                (RunReport::from_inserted(&result), result.err())
            } else {
                let result = engine.run().await;
                (RunReport::from_result(&result), result.err())
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
            if let Some(e) = error {
                tracing::error!(
                    "❌ Pipeline failed: {} (Category: {:?}, Severity: {:?})",
                    e,
                    e.category(),
                    e.severity()
                );
                tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                std::process::exit(exit_code(e.severity()));
            }
        }
        Command::Count => {
            let store = open_store(&config).await?;
            println!("{}", store.count().await?);
        }
        Command::Export { output } => {
            let store = open_store(&config).await?;
            let places = store.all().await?;
            let csv = write_places_csv(&places)?;
            tokio::fs::write(&output, csv).await?;
            tracing::info!("📦 Exported {} places to {}", places.len(), output);
        }
    }

    Ok(())
}

async fn open_store(config: &TomlConfig) -> place_etl::Result<Arc<dyn PlaceStore>> {
    let storage = LocalStorage::new(config.storage.path.clone());
    let store = JsonPlaceStore::open(storage, config.storage.document.clone()).await?;
    Ok(Arc::new(store))
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn exit_with(e: &EtlError) -> ! {
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(e.severity()).max(1))
}
