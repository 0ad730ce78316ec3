//! Subcommand implementations.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::warn;
use verse_rag::{Corpus, IndexerConfig, MatchConfig};

use crate::cli::{Cli, Command, StoreKind};
use crate::server::{AppState, run_server};
use crate::services::Services;

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let services = Services::from_args(&cli.backend)?;

    match cli.command {
        Command::Load { corpus, reset, batch_size, concurrency, batch_delay_ms } => {
            if services.store_kind == StoreKind::Memory {
                warn!("loading into the in-memory store; the index is discarded when this command exits");
            }
            let config = IndexerConfig::builder()
                .batch_size(batch_size)
                .max_in_flight(concurrency)
                .batch_delay(Duration::from_millis(batch_delay_ms))
                .build()?;
            let builder = services.index_builder(config);
            if reset {
                builder.reset().await?;
            }
            let corpus = Corpus::from_json_file(&corpus)?;
            let report = builder.build(&corpus).await?;
            print_json(&report)?;
            Ok(if report.complete { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Command::Check { quote, timeout_ms, corpus } => {
            services.prepare(corpus.as_deref()).await?;
            let engine = services.match_engine(MatchConfig::default());
            let result = match timeout_ms {
                Some(ms) => engine.check_with_timeout(&quote, Duration::from_millis(ms)).await?,
                None => engine.check(&quote).await?,
            };
            print_json(&result)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Status { corpus } => {
            let corpus = services.prepare(corpus.as_deref()).await?;
            let engine = services.match_engine(MatchConfig::default());
            let status = match corpus {
                Some(corpus) => {
                    let readiness = engine.readiness(corpus.len()).await?;
                    json!({
                        "collection": services.collection,
                        "store": services.store.backend(),
                        "stored": readiness.stored,
                        "expected": readiness.expected,
                        "state": readiness.state,
                    })
                }
                None => json!({
                    "collection": services.collection,
                    "store": services.store.backend(),
                    "stored": engine.stored().await?,
                }),
            };
            print_json(&status)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Serve { bind, corpus, timeout_ms } => {
            let corpus = services.prepare(corpus.as_deref()).await?;
            let config = MatchConfig::builder().query_timeout(Duration::from_millis(timeout_ms)).build()?;
            let state = AppState {
                engine: Arc::new(services.match_engine(config)),
                expected: corpus.as_ref().map(Corpus::len),
            };
            run_server(bind, state).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
