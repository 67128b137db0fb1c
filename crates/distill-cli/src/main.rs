//! distill - run sources through the distillation queue
//!
//! Usage:
//!   distill notes.txt https://example.com/post
//!   distill --concurrency 3 --watch a.txt b.txt c.txt
//!   distill --describe
//!   distill --validate
//!   distill --test-connection

mod logging;

use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{info, warn};

use distill_core::{JobStatus, SourceKind, SummaryProvider, ValidationResult};
use distill_inference::{ProviderAdapter, ProviderConfig, ProviderRegistry};
use distill_jobs::{
    ExtractorRegistry, HttpTextExtractor, ProcessingQueue, QueueBuilder, QueueConfig, QueueEvent,
    TextFileExtractor,
};

/// Summarize files and web pages with a local or cloud model.
///
/// Provider settings come from DISTILL_MODE, DISTILL_PROVIDER, DISTILL_MODEL,
/// DISTILL_ENDPOINT, DISTILL_API_KEY and DISTILL_TIMEOUT_SECS (a .env file is
/// read when present). Reports are printed to stdout as JSON.
#[derive(Debug, Parser)]
#[command(name = "distill")]
#[command(version)]
struct Args {
    /// Files, URLs or YouTube links to distill
    sources: Vec<String>,

    /// Treat every source as url, youtube or file (default: detect)
    #[arg(short, long, value_parser = SourceKind::from_str)]
    kind: Option<SourceKind>,

    /// Jobs processed at once (default: JOB_MAX_CONCURRENT or 1)
    #[arg(short, long, value_name = "N")]
    concurrency: Option<usize>,

    /// Print queue events while jobs run
    #[arg(short, long)]
    watch: bool,

    /// Print the active provider configuration
    #[arg(long)]
    describe: bool,

    /// Check the provider configuration against the backend
    #[arg(long)]
    validate: bool,

    /// Round trip a trivial prompt and report latency
    #[arg(long)]
    test_connection: bool,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = logging::init(&logging::LogSettings::from_env());

    let provider_config = ProviderConfig::from_env().context("Invalid provider configuration")?;
    info!(
        provider = provider_config.provider.as_str(),
        model = %provider_config.model,
        "Provider configured"
    );

    if args.validate {
        let result = match ProviderAdapter::from_config(&provider_config) {
            Ok(adapter) => adapter.validate_configuration().await,
            Err(e) => ValidationResult::invalid(e.to_string()),
        };
        print_json(&result)?;
        return Ok(if result.valid {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let providers = Arc::new(ProviderRegistry::new(provider_config)?);

    if args.describe {
        print_json(&providers.describe())?;
    }
    if args.test_connection {
        let test = providers.test_connection().await;
        print_json(&test)?;
        if !test.success {
            return Ok(ExitCode::FAILURE);
        }
    }
    if args.sources.is_empty() {
        if !(args.describe || args.test_connection) {
            Args::command().print_help()?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let extractors = ExtractorRegistry::new()
        .with(Arc::new(TextFileExtractor::new()))
        .with(Arc::new(HttpTextExtractor::new()?));
    let kinds: Vec<_> = args
        .sources
        .iter()
        .map(|source| args.kind.unwrap_or_else(|| SourceKind::detect(source)))
        .collect();
    for (source, kind) in args.sources.iter().zip(&kinds) {
        if !extractors.has_extractor(*kind) {
            let available: Vec<_> = extractors
                .available_kinds()
                .iter()
                .map(|k| k.as_str())
                .collect();
            warn!(
                source = %source,
                kind = %kind,
                available = ?available,
                "No extractor for source kind; job will fail"
            );
        }
    }

    let queue = QueueBuilder::new(providers)
        .with_config(QueueConfig::from_env())
        .with_extractors(extractors)
        .build();
    if let Some(limit) = args.concurrency {
        queue.set_concurrency_limit(limit)?;
    }

    if args.watch {
        watch(&queue);
    }

    let mut ids = Vec::with_capacity(args.sources.len());
    for (source, kind) in args.sources.iter().zip(kinds) {
        ids.push(queue.submit(kind, source.as_str()).await?);
    }

    tokio::select! {
        _ = queue.wait_until_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping jobs");
            for id in &ids {
                queue.request_stop(*id).await;
            }
            queue.wait_until_idle().await;
        }
    }

    let reports: Vec<_> = ids.iter().filter_map(|id| queue.report(*id)).collect();
    print_json(&reports)?;

    let all_completed = reports
        .iter()
        .all(|r| r.job.status == JobStatus::Completed);
    Ok(if all_completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print queue events to stderr until the queue is dropped.
fn watch(queue: &ProcessingQueue) {
    let mut events = queue.events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let QueueEvent::JobStep { .. } = event {
                        // per-step noise already shows up in the logs
                        continue;
                    }
                    if let Ok(line) = serde_json::to_string(&event) {
                        eprintln!("{}", line);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event watcher fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_sources_and_flags() {
        let args =
            Args::try_parse_from(["distill", "-c", "3", "--watch", "a.txt", "https://x.io/p"])
                .unwrap();
        assert_eq!(args.sources, vec!["a.txt", "https://x.io/p"]);
        assert_eq!(args.concurrency, Some(3));
        assert!(args.watch);
        assert!(args.kind.is_none());
        assert!(!args.validate);
    }

    #[test]
    fn test_parse_kind_is_case_insensitive() {
        let args = Args::try_parse_from(["distill", "--kind", "YouTube", "abc"]).unwrap();
        assert_eq!(args.kind, Some(SourceKind::Youtube));
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(Args::try_parse_from(["distill", "--kind", "podcast", "a"]).is_err());
        assert!(Args::try_parse_from(["distill", "-c", "many", "a"]).is_err());
        assert!(Args::try_parse_from(["distill", "--bogus"]).is_err());
    }
}
