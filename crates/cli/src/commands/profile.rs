//! `spt profile`: sample running processors and recommend tiers

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{print_recommendation, CommandContext};
use crate::client::AtlasClient;
use crate::output::{
    color_status, format_value, print_envelope, print_error, print_success, print_table,
    print_warning, OutputFormat,
};
use crate::registry::{self, RegistryError};
use advisor_lib::{
    Advisor, Metric, OperationResult, Pipeline, ProfileOutcome, ProfilerMetrics, StatsSource,
};

const OPERATION: &str = "profile";

/// Options for one `profile` invocation
#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    pub processors: Vec<String>,
    pub file: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub duration_secs: Option<u64>,
    pub continuous: bool,
    pub metrics_out: Option<PathBuf>,
}

/// Row for the metric summary table
#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "P95")]
    p95: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Trend")]
    trend: String,
}

/// Profile every requested processor concurrently
///
/// Returns whether every session produced a result.
pub async fn profile(ctx: &CommandContext, options: ProfileOptions) -> Result<bool> {
    if options.processors.is_empty() {
        anyhow::bail!("at least one processor name is required");
    }
    if options.file.is_some() && options.processors.len() > 1 {
        anyhow::bail!("--file can only be used when profiling a single processor");
    }

    let project = ctx
        .settings
        .project_id
        .clone()
        .context("project id is not configured (use --project or SPT_PROJECT_ID)")?;
    let workspace = ctx
        .settings
        .workspace
        .clone()
        .context("stream processing workspace is not configured (use --workspace or SPT_WORKSPACE)")?;

    let mut config = ctx.settings.advisor.clone();
    if let Some(secs) = options.interval_secs {
        config.sampler.interval_ms = secs.max(1) * 1000;
    }
    if options.continuous {
        config.sampler.duration_ms = None;
    } else if let Some(secs) = options.duration_secs {
        config.sampler.duration_ms = Some(secs * 1000);
    }

    let client = AtlasClient::new(
        ctx.settings.api_url(),
        project,
        workspace,
        ctx.settings.api_token.clone(),
        config.sampler.poll_timeout(),
    )?;
    let source: Arc<dyn StatsSource> = Arc::new(client);
    let advisor = Arc::new(Advisor::new(config));

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut sessions = JoinSet::new();
    let mut results: Vec<Option<(String, OperationResult<ProfileOutcome>)>> =
        (0..options.processors.len()).map(|_| None).collect();

    for (index, name) in options.processors.iter().enumerate() {
        let pipeline = match resolve_pipeline(ctx, name, options.file.as_deref()) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                results[index] = Some((name.clone(), OperationResult::failure(OPERATION, e.report())));
                continue;
            }
        };

        let advisor = Arc::clone(&advisor);
        let source = Arc::clone(&source);
        let cancel = cancel.clone();
        let name = name.clone();
        sessions.spawn(async move {
            let outcome = advisor
                .profile(source, &name, pipeline.as_ref(), cancel)
                .await;
            (index, name, OperationResult::from_result(OPERATION, outcome))
        });
    }

    while let Some(joined) = sessions.join_next().await {
        let (index, name, result) = joined.context("profiling task failed")?;
        results[index] = Some((name, result));
    }
    let results: Vec<_> = results.into_iter().flatten().collect();

    if let Some(path) = &options.metrics_out {
        write_metrics(path)?;
    }

    let all_ok = results.iter().all(|(_, r)| r.is_success());
    match ctx.format {
        OutputFormat::Json => {
            if results.len() == 1 {
                print_envelope(&results[0].1)?;
            } else {
                let envelopes: Vec<_> = results.iter().map(|(_, r)| r).collect();
                println!("{}", serde_json::to_string_pretty(&envelopes)?);
            }
        }
        OutputFormat::Table => {
            for (name, result) in &results {
                render(name, result);
            }
        }
    }
    Ok(all_ok)
}

/// Pipeline for a processor: explicit file, else the registry when present
///
/// A processor without a registered definition is profiled on metrics alone.
fn resolve_pipeline(
    ctx: &CommandContext,
    name: &str,
    file: Option<&Path>,
) -> Result<Option<Pipeline>, RegistryError> {
    if let Some(path) = file {
        return registry::load_file(path).map(Some);
    }
    match ctx.registry.load(name) {
        Ok(pipeline) => Ok(Some(pipeline)),
        Err(RegistryError::NotFound { .. }) => {
            info!(processor = %name, "No registered pipeline, profiling on metrics only");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing sessions with the samples collected so far");
            cancel.cancel();
        }
    });
}

fn write_metrics(path: &Path) -> Result<()> {
    let text = ProfilerMetrics::new().render()?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}

fn render(name: &str, result: &OperationResult<ProfileOutcome>) {
    if let Some(error) = &result.error {
        print_error(name, error);
        return;
    }
    let Some(outcome) = &result.result else {
        return;
    };

    let report = &outcome.sampler;
    print_success(&format!(
        "{}: {} after {} polls ({} samples, {} gaps, {} retries)",
        name,
        color_status(outcome.status),
        report.polls,
        report.snapshots,
        report.gaps,
        report.retries
    ));

    if let Some(summary) = &outcome.summary {
        let rows: Vec<MetricRow> = Metric::ALL
            .iter()
            .filter_map(|metric| summary.metric(*metric).map(|agg| (*metric, agg)))
            .map(|(metric, agg)| {
                let bytes = matches!(metric, Metric::MemoryBytes | Metric::StateSizeBytes);
                MetricRow {
                    metric: metric.to_string(),
                    mean: format_value(agg.mean, bytes),
                    p95: format_value(agg.p95, bytes),
                    min: format_value(agg.min, bytes),
                    max: format_value(agg.max, bytes),
                    trend: format!("{:?}", agg.trend),
                }
            })
            .collect();
        print_table(&rows);
        for alert in &summary.alerts {
            print_warning(alert);
        }
    }

    match &outcome.recommendation {
        Some(recommendation) => print_recommendation(recommendation),
        None => print_warning(
            "No samples were collected and no pipeline definition is available; pass --file for a static estimate",
        ),
    }
    println!();
}
