//! `spt tier-advise`: static tier recommendation from pipeline definitions

use anyhow::Result;
use std::path::Path;

use super::{print_factors, print_recommendation, CommandContext};
use crate::output::{color_tier, print_envelope, print_error, print_success, OutputFormat};
use crate::registry::{self, RegistryError};
use advisor_lib::{Advisor, AdvisorError, OperationResult, Pipeline, TierAdvice};

const OPERATION: &str = "tier-advise";

/// Advise a tier for each named processor, or for an explicit file
///
/// Returns whether every target succeeded.
pub fn tier_advise(ctx: &CommandContext, processors: &[String], file: Option<&Path>) -> Result<bool> {
    let advisor = Advisor::new(ctx.settings.advisor.clone());

    let mut results: Vec<(String, OperationResult<TierAdvice>)> = Vec::new();
    if let Some(path) = file {
        let subject = path.display().to_string();
        results.push((subject, advise_one(&advisor, registry::load_file(path))));
    }
    for name in processors {
        results.push((name.clone(), advise_one(&advisor, ctx.registry.load(name))));
    }
    if results.is_empty() {
        let envelope: OperationResult<TierAdvice> =
            OperationResult::from_result(OPERATION, Err(AdvisorError::InsufficientInput));
        results.push(("-".to_string(), envelope));
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
            for (subject, result) in &results {
                render(subject, result);
            }
        }
    }
    Ok(all_ok)
}

fn advise_one(
    advisor: &Advisor,
    pipeline: Result<Pipeline, RegistryError>,
) -> OperationResult<TierAdvice> {
    match pipeline {
        Ok(pipeline) => OperationResult::from_result(OPERATION, advisor.tier_advise(&pipeline)),
        Err(e) => OperationResult::failure(OPERATION, e.report()),
    }
}

fn render(subject: &str, result: &OperationResult<TierAdvice>) {
    if let Some(error) = &result.error {
        print_error(subject, error);
        return;
    }
    let Some(advice) = &result.result else {
        return;
    };
    let name = advice.pipeline.as_deref().unwrap_or(subject);
    print_success(&format!(
        "{}: {} (complexity {:.1} over {} stages)",
        name,
        color_tier(advice.recommendation.tier),
        advice.score.total,
        advice.score.stage_count
    ));
    print_factors(&advice.score.ranked_factors());
    print_recommendation(&advice.recommendation);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use std::fs;
    use tempfile::TempDir;

    fn context(dir: &Path) -> CommandContext {
        let settings = Settings {
            registry_dir: Some(dir.to_path_buf()),
            ..Settings::default()
        };
        CommandContext::new(settings, OutputFormat::Json)
    }

    #[test]
    fn test_registered_processor_succeeds() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("orders.json"),
            r#"[{"$source": {}}, {"$match": {"a": 1}}, {"$emit": {}}]"#,
        )
        .unwrap();

        let ok = tier_advise(&context(dir.path()), &["orders".to_string()], None).unwrap();
        assert!(ok);
    }

    #[test]
    fn test_missing_processor_fails() {
        let dir = TempDir::new().unwrap();
        let ok = tier_advise(&context(dir.path()), &["ghost".to_string()], None).unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_no_targets_is_insufficient_input() {
        let dir = TempDir::new().unwrap();
        let ok = tier_advise(&context(dir.path()), &[], None).unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_invalid_pipeline_in_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"[{"$match": {"a": 1}}]"#).unwrap();

        let ok = tier_advise(&context(dir.path()), &[], Some(&path)).unwrap();
        assert!(!ok);
    }
}
