//! CLI command implementations

pub mod advise;
pub mod profile;

use crate::config::Settings;
use crate::output::{color_confidence, color_tier, print_info, print_table, print_warning, OutputFormat};
use crate::registry::PipelineRegistry;
use advisor_lib::{Basis, Recommendation};
use tabled::Tabled;

/// Everything a command needs from global options and settings
pub struct CommandContext {
    pub settings: Settings,
    pub registry: PipelineRegistry,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn new(settings: Settings, format: OutputFormat) -> Self {
        let registry = PipelineRegistry::new(settings.registry_dir());
        Self {
            settings,
            registry,
            format,
        }
    }
}

/// Row for the complexity factor table
#[derive(Tabled)]
pub(crate) struct FactorRow {
    #[tabled(rename = "Factor")]
    pub factor: String,
    #[tabled(rename = "Contribution")]
    pub contribution: String,
}

pub(crate) fn print_recommendation(recommendation: &Recommendation) {
    let basis = match recommendation.basis {
        Basis::Static => "static",
        Basis::Dynamic => "dynamic",
        Basis::Combined => "combined",
    };
    let mut line = format!(
        "Recommended tier {} ({} basis, {} confidence)",
        color_tier(recommendation.tier),
        basis,
        color_confidence(recommendation.confidence)
    );
    if let Some(current) = recommendation.current_tier {
        line.push_str(&format!(", currently {}", current));
    }
    print_info(&line);

    for reason in &recommendation.rationale {
        println!("  - {}", reason);
    }
    for flag in &recommendation.flags {
        print_warning(&format!("{:?}", flag));
    }
}

pub(crate) fn print_factors(factors: &[(&str, f64)]) {
    let rows: Vec<FactorRow> = factors
        .iter()
        .map(|(factor, value)| FactorRow {
            factor: factor.to_string(),
            contribution: format!("+{:.1}", value),
        })
        .collect();
    print_table(&rows);
}
