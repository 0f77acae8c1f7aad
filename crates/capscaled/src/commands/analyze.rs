//! `capscaled analyze`: recommendations without side effects.

use capscale_core::{CapacityModel, CapscaleConfig};
use capscale_engine::Recommendation;
use capscale_metrics::render_recommendations;

use crate::AnalyzeFormat;
use crate::backend::Backend;

pub async fn analyze(config: CapscaleConfig, format: AnalyzeFormat) -> anyhow::Result<()> {
    let backend = Backend::connect(&config)?;
    let recommendations = backend.evaluator(&config).analyze().await?;
    print!("{}", render(&recommendations, &config.model, format)?);
    Ok(())
}

fn render(
    recommendations: &[Recommendation],
    model: &CapacityModel,
    format: AnalyzeFormat,
) -> anyhow::Result<String> {
    let out = match format {
        AnalyzeFormat::Json => format!("{}\n", serde_json::to_string_pretty(recommendations)?),
        AnalyzeFormat::Prometheus => render_recommendations(recommendations, model),
        AnalyzeFormat::Text => {
            let changes = recommendations
                .iter()
                .filter(|r| r.current_units.unwrap_or(0) != r.recommended_units)
                .count();
            let mut out = format!(
                "{} tenants analyzed, {changes} would change\n",
                recommendations.len()
            );
            for r in recommendations {
                out.push_str(&format!("  {r}\n"));
            }
            out
        }
    };
    Ok(out)
}
