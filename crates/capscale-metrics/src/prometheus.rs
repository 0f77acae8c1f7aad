//! Prometheus text exposition of capacity recommendations.
//!
//! Renders the output of a read-only analysis pass so it can be scraped
//! or pushed to a gateway alongside the control loop's logs.

use capscale_core::CapacityModel;
use capscale_engine::{DecisionEngine, Recommendation};

/// Render recommendations into Prometheus text format.
///
/// Produces GAUGE metrics with `tenant` labels. Utilization is load over
/// the capacity implied by the observed limit; tenants on the base tier
/// are measured against one unit of base capacity.
pub fn render_recommendations(recs: &[Recommendation], model: &CapacityModel) -> String {
    let engine = DecisionEngine::new(*model);
    let mut out = String::new();

    out.push_str("# HELP capscale_recommended_units Recommended capacity units (0 = on-demand).\n");
    out.push_str("# TYPE capscale_recommended_units gauge\n");
    for r in recs {
        out.push_str(&format!(
            "capscale_recommended_units{{tenant=\"{}\"}} {}\n",
            escape(&r.tenant),
            r.recommended_units
        ));
    }

    out.push_str("# HELP capscale_current_units Capacity units reported by the control plane.\n");
    out.push_str("# TYPE capscale_current_units gauge\n");
    for r in recs {
        out.push_str(&format!(
            "capscale_current_units{{tenant=\"{}\"}} {}\n",
            escape(&r.tenant),
            r.current_units.unwrap_or(0)
        ));
    }

    out.push_str("# HELP capscale_observed_limit Observed entitlement limit per second.\n");
    out.push_str("# TYPE capscale_observed_limit gauge\n");
    for r in recs {
        out.push_str(&format!(
            "capscale_observed_limit{{tenant=\"{}\"}} {:.2}\n",
            escape(&r.tenant),
            r.limit
        ));
    }

    out.push_str("# HELP capscale_observed_load Observed load per second.\n");
    out.push_str("# TYPE capscale_observed_load gauge\n");
    for r in recs {
        out.push_str(&format!(
            "capscale_observed_load{{tenant=\"{}\"}} {:.2}\n",
            escape(&r.tenant),
            r.load
        ));
    }

    out.push_str("# HELP capscale_utilization Load over limit-implied capacity (0.0-1.0+).\n");
    out.push_str("# TYPE capscale_utilization gauge\n");
    for r in recs {
        let units = engine.current_units(r.limit).max(1);
        let capacity = f64::from(units) * model.base_capacity;
        out.push_str(&format!(
            "capscale_utilization{{tenant=\"{}\"}} {:.4}\n",
            escape(&r.tenant),
            r.load / capacity
        ));
    }

    out
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use capscale_core::CapacityMode;

    fn test_recommendation(tenant: &str) -> Recommendation {
        Recommendation {
            tenant: tenant.to_string(),
            limit: 1000.0,
            load: 900.0,
            recommended_units: 3,
            recommended_mode: CapacityMode::Provisioned,
            current_mode: CapacityMode::Provisioned,
            current_units: Some(2),
        }
    }

    #[test]
    fn render_empty() {
        let output = render_recommendations(&[], &CapacityModel::default());
        assert!(output.contains("# HELP capscale_recommended_units"));
        assert!(output.contains("# TYPE capscale_recommended_units gauge"));
    }

    #[test]
    fn render_single_tenant() {
        let output = render_recommendations(
            &[test_recommendation("prod.acct")],
            &CapacityModel::default(),
        );

        assert!(output.contains("capscale_recommended_units{tenant=\"prod.acct\"} 3"));
        assert!(output.contains("capscale_current_units{tenant=\"prod.acct\"} 2"));
        assert!(output.contains("capscale_observed_limit{tenant=\"prod.acct\"} 1000.00"));
        assert!(output.contains("capscale_observed_load{tenant=\"prod.acct\"} 900.00"));
        assert!(output.contains("capscale_utilization{tenant=\"prod.acct\"} 0.9000"));
    }

    #[test]
    fn base_tier_utilization_uses_one_unit() {
        let mut rec = test_recommendation("ns");
        rec.limit = 0.0;
        rec.load = 250.0;
        rec.current_units = None;
        let output = render_recommendations(&[rec], &CapacityModel::default());
        assert!(output.contains("capscale_utilization{tenant=\"ns\"} 0.5000"));
        assert!(output.contains("capscale_current_units{tenant=\"ns\"} 0"));
    }

    #[test]
    fn labels_are_escaped() {
        let output = render_recommendations(
            &[test_recommendation("we\"ird")],
            &CapacityModel::default(),
        );
        assert!(output.contains("tenant=\"we\\\"ird\""));
    }

    #[test]
    fn every_sample_has_labels() {
        let output = render_recommendations(
            &[test_recommendation("a"), test_recommendation("b")],
            &CapacityModel::default(),
        );
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }
}
