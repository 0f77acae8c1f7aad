//! `capscaled change`: a scheduled capacity change.

use chrono::{DateTime, Utc};

use capscale_core::{CapacityError, CapscaleConfig, parse_duration};
use capscale_schedule::{ScheduledChange, ScheduledChangeRunner};

use crate::ReportFormat;
use crate::backend::Backend;

/// Command-line form of a scheduled change.
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    pub tenant: String,
    pub units: u32,
    pub revert_after: Option<String>,
    pub until: Option<String>,
    pub verify_delay: String,
}

impl ChangeRequest {
    fn into_change(self, now: DateTime<Utc>) -> anyhow::Result<ScheduledChange> {
        let end_time = match (&self.revert_after, &self.until) {
            (Some(after), _) => {
                let after = parse_duration(after)
                    .ok_or_else(|| invalid(format!("invalid --revert-after: {after:?}")))?;
                Some(now + chrono::Duration::from_std(after)?)
            }
            (None, Some(until)) => Some(
                DateTime::parse_from_rfc3339(until)
                    .map_err(|e| invalid(format!("invalid --until {until:?}: {e}")))?
                    .with_timezone(&Utc),
            ),
            (None, None) => None,
        };
        Ok(ScheduledChange::new(self.tenant, self.units, end_time)?)
    }
}

fn invalid(msg: String) -> CapacityError {
    CapacityError::Configuration(msg)
}

pub async fn change(
    config: CapscaleConfig,
    request: ChangeRequest,
    format: ReportFormat,
) -> anyhow::Result<()> {
    let verify_delay = parse_duration(&request.verify_delay)
        .ok_or_else(|| invalid(format!("invalid --verify-delay: {:?}", request.verify_delay)))?;
    let change = request.into_change(Utc::now())?;
    let backend = Backend::connect(&config)?;

    let runner = ScheduledChangeRunner::new(backend.states.clone(), backend.applier.clone())
        .with_verify_delay(verify_delay)
        .with_dry_run(config.run.dry_run);
    let result = runner.run(&change).await;

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        ReportFormat::Text => {
            println!("{result}");
            for error in &result.errors {
                println!("  error: {error}");
            }
        }
    }
    if !result.is_success() {
        anyhow::bail!("scheduled change for {} failed", result.tenant);
    }
    Ok(())
}
