//! Batch evaluation against in-memory collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capscale_core::{
    CapacityError, CapacityMode, CapacityResult, LoadSnapshot, Severity, TenantFilter,
    TenantState,
};
use capscale_engine::*;
use tokio::sync::watch;

#[derive(Default)]
struct FakePlane {
    states: Mutex<HashMap<String, TenantState>>,
    calls: Mutex<Vec<String>>,
    failing: HashSet<String>,
    unreadable: HashSet<String>,
    flaky_reads: Mutex<HashSet<String>>,
}

impl FakePlane {
    fn set(&self, tenant: &str, state: TenantState) {
        self.states.lock().unwrap().insert(tenant.to_string(), state);
    }

    fn state(&self, tenant: &str) -> Option<TenantState> {
        self.states.lock().unwrap().get(tenant).copied()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TenantStateSource for FakePlane {
    fn fetch_state<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<TenantState>> {
        Box::pin(async move {
            if self.unreadable.contains(tenant) || self.flaky_reads.lock().unwrap().remove(tenant) {
                return Err(CapacityError::TransientFetch(format!("{tenant}: HTTP 503")));
            }
            self.state(tenant)
                .ok_or_else(|| CapacityError::NotFound(tenant.to_string()))
        })
    }
}

impl CapacityApplier for FakePlane {
    fn apply_enable<'a>(
        &'a self,
        tenant: &'a str,
        units: u32,
    ) -> BoxFuture<'a, CapacityResult<bool>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("enable {tenant} {units}"));
            if self.failing.contains(tenant) {
                return Err(CapacityError::apply(tenant, "HTTP 500"));
            }
            self.set(tenant, TenantState::provisioned(units));
            Ok(true)
        })
    }

    fn apply_disable<'a>(&'a self, tenant: &'a str) -> BoxFuture<'a, CapacityResult<bool>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("disable {tenant}"));
            if self.failing.contains(tenant) {
                return Err(CapacityError::apply(tenant, "HTTP 500"));
            }
            self.set(tenant, TenantState::on_demand());
            Ok(true)
        })
    }
}

struct FakeLoads(CapacityResult<Vec<LoadSnapshot>>);

impl LoadSource for FakeLoads {
    fn fetch_all(&self) -> BoxFuture<'_, CapacityResult<Vec<LoadSnapshot>>> {
        Box::pin(async move { self.0.clone() })
    }
}

#[derive(Default)]
struct RecordingNotifier(Mutex<Vec<(String, Severity)>>);

impl RecordingNotifier {
    fn severities(&self) -> Vec<Severity> {
        self.0.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify<'a>(
        &'a self,
        message: &'a str,
        severity: Severity,
    ) -> BoxFuture<'a, CapacityResult<()>> {
        Box::pin(async move {
            self.0.lock().unwrap().push((message.to_string(), severity));
            Ok(())
        })
    }
}

#[derive(Default)]
struct RecordingProgress {
    seen: Mutex<Vec<Checkpoint>>,
    cancel_at: Option<(usize, watch::Sender<bool>)>,
}

impl ProgressSink for RecordingProgress {
    fn checkpoint(&self, checkpoint: Checkpoint) {
        self.seen.lock().unwrap().push(checkpoint);
        if let Some((at, tx)) = &self.cancel_at
            && checkpoint.processed == *at
        {
            let _ = tx.send(true);
        }
    }
}

fn scenario_plane() -> Arc<FakePlane> {
    let plane = FakePlane::default();
    plane.set("ns1", TenantState::on_demand());
    plane.set("ns2", TenantState::provisioned(5));
    plane.set("ns4", TenantState::provisioned(2));
    Arc::new(plane)
}

fn scenario_loads() -> Arc<FakeLoads> {
    Arc::new(FakeLoads(Ok(vec![
        LoadSnapshot::new("ns1", 500.0, 1200.0),
        LoadSnapshot::new("ns2", 2500.0, 200.0),
        LoadSnapshot::new("ns3", 0.0, 100.0),
        LoadSnapshot::new("ns4", 1000.0, 300.0),
    ])))
}

fn evaluator(config: EvaluatorConfig, loads: Arc<FakeLoads>, plane: Arc<FakePlane>) -> Evaluator {
    Evaluator::new(config, loads, plane.clone(), plane)
}

fn many_tenants(n: usize) -> Arc<FakeLoads> {
    let snapshots = (0..n)
        .map(|i| LoadSnapshot::new(format!("t{i}"), 0.0, 10.0))
        .collect();
    Arc::new(FakeLoads(Ok(snapshots)))
}

#[tokio::test]
async fn end_to_end_enable_and_disable() {
    let plane = scenario_plane();
    let eval = evaluator(EvaluatorConfig::default(), scenario_loads(), plane.clone());

    let result = eval.evaluate().await.unwrap();

    assert_eq!(result.checked, 4);
    assert_eq!(result.enabled, vec!["ns1"]);
    assert_eq!(result.disabled, vec!["ns2"]);
    assert!(result.resized.is_empty());
    assert!(result.errors.is_empty());
    assert!(result.finished_at.is_some());

    let ns1 = &result.recommendations[0];
    assert_eq!(ns1.recommended_units, 3);
    assert_eq!(ns1.recommended_mode, CapacityMode::Provisioned);
    let ns2 = &result.recommendations[1];
    assert_eq!(ns2.recommended_units, 0);
    assert_eq!(ns2.recommended_mode, CapacityMode::OnDemand);

    assert_eq!(plane.calls(), vec!["enable ns1 3", "disable ns2"]);
    assert_eq!(plane.state("ns1"), Some(TenantState::provisioned(3)));
    assert_eq!(plane.state("ns2"), Some(TenantState::on_demand()));
}

#[tokio::test]
async fn unknown_tenant_defaults_to_on_demand() {
    let plane = scenario_plane();
    let eval = evaluator(EvaluatorConfig::default(), scenario_loads(), plane);

    let result = eval.evaluate().await.unwrap();

    let ns3 = &result.recommendations[2];
    assert_eq!(ns3.tenant, "ns3");
    assert_eq!(ns3.current_mode, CapacityMode::OnDemand);
    assert_eq!(ns3.current_units, None);
    assert_eq!(result.decisions[2].kind, ActionKind::None);
    assert!(result.errors.is_empty());
}

#[tokio::test]
async fn second_batch_is_a_no_op() {
    let plane = scenario_plane();
    let eval = evaluator(EvaluatorConfig::default(), scenario_loads(), plane.clone());

    eval.evaluate().await.unwrap();
    let calls_after_first = plane.calls().len();

    // Same snapshot, but the plane now matches the first batch's targets.
    let second = eval.evaluate().await.unwrap();
    assert_eq!(plane.calls().len(), calls_after_first);
    assert!(second.decisions.iter().all(|d| d.kind == ActionKind::None));
}

#[tokio::test]
async fn dry_run_decides_without_side_effects() {
    let plane = scenario_plane();
    let config = EvaluatorConfig {
        dry_run: true,
        ..EvaluatorConfig::default()
    };
    let eval = evaluator(config, scenario_loads(), plane.clone());

    let result = eval.evaluate().await.unwrap();

    assert!(plane.calls().is_empty());
    assert_eq!(result.enabled, vec!["ns1"]);
    assert_eq!(result.disabled, vec!["ns2"]);
    assert!(
        result
            .to_string()
            .starts_with("[DRY RUN] checked 4 tenants: 1 enabled, 1 disabled")
    );
}

#[tokio::test]
async fn filter_skips_unmanaged_tenants() {
    let plane = scenario_plane();
    let config = EvaluatorConfig {
        filter: TenantFilter {
            allowlist: vec![],
            denylist: vec!["ns2".into()],
        },
        ..EvaluatorConfig::default()
    };
    let eval = evaluator(config, scenario_loads(), plane.clone());

    let result = eval.evaluate().await.unwrap();

    assert_eq!(result.checked, 3);
    assert!(result.recommendations.iter().all(|r| r.tenant != "ns2"));
    assert_eq!(plane.state("ns2"), Some(TenantState::provisioned(5)));
}

#[tokio::test]
async fn apply_failure_is_isolated() {
    let mut plane = FakePlane::default();
    plane.failing.insert("ns1".into());
    let plane = Arc::new(plane);
    plane.set("ns2", TenantState::provisioned(5));
    plane.set("ns4", TenantState::provisioned(2));
    let notifier = Arc::new(RecordingNotifier::default());
    let eval = evaluator(EvaluatorConfig::default(), scenario_loads(), plane.clone())
        .with_notifier(notifier.clone());

    let result = eval.evaluate().await.unwrap();

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("ns1"));
    assert!(result.enabled.is_empty());
    assert_eq!(result.disabled, vec!["ns2"]);
    assert_eq!(notifier.severities(), vec![Severity::Error]);
}

#[tokio::test]
async fn unreadable_state_defaults_to_on_demand() {
    let mut plane = FakePlane::default();
    plane.unreadable.insert("ns3".into());
    let plane = Arc::new(plane);
    plane.set("ns1", TenantState::on_demand());
    plane.set("ns2", TenantState::provisioned(5));
    plane.set("ns3", TenantState::provisioned(4));
    plane.set("ns4", TenantState::provisioned(2));
    let eval = evaluator(EvaluatorConfig::default(), scenario_loads(), plane.clone());

    let result = eval.evaluate().await.unwrap();

    assert_eq!(result.checked, 4);
    assert_eq!(result.enabled, vec!["ns1"]);
    assert_eq!(result.disabled, vec!["ns2"]);
    let ns3 = &result.recommendations[2];
    assert_eq!(ns3.tenant, "ns3");
    assert_eq!(ns3.current_mode, CapacityMode::OnDemand);
    assert_eq!(ns3.current_units, None);
    assert_eq!(result.decisions[2].kind, ActionKind::None);
    assert!(result.errors.is_empty());
    assert_eq!(plane.state("ns3"), Some(TenantState::provisioned(4)));
}

#[tokio::test]
async fn target_met_on_reread_is_not_counted_as_enabled() {
    let plane = FakePlane::default();
    plane.set("ns", TenantState::provisioned(5));
    plane.flaky_reads.lock().unwrap().insert("ns".into());
    let plane = Arc::new(plane);
    let loads = Arc::new(FakeLoads(Ok(vec![LoadSnapshot::new("ns", 2500.0, 600.0)])));
    let eval = evaluator(EvaluatorConfig::default(), loads, plane.clone());

    let result = eval.evaluate().await.unwrap();

    assert!(plane.calls().is_empty());
    assert!(result.enabled.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(result.decisions[0].kind, ActionKind::None);
    assert!(result.decisions[0].reason.starts_with("already at target"));
    assert_eq!(plane.state("ns"), Some(TenantState::provisioned(5)));
}

#[tokio::test]
async fn bulk_fetch_failure_aborts_with_critical_notice() {
    let plane = scenario_plane();
    let loads = Arc::new(FakeLoads(Err(CapacityError::TransientFetch(
        "connection refused".into(),
    ))));
    let notifier = Arc::new(RecordingNotifier::default());
    let eval = evaluator(EvaluatorConfig::default(), loads, plane.clone())
        .with_notifier(notifier.clone());

    let err = eval.evaluate().await.unwrap_err();

    assert!(matches!(err, CapacityError::TransientFetch(_)));
    assert_eq!(notifier.severities(), vec![Severity::Critical]);
    assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn checkpoints_every_five_and_at_end() {
    let progress = Arc::new(RecordingProgress::default());
    let plane = Arc::new(FakePlane::default());
    let eval = evaluator(EvaluatorConfig::default(), many_tenants(12), plane)
        .with_progress(progress.clone());

    eval.evaluate().await.unwrap();

    let seen: Vec<usize> = progress
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.processed)
        .collect();
    assert_eq!(seen, vec![5, 10, 12]);
}

#[tokio::test]
async fn resume_skips_processed_tenants() {
    let plane = Arc::new(FakePlane::default());
    let eval = evaluator(EvaluatorConfig::default(), many_tenants(7), plane);

    let result = eval
        .evaluate_from(Checkpoint { processed: 5, total: 7 })
        .await
        .unwrap();

    assert_eq!(result.checked, 2);
    assert_eq!(result.recommendations[0].tenant, "t5");
}

#[tokio::test]
async fn resume_with_stale_checkpoint_restarts() {
    let plane = Arc::new(FakePlane::default());
    let eval = evaluator(EvaluatorConfig::default(), many_tenants(7), plane);

    let result = eval
        .evaluate_from(Checkpoint { processed: 5, total: 9 })
        .await
        .unwrap();

    assert_eq!(result.checked, 7);
}

#[tokio::test]
async fn cancellation_keeps_partial_result() {
    let (tx, rx) = watch::channel(false);
    let progress = Arc::new(RecordingProgress {
        seen: Mutex::default(),
        cancel_at: Some((2, tx)),
    });
    let config = EvaluatorConfig {
        checkpoint_every: 2,
        ..EvaluatorConfig::default()
    };
    let eval = evaluator(config, many_tenants(6), Arc::new(FakePlane::default()))
        .with_progress(progress);

    let result = eval
        .evaluate_with(EvaluateOptions {
            resume: None,
            cancel: Some(rx),
        })
        .await
        .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.checked, 2);
    assert_eq!(result.recommendations.len(), 2);
    assert!(result.to_string().ends_with("(cancelled)"));
}

#[tokio::test]
async fn analyze_is_read_only() {
    let plane = scenario_plane();
    let eval = evaluator(EvaluatorConfig::default(), scenario_loads(), plane.clone());

    let recs = eval.analyze().await.unwrap();

    assert_eq!(recs.len(), 4);
    assert_eq!(recs[0].recommended_units, 3);
    assert!(plane.calls().is_empty());
}

#[tokio::test]
async fn threshold_policy_batch() {
    let plane = FakePlane::default();
    plane.set("idle", TenantState::provisioned(5));
    plane.set("busy", TenantState::on_demand());
    let plane = Arc::new(plane);
    let loads = Arc::new(FakeLoads(Ok(vec![
        LoadSnapshot::new("idle", 2500.0, 0.0),
        LoadSnapshot::new("busy", 500.0, 400.0).with_rejected(20.0),
    ])));
    let config = EvaluatorConfig {
        policy: DecisionPolicy::Threshold(ThresholdPolicy::default()),
        ..EvaluatorConfig::default()
    };
    let eval = evaluator(config, loads, plane.clone());

    let result = eval.evaluate().await.unwrap();

    assert_eq!(result.disabled, vec!["idle"]);
    assert_eq!(result.enabled, vec!["busy"]);
    assert_eq!(plane.state("busy"), Some(TenantState::provisioned(5)));
}

#[tokio::test(start_paused = true)]
async fn run_loop_evaluates_each_interval_until_shutdown() {
    let plane = Arc::new(FakePlane::default());
    let eval = evaluator(EvaluatorConfig::default(), many_tenants(1), plane);
    let (tx, rx) = watch::channel(false);
    let mut batches = 0usize;

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(3 * 3600 + 1)).await;
        tx.send(true).unwrap();
    };
    tokio::join!(
        eval.run(Duration::from_secs(3600), rx, |_| batches += 1),
        stopper
    );

    // t = 0, 1h, 2h, 3h.
    assert_eq!(batches, 4);
}

#[tokio::test(start_paused = true)]
async fn run_from_resumes_only_the_first_batch() {
    let plane = Arc::new(FakePlane::default());
    let eval = evaluator(EvaluatorConfig::default(), many_tenants(7), plane);
    let (tx, rx) = watch::channel(false);
    let mut checked = Vec::new();

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(3600 + 1)).await;
        tx.send(true).unwrap();
    };
    let resume = Some(Checkpoint {
        processed: 5,
        total: 7,
    });
    tokio::join!(
        eval.run_from(Duration::from_secs(3600), resume, rx, |r| checked.push(r.checked)),
        stopper
    );

    assert_eq!(checked, vec![2, 7]);
}
