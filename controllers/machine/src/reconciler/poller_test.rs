//! Unit tests for startup script completion

use super::*;
use crate::test_utils::*;
use crds::{ConditionSeverity, Machine, MachinePhase};

fn created_machine(name: &str, driver: &str) -> Machine {
    let mut machine = with_script(create_test_machine(name, driver));
    machine.conditions_mut().mark_true(ConditionType::MachineReady);
    machine
}

fn working(h: &TestHarness, name: &str) -> WorkingCopy {
    WorkingCopy::new(h.store.machine(name).unwrap())
}

#[test]
fn test_parse_exit_code() {
    assert_eq!(parse_exit_code("0\n"), Some(0));
    assert_eq!(parse_exit_code("\n  7 \ntrailing"), Some(7));
    assert_eq!(parse_exit_code("-1"), Some(-1));
    assert_eq!(parse_exit_code("done\n"), None);
    assert_eq!(parse_exit_code(""), None);
}

#[tokio::test]
async fn test_no_script_means_nothing_to_wait_for() {
    let h = TestHarness::new();
    let mut machine = create_test_machine("web", "google");
    machine.conditions_mut().mark_true(ConditionType::MachineReady);
    h.add_machine(machine);
    let mut working = working(&h, "web");

    let delay = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap();

    assert_eq!(delay, None);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_machine_not_ready_is_not_polled() {
    let h = TestHarness::new();
    h.add_machine(with_script(create_test_machine("web", "google")));
    let mut working = working(&h, "web");

    let delay = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap();

    assert_eq!(delay, None);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_missing_result_waits_and_requeues() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "google"));
    let mut working = working(&h, "web");

    let delay = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap();

    assert_eq!(delay, Some(Duration::from_secs(30)));
    assert_eq!(
        h.runner.calls(),
        vec![vec![
            "scp".to_string(),
            "docker-user@web:/tmp/result.txt".to_string(),
            h.result_path("web").display().to_string(),
        ]]
    );
    let conditions = working.conditions();
    let complete = conditions.get(ConditionType::ClusterOperationComplete).unwrap();
    assert!(complete.has_reason(reasons::WAITING_FOR_SCRIPT_COMPLETION));
    assert_eq!(complete.severity, Some(ConditionSeverity::Info));
    assert_eq!(
        working.machine.computed_status().phase,
        MachinePhase::WaitingForScriptCompletion
    );
}

#[tokio::test]
async fn test_aws_hosts_are_reached_as_ubuntu() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "amazonec2"));
    let mut working = working(&h, "web");

    h.reconciler.poll_completion(&mut working, &Driver::Aws).await.unwrap();

    assert_eq!(h.runner.calls()[0][1], "ubuntu@web:/tmp/result.txt");
}

#[tokio::test]
async fn test_zero_exit_completes_and_stops_polling() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "google"));
    h.runner.set_remote_result(Some("0\n"));
    let mut working = working(&h, "web");

    let delay = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap();

    assert_eq!(delay, None);
    assert!(working.conditions().is_true(ConditionType::ClusterOperationComplete));
    assert!(!h.result_path("web").exists());
    assert_eq!(working.machine.computed_status().phase, MachinePhase::Success);

    h.runner.clear_calls();
    h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap();
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_nonzero_exit_fails_cluster_operation() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "google"));
    h.runner.set_remote_result(Some("2\n"));
    let mut working = working(&h, "web");

    let err = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap_err();

    assert!(matches!(err, ControllerError::ScriptFailed(ref m) if m == "startup script exited with code 2"));
    let conditions = working.conditions();
    let complete = conditions.get(ConditionType::ClusterOperationComplete).unwrap();
    assert!(complete.is_false());
    assert!(complete.has_reason(reasons::CLUSTER_OPERATION_FAILED));
    assert_eq!(complete.severity, Some(ConditionSeverity::Error));
    assert_eq!(
        working.machine.computed_status().phase,
        MachinePhase::ClusterOperationFailed
    );
    assert!(!h.result_path("web").exists());

    // a failed script is final
    h.runner.clear_calls();
    let delay = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap();
    assert_eq!(delay, None);
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_unreadable_result_fails_cluster_operation() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "google"));
    h.runner.set_remote_result(Some("finished\n"));
    let mut working = working(&h, "web");

    let err = h.reconciler.poll_completion(&mut working, &Driver::Google).await.unwrap_err();

    assert!(matches!(err, ControllerError::ScriptFailed(_)));
    assert!(working
        .conditions()
        .is_false_with(ConditionType::ClusterOperationComplete, reasons::CLUSTER_OPERATION_FAILED));
}

#[tokio::test]
async fn test_job_is_started_then_tracked() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "hetzner"));
    let mut working = working(&h, "web");

    let delay = h.reconciler.poll_completion(&mut working, &Driver::Hetzner).await.unwrap();

    assert_eq!(delay, Some(Duration::from_secs(30)));
    let (spec, outcome) = h.jobs.job("web-startup-script").unwrap();
    assert_eq!(outcome, JobOutcome::Running);
    assert_eq!(spec.namespace, NAMESPACE);
    assert_eq!(spec.machine_name, "web");
    assert_eq!(spec.secret_name, "web-script");
    assert_eq!(spec.script_key, "userdata");
    assert!(working
        .conditions()
        .is_false_with(ConditionType::ClusterOperationComplete, reasons::WAITING_FOR_SCRIPT_RUN));
    assert!(h.runner.calls().is_empty());

    h.jobs.set_outcome("web-startup-script", JobOutcome::Succeeded);
    let delay = h.reconciler.poll_completion(&mut working, &Driver::Hetzner).await.unwrap();

    assert_eq!(delay, None);
    assert!(working.conditions().is_true(ConditionType::ClusterOperationComplete));
}

#[tokio::test]
async fn test_failed_job_fails_cluster_operation() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "hetzner"));
    let mut working = working(&h, "web");
    h.reconciler.poll_completion(&mut working, &Driver::Hetzner).await.unwrap();
    h.jobs.set_outcome("web-startup-script", JobOutcome::Failed);

    let err = h.reconciler.poll_completion(&mut working, &Driver::Hetzner).await.unwrap_err();

    assert!(matches!(err, ControllerError::ScriptFailed(_)));
    assert_eq!(
        working.machine.computed_status().phase,
        MachinePhase::ClusterOperationFailed
    );
}

#[tokio::test]
async fn test_job_needs_script_secret() {
    let h = TestHarness::new();
    h.add_machine(created_machine("web", "hetzner"));
    h.secrets.remove("web-script");
    let mut working = working(&h, "web");

    let err = h.reconciler.poll_completion(&mut working, &Driver::Hetzner).await.unwrap_err();

    assert!(matches!(err, ControllerError::SecretNotReady(_)));
    assert!(h.jobs.job("web-startup-script").is_none());
}
