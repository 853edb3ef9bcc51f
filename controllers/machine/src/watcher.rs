//! Kubernetes resource watcher.
//!
//! Runs the Machine reconcile loop on `kube_runtime::Controller`, which
//! handles reconnection, deduplication of queued events and guarantees at
//! most one in-flight reconcile per Machine.

use crate::error::ControllerError;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crds::Machine;
use futures::StreamExt;
use kube::Api;
use kube_runtime::{Controller, watcher, controller::{Action, Config as ControllerConfig}};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Watch Machines and reconcile every change until the stream ends.
pub async fn watch_machines(
    api: Api<Machine>,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
) -> Result<(), ControllerError> {
    info!("Starting Machine watcher");

    // Failed reconciles are retried with per-Machine Fibonacci backoff
    let error_policy = |machine: Arc<Machine>, error: &ControllerError, ctx: Arc<Reconciler>| {
        Action::requeue(ctx.backoff_for(&machine, error))
    };

    let reconcile = |machine: Arc<Machine>, ctx: Arc<Reconciler>| async move {
        debug!(machine = %machine.key(), "Reconciling Machine");
        ctx.reconcile_machine(&machine).await.map(|outcome| match outcome {
            ReconcileOutcome::AwaitChange => Action::await_change(),
            ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        })
    };

    // Debounce batches the burst of events caused by our own patches
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(concurrency);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((object, action)) => debug!("Reconciled {}: {:?}", object, action),
                Err(e) => error!("Controller error for Machine: {}", e),
            }
        })
        .await;

    Ok(())
}
