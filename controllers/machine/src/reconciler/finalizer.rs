//! Deletion guard
//!
//! Every live Machine carries the `docker-machine.klusters.dev` finalizer.
//! Once deletion is requested the finalizer is only removed after cleanup
//! has completed, so cloud resources are never orphaned.

use super::{Reconciler, WorkingCopy};
use crate::error::ControllerError;
use crds::{DeletionGuard, Machine, FINALIZER};
use kube::ResourceExt;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Add the finalizer if missing. Returns the Machine as persisted.
    pub(crate) async fn ensure_finalizer(&self, machine: Machine) -> Result<Machine, ControllerError> {
        if DeletionGuard::from_machine(&machine).contains(FINALIZER) {
            return Ok(machine);
        }
        let namespace = machine.namespace_or_default();
        let name = machine.name_any();
        let updated = self
            .update_guard(&namespace, &name, |guard| guard.add(FINALIZER))
            .await?;
        info!(machine = %machine.key(), "Finalizer {} added", FINALIZER);
        Ok(updated.unwrap_or(machine))
    }

    /// Clean up and release a Machine whose deletion was requested.
    ///
    /// The finalizer stays in place when cleanup fails.
    pub(crate) async fn finalize(&self, machine: Machine) -> Result<(), ControllerError> {
        let key = machine.key();
        if !DeletionGuard::from_machine(&machine).contains(FINALIZER) {
            debug!(machine = %key, "No finalizer, nothing to clean up");
            return Ok(());
        }

        let namespace = machine.namespace_or_default();
        let name = machine.name_any();
        let mut working = WorkingCopy::new(machine);
        if let Err(e) = self.flush_status(&mut working).await {
            warn!(machine = %key, "Failed to mark Machine as terminating: {}", e);
        }

        info!(machine = %key, "Cleaning up Machine resources");
        self.cleanup(&mut working).await?;

        self.update_guard(&namespace, &name, |guard| guard.remove(FINALIZER))
            .await?;
        info!(machine = %key, "Finalizer {} removed", FINALIZER);
        Ok(())
    }

    /// Read the stored Machine, edit its finalizers and patch them back
    /// guarded by the resourceVersion that was read.
    ///
    /// Returns `None` when the Machine is gone.
    async fn update_guard(
        &self,
        namespace: &str,
        name: &str,
        edit: impl FnOnce(&mut DeletionGuard) -> bool,
    ) -> Result<Option<Machine>, ControllerError> {
        let Some(current) = self.store.get(namespace, name).await? else {
            return Ok(None);
        };
        let mut guard = DeletionGuard::from_machine(&current);
        if !edit(&mut guard) {
            return Ok(Some(current));
        }
        let updated = self
            .store
            .patch_finalizers(
                namespace,
                name,
                current.metadata.resource_version.as_deref(),
                guard.as_slice(),
            )
            .await?;
        Ok(Some(updated))
    }
}
