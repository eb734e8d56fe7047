//! Semaphore hand-off between the denoiser and the frame driver.
//!
//! The denoiser owns one binary semaphore per build. Every submission signals
//! it and the frame driver waits on it before presenting or reusing the
//! output image. A binary semaphore may have at most one pending signal, so
//! [`SignalSemaphore`] refuses to signal again until the frame driver
//! acknowledges the previous one.

use crate::backend::{ComputeBackend, SemaphoreHandle};
use crate::error::{DenoiseError, DenoiseResult};
use crate::types::PipelineStages;

/// An upstream semaphore the compute queue waits on before the dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreWait {
    /// Semaphore signalled by the producing pass.
    pub semaphore: SemaphoreHandle,
    /// Stages that must not start before the semaphore is signalled.
    pub stage: PipelineStages,
}

impl SemaphoreWait {
    /// Wait on `semaphore` before the compute shader stage.
    ///
    /// This matches the default upstream stage the denoiser's barriers are
    /// recorded against, see
    /// [`DenoiserParameters::upstream_wait_stage`](crate::DenoiserParameters::upstream_wait_stage).
    pub fn new(semaphore: SemaphoreHandle) -> Self {
        Self {
            semaphore,
            stage: PipelineStages::COMPUTE_SHADER,
        }
    }

    /// Set the stage the wait applies to.
    pub fn with_stage(mut self, stage: PipelineStages) -> Self {
        self.stage = stage;
        self
    }

    /// Returns true if work whose first scope is `src_stage` is ordered after this wait.
    ///
    /// A wait blocks only the stages it names, and `TOP_OF_PIPE` alone
    /// blocks nothing.
    pub fn chains_into(&self, src_stage: PipelineStages) -> bool {
        let blocked = self.stage - PipelineStages::TOP_OF_PIPE;
        if blocked.is_empty() {
            return false;
        }
        blocked.contains(PipelineStages::ALL_COMMANDS)
            || src_stage.contains(PipelineStages::ALL_COMMANDS)
            || blocked.intersects(src_stage)
    }
}

/// The semaphore signalled after each dispatch.
#[derive(Debug)]
pub struct SignalSemaphore {
    handle: SemaphoreHandle,
    pending: bool,
    destroyed: bool,
}

impl SignalSemaphore {
    /// Create the semaphore.
    pub fn new(backend: &dyn ComputeBackend) -> DenoiseResult<Self> {
        let handle = backend.create_semaphore()?;
        log::debug!("Created denoiser signal semaphore {:?}", handle);
        Ok(Self {
            handle,
            pending: false,
            destroyed: false,
        })
    }

    /// The semaphore handle.
    pub fn handle(&self) -> SemaphoreHandle {
        self.handle
    }

    /// Returns true if a signal was submitted and not yet acknowledged.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Fails if the previous signal has not been acknowledged.
    pub fn ensure_ready(&self) -> DenoiseResult<()> {
        if self.destroyed {
            return Err(DenoiseError::Destroyed);
        }
        if self.pending {
            return Err(DenoiseError::SignalNotConsumed);
        }
        Ok(())
    }

    /// Record that a submission signalling this semaphore was enqueued.
    pub fn mark_signaled(&mut self) {
        self.pending = true;
    }

    /// Record that the frame driver enqueued a wait on the pending signal.
    ///
    /// Returns false if there was nothing to consume.
    pub fn consume(&mut self) -> bool {
        std::mem::replace(&mut self.pending, false)
    }

    /// Destroy the semaphore.
    ///
    /// The caller must ensure no submission referencing it is still executing.
    pub fn destroy(&mut self, backend: &dyn ComputeBackend) {
        if self.destroyed {
            return;
        }
        backend.destroy_semaphore(self.handle);
        self.destroyed = true;
        self.pending = false;
    }
}

impl Drop for SignalSemaphore {
    fn drop(&mut self) {
        if !self.destroyed {
            log::warn!(
                "SignalSemaphore {:?} dropped without calling destroy()",
                self.handle
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    #[test]
    fn test_single_outstanding_signal() {
        let backend = DummyBackend::new();
        let mut semaphore = SignalSemaphore::new(&backend).unwrap();

        assert!(semaphore.ensure_ready().is_ok());
        semaphore.mark_signaled();
        assert!(semaphore.is_pending());
        assert_eq!(
            semaphore.ensure_ready(),
            Err(DenoiseError::SignalNotConsumed)
        );

        assert!(semaphore.consume());
        assert!(!semaphore.consume());
        assert!(semaphore.ensure_ready().is_ok());

        semaphore.destroy(&backend);
        assert_eq!(semaphore.ensure_ready(), Err(DenoiseError::Destroyed));
        assert_eq!(backend.live_object_count(), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let backend = DummyBackend::new();
        let mut semaphore = SignalSemaphore::new(&backend).unwrap();
        semaphore.destroy(&backend);
        semaphore.destroy(&backend);
        assert!(backend.validation_messages().is_empty());
    }

    #[test]
    fn test_wait_chaining() {
        let wait = SemaphoreWait::new(SemaphoreHandle::from_raw(7));
        let recorded = PipelineStages::TOP_OF_PIPE | PipelineStages::COMPUTE_SHADER;
        assert!(wait.chains_into(recorded));
        assert!(!wait.chains_into(PipelineStages::TOP_OF_PIPE));
        assert!(
            wait.with_stage(PipelineStages::ALL_COMMANDS)
                .chains_into(PipelineStages::TOP_OF_PIPE)
        );
        assert!(
            !wait
                .with_stage(PipelineStages::TOP_OF_PIPE)
                .chains_into(recorded)
        );
        assert!(
            !wait
                .with_stage(PipelineStages::RAY_TRACING_SHADER)
                .chains_into(recorded)
        );
    }

    #[test]
    fn test_wait_defaults_to_compute_stage() {
        let wait = SemaphoreWait::new(SemaphoreHandle::from_raw(7));
        assert_eq!(wait.stage, PipelineStages::COMPUTE_SHADER);
        let wait = wait.with_stage(PipelineStages::ALL_COMMANDS);
        assert_eq!(wait.stage, PipelineStages::ALL_COMMANDS);
    }
}
