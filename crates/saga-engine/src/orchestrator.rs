use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::OrchestratorConfig;
use crate::definition::SagaDefinition;
use crate::error::{Result, SagaError, error_chain};
use crate::id::SagaId;
use crate::locks::{SagaGuard, SagaLocks};
use crate::saga::SagaInstance;
use crate::state::SagaState;
use crate::step::StepResult;
use crate::store::SagaStore;

/// Where the forward pass stopped.
enum Forward {
    Completed,
    Cancelled,
    StepFailed(String),
}

/// Drives sagas of one definition against a store.
///
/// Runs are detached: [`start`](Self::start) persists the new saga, spawns its
/// run on the tokio runtime and returns the id straight away. From then on the
/// stored record is the only channel for progress and failure. A run never
/// propagates errors or panics to the caller; it records them on the saga.
///
/// Clones share the definition, store and lock registry.
pub struct SagaOrchestrator<Def, S> {
    definition: Arc<Def>,
    store: Arc<S>,
    config: Arc<OrchestratorConfig>,
    locks: SagaLocks,
}

impl<Def, S> Clone for SagaOrchestrator<Def, S> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            locks: self.locks.clone(),
        }
    }
}

/// A spawned saga run.
///
/// Dropping the handle does not stop the run.
#[derive(Debug)]
pub struct SagaHandle {
    id: SagaId,
    join: JoinHandle<SagaState>,
}

impl SagaHandle {
    #[must_use]
    pub fn id(&self) -> SagaId {
        self.id
    }

    /// Wait for the run to finish and return the state it ended in.
    ///
    /// # Errors
    ///
    /// Returns [`SagaError::Aborted`] if the run's task was aborted, e.g. by
    /// runtime shutdown.
    pub async fn wait(self) -> Result<SagaState> {
        self.join.await.map_err(|_| SagaError::Aborted(self.id))
    }
}

impl<Def, S> SagaOrchestrator<Def, S>
where
    Def: SagaDefinition,
    S: SagaStore + 'static,
{
    #[must_use]
    pub fn new(definition: Def, store: Arc<S>) -> Self {
        Self {
            definition: Arc::new(definition),
            store,
            config: Arc::new(OrchestratorConfig::default()),
            locks: SagaLocks::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether a run of this saga is active in this orchestrator.
    #[must_use]
    pub fn is_running(&self, id: SagaId) -> bool {
        self.locks.is_locked(id)
    }

    /// Create, persist and launch a new saga; returns once it is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be built, the data does not
    /// serialize to a map, or the initial save fails. Failures of the run
    /// itself are only visible through the stored saga.
    pub async fn start(&self, data: Def::Data, cancel: &CancellationToken) -> Result<SagaId> {
        Ok(self.start_supervised(data, cancel).await?.id())
    }

    /// Like [`start`](Self::start) but returns a handle to await the run.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn start_supervised(
        &self,
        data: Def::Data,
        cancel: &CancellationToken,
    ) -> Result<SagaHandle> {
        let plan = self.definition.steps()?;
        let saga = SagaInstance::new(self.definition.saga_type(), plan, data);
        let guard = self
            .locks
            .try_lock(saga.id())
            .ok_or(SagaError::AlreadyRunning(saga.id()))?;

        self.store.save(&saga.to_record()?, cancel).await?;
        info!(saga_id = %saga.id(), saga_type = saga.saga_type(), "started saga");

        Ok(self.spawn(saga, guard, cancel.clone()))
    }

    /// Continue a persisted saga that has not finished.
    ///
    /// A saga in `Started`/`InProgress` continues with the first step that has
    /// not completed; a step interrupted mid-flight runs again. A saga in
    /// `Compensating` resumes undoing its remaining completed steps.
    ///
    /// # Errors
    ///
    /// Fails without touching the saga if it is unknown, terminal, of another
    /// type, already running here, or inconsistent with the current plan.
    pub async fn resume(&self, id: SagaId, cancel: &CancellationToken) -> Result<()> {
        self.resume_supervised(id, cancel).await.map(drop)
    }

    /// Like [`resume`](Self::resume) but returns a handle to await the run.
    ///
    /// # Errors
    ///
    /// See [`resume`](Self::resume).
    pub async fn resume_supervised(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> Result<SagaHandle> {
        let guard = self
            .locks
            .try_lock(id)
            .ok_or(SagaError::AlreadyRunning(id))?;

        let record = self
            .store
            .get_by_id(id, cancel)
            .await?
            .ok_or(SagaError::NotFound(id))?;
        if record.state.is_terminal() {
            return Err(SagaError::Terminal {
                id,
                state: record.state,
            });
        }
        if record.saga_type != self.definition.saga_type() {
            return Err(SagaError::TypeMismatch {
                id,
                expected: self.definition.saga_type().to_string(),
                found: record.saga_type,
            });
        }

        let saga = SagaInstance::restore(record, self.definition.steps()?)?;
        info!(
            saga_id = %id,
            state = %saga.state(),
            completed_steps = saga.executed_steps().len(),
            "resuming saga"
        );

        Ok(self.spawn(saga, guard, cancel.clone()))
    }

    /// Current state of a saga, or `None` if the store does not know it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_state(
        &self,
        id: SagaId,
        cancel: &CancellationToken,
    ) -> Result<Option<SagaState>> {
        Ok(self
            .store
            .get_by_id(id, cancel)
            .await?
            .map(|record| record.state))
    }

    /// Resume every unfinished saga of this definition's type.
    ///
    /// Meant for process startup. Sagas that cannot be resumed are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot list sagas.
    pub async fn recover(&self, cancel: &CancellationToken) -> Result<Vec<SagaHandle>> {
        let incomplete = self.store.find_incomplete(cancel).await?;
        let mut handles = Vec::new();
        for record in incomplete {
            if record.saga_type != self.definition.saga_type() {
                continue;
            }
            match self.resume_supervised(record.id, cancel).await {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(
                    saga_id = %record.id,
                    error = %error_chain(&err),
                    "skipping saga during recovery"
                ),
            }
        }
        info!(resumed = handles.len(), "saga recovery finished");
        Ok(handles)
    }

    fn spawn(
        &self,
        saga: SagaInstance<Def::Data>,
        guard: SagaGuard,
        cancel: CancellationToken,
    ) -> SagaHandle {
        let id = saga.id();
        let span = info_span!("saga", saga_id = %id, saga_type = saga.saga_type());
        let this = self.clone();
        let join = tokio::spawn(
            async move {
                let _guard = guard;
                let mut saga = saga;
                match AssertUnwindSafe(this.run(&mut saga, &cancel))
                    .catch_unwind()
                    .await
                {
                    Ok(state) => state,
                    Err(panic) => {
                        let message = format!("saga run panicked: {}", panic_message(&*panic));
                        error!(error = %message, "saga run crashed");
                        this.recover_from_crash(&mut saga, &message).await
                    }
                }
            }
            .instrument(span),
        );
        SagaHandle { id, join }
    }

    async fn run(&self, saga: &mut SagaInstance<Def::Data>, cancel: &CancellationToken) -> SagaState {
        match saga.state() {
            SagaState::Started | SagaState::InProgress => {
                self.run_forward(saga, cancel).await;
            }
            SagaState::Compensating => self.compensate(saga).await,
            state => debug!(%state, "nothing to run"),
        }
        saga.state()
    }

    async fn run_forward(&self, saga: &mut SagaInstance<Def::Data>, cancel: &CancellationToken) {
        let failure = match self.execute_steps(saga, cancel).await {
            Ok(Forward::Completed) => {
                if let Err(err) = saga.mark_completed() {
                    error!(error = %err, "could not complete saga");
                    return;
                }
                self.persist_logged(saga).await;
                info!("saga completed");
                return;
            }
            Ok(Forward::Cancelled) => {
                warn!("saga cancelled");
                let message = self.config.cancellation_message().to_string();
                if let Err(err) = saga.mark_failed(message) {
                    error!(error = %err, "could not fail cancelled saga");
                    return;
                }
                self.persist_logged(saga).await;
                return;
            }
            Ok(Forward::StepFailed(message)) => message,
            Err(fault) => {
                let message = error_chain(&fault);
                error!(error = %message, "saga run faulted");
                message
            }
        };

        let message = self.config.clamp_message(&failure);
        if let Err(err) = saga
            .mark_failed(message)
            .and_then(|()| saga.start_compensation())
        {
            error!(error = %err, "could not enter compensation");
            return;
        }
        self.persist_logged(saga).await;
        self.compensate(saga).await;
    }

    async fn execute_steps(
        &self,
        saga: &mut SagaInstance<Def::Data>,
        cancel: &CancellationToken,
    ) -> Result<Forward> {
        while let Some(step) = saga.next_step() {
            if cancel.is_cancelled() {
                return Ok(Forward::Cancelled);
            }

            info!(step = step.name(), "executing saga step");
            saga.begin_next_step();
            self.persist_logged(saga).await;
            let outcome = AssertUnwindSafe(step.execute(saga.data_mut(), cancel))
                .catch_unwind()
                .await;

            if let Some(message) = failure_message(outcome) {
                error!(step = step.name(), error = %message, "saga step failed");
                saga.record_step_failure(&message);
                return Ok(Forward::StepFailed(message));
            }

            saga.record_step_execution()?;
            self.persist(saga).await?;
            info!(step = step.name(), "saga step completed");
        }
        Ok(Forward::Completed)
    }

    /// Undo executed steps most-recent first. Never cancelled and never retried.
    async fn compensate(&self, saga: &mut SagaInstance<Def::Data>) {
        info!(
            pending = saga.executed_steps().len(),
            "starting compensation"
        );
        let uncancellable = CancellationToken::new();

        while let Some(step) = saga.next_compensation() {
            info!(
                step = step.name(),
                action = %step.compensation_description(),
                "compensating saga step"
            );
            let outcome = AssertUnwindSafe(step.compensate(saga.data_mut(), &uncancellable))
                .catch_unwind()
                .await;

            match failure_message(outcome) {
                None => {
                    saga.record_step_compensated();
                    self.persist_logged(saga).await;
                }
                Some(reason) => {
                    error!(step = step.name(), error = %reason, "saga step compensation failed");
                    saga.record_compensation_failure(&reason);
                    let message = self
                        .config
                        .clamp_message(&format!("Failed to compensate {}: {reason}", step.name()));
                    if let Err(err) = saga.mark_compensation_failed(message) {
                        error!(error = %err, "could not record compensation failure");
                    }
                    self.persist_logged(saga).await;
                    return;
                }
            }
        }

        if let Err(err) = saga.mark_compensated() {
            error!(error = %err, "could not finish compensation");
            return;
        }
        self.persist_logged(saga).await;
        info!("compensation completed");
    }

    /// Store the saga's current snapshot.
    ///
    /// Progress that already happened is always recorded, so writes during a
    /// run ignore the caller's cancellation.
    async fn persist(&self, saga: &SagaInstance<Def::Data>) -> Result<()> {
        let record = saga.to_record()?;
        self.store
            .update(&record, &CancellationToken::new())
            .await?;
        debug!(state = %record.state, "persisted saga");
        Ok(())
    }

    async fn persist_logged(&self, saga: &SagaInstance<Def::Data>) {
        if let Err(err) = self.persist(saga).await {
            error!(error = %error_chain(&err), "failed to persist saga state");
        }
    }

    /// Settle a run that panicked outside a step call.
    ///
    /// The in-memory saga still holds every step that finished, so a forward
    /// run is failed and compensated like any other fault. A crash while
    /// compensating is a compensation failure.
    async fn recover_from_crash(
        &self,
        saga: &mut SagaInstance<Def::Data>,
        message: &str,
    ) -> SagaState {
        let message = self.config.clamp_message(message);
        match saga.state() {
            SagaState::Started | SagaState::InProgress => {
                if let Err(err) = saga
                    .mark_failed(message)
                    .and_then(|()| saga.start_compensation())
                {
                    error!(error = %err, "could not enter compensation");
                    return saga.state();
                }
                self.persist_logged(saga).await;
                let outcome = AssertUnwindSafe(self.compensate(saga)).catch_unwind().await;
                if let Err(panic) = outcome {
                    let reason = format!("compensation panicked: {}", panic_message(&*panic));
                    error!(error = %reason, "saga compensation crashed");
                    self.settle_compensation_crash(saga, &reason).await;
                }
            }
            SagaState::Compensating => self.settle_compensation_crash(saga, &message).await,
            _ => self.persist_logged(saga).await,
        }
        saga.state()
    }

    async fn settle_compensation_crash(&self, saga: &mut SagaInstance<Def::Data>, message: &str) {
        if saga.state() != SagaState::Compensating {
            return;
        }
        if let Err(err) = saga.mark_compensation_failed(self.config.clamp_message(message)) {
            error!(error = %err, "could not record compensation failure");
            return;
        }
        let outcome = AssertUnwindSafe(self.persist_logged(saga)).catch_unwind().await;
        if outcome.is_err() {
            error!("store panicked while recording compensation failure");
        }
    }
}

/// Failure reason of a guarded step call, or `None` if it succeeded.
fn failure_message(outcome: std::result::Result<StepResult, Box<dyn Any + Send>>) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(failure)) => Some(failure.message().to_string()),
        Err(panic) => Some(format!("step panicked: {}", panic_message(&*panic))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
