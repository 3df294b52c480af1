//! Saga orchestrator for the escrow creation saga.

use std::sync::Arc;
use std::time::Instant;

use common::{EscrowId, OrderId};
use serde::Serialize;

use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::SagaContext;
use crate::step::SagaStep;
use crate::steps;

/// Outcome of one saga run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaResult {
    pub success: bool,

    /// Aggregated failure message naming the failing step.
    pub error_message: Option<String>,

    pub escrow_id: Option<EscrowId>,
    pub order_id: Option<OrderId>,

    /// True when rollback ran and every compensation reported success.
    pub compensation_completed: bool,

    pub completed_steps: Vec<String>,
    pub errors: Vec<String>,
}

/// Runs a fixed sequence of steps with backward recovery.
///
/// Steps execute in order. On the first failure the steps that already
/// completed are compensated in reverse order, each exactly once. Nothing is
/// retried.
pub struct SagaOrchestrator {
    steps: Vec<Arc<dyn SagaStep>>,
}

impl SagaOrchestrator {
    /// Creates an orchestrator running the escrow creation steps.
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        Self::with_steps(steps::escrow_creation_steps(&collaborators, &config))
    }

    /// Creates an orchestrator running a custom step sequence.
    pub fn with_steps(steps: Vec<Arc<dyn SagaStep>>) -> Self {
        Self { steps }
    }

    /// Returns the step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Executes the escrow creation saga.
    ///
    /// Step failures are reported in the result rather than as an error; the
    /// caller decides how to surface them.
    #[tracing::instrument(
        skip(self, context),
        fields(saga_type = "CreateEscrow", buyer_id = %context.buyer_id, listing_id = %context.listing_id)
    )]
    pub async fn execute_create_escrow_saga(&self, mut context: SagaContext) -> SagaResult {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        let mut executed: Vec<Arc<dyn SagaStep>> = Vec::with_capacity(self.steps.len());
        let mut failure: Option<String> = None;

        for step in &self.steps {
            let name = step.name();
            tracing::info!(step = name, "saga step started");

            match step.execute(&context).await {
                Ok(data) => {
                    context.complete_step(name, data);
                    executed.push(Arc::clone(step));
                    tracing::info!(step = name, "saga step completed");
                }
                Err(e) => {
                    tracing::warn!(step = name, error = %e, "saga step failed");
                    context.record_error(name, &e);
                    failure = Some(format!("Saga failed at step '{name}': {e}"));
                    break;
                }
            }
        }

        let compensation_completed = match &failure {
            Some(_) => self.compensate(&mut context, executed).await,
            None => false,
        };

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);

        match &failure {
            None => {
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(escrow_id = ?context.escrow_id(), duration, "saga completed successfully");
            }
            Some(reason) => {
                metrics::counter!("saga_failed").increment(1);
                tracing::warn!(
                    escrow_id = ?context.escrow_id(),
                    reason = %reason,
                    compensation_completed,
                    "saga failed"
                );
            }
        }

        SagaResult {
            success: failure.is_none(),
            error_message: failure,
            escrow_id: context.escrow_id(),
            order_id: context.order_id().cloned(),
            compensation_completed,
            completed_steps: context.completed_steps().to_vec(),
            errors: context.errors().to_vec(),
        }
    }

    /// Runs compensating actions in reverse order of completed steps.
    ///
    /// Returns true if every compensation reported success.
    async fn compensate(
        &self,
        context: &mut SagaContext,
        mut executed: Vec<Arc<dyn SagaStep>>,
    ) -> bool {
        let mut all_succeeded = true;

        while let Some(step) = executed.pop() {
            let name = step.name();
            metrics::counter!("saga_compensations_total").increment(1);

            if step.compensate(context).await {
                tracing::info!(step = name, "compensation completed");
            } else {
                all_succeeded = false;
                metrics::counter!("saga_compensation_failures_total").increment(1);
                tracing::warn!(step = name, "compensation failed");
                context.record_error(name, "compensation failed");
            }
        }

        all_succeeded
    }
}
