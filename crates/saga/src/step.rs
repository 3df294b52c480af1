//! The unit of work the orchestrator runs.

use async_trait::async_trait;

use crate::context::{SagaContext, StepData};
use crate::error::Result;

/// One forward action of a saga together with its compensating action.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Stable step name used in logs, diagnostics and error messages.
    fn name(&self) -> &'static str;

    /// Runs the forward action. Called at most once per saga run.
    ///
    /// A step that fails after a partial side effect undoes that effect
    /// itself before returning the error.
    async fn execute(&self, ctx: &SagaContext) -> Result<StepData>;

    /// Semantically undoes a completed `execute`.
    ///
    /// Never fails; returns false if the undo could not be confirmed.
    async fn compensate(&self, ctx: &SagaContext) -> bool;
}
