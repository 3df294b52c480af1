use async_trait::async_trait;
use domain::{Escrow, EscrowStatus, HoldTerms, NewEscrow, SYSTEM_ACTOR};
use escrow_store::EscrowRepositoryExt;

use super::STEP_CREATE_ESCROW;
use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::{SagaContext, StepData};
use crate::error::Result;
use crate::step::SagaStep;

/// Persists a new escrow in `CREATED`.
///
/// Compensation marks it `FAILED`.
pub struct CreateEscrowStep {
    collaborators: Collaborators,
    config: SagaConfig,
}

impl CreateEscrowStep {
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    async fn mark_failed(&self, ctx: &SagaContext) -> Result<()> {
        let Some(escrow_id) = ctx.escrow_id() else {
            return Ok(());
        };

        let mut escrow = self.collaborators.escrows.load(escrow_id).await?;
        if escrow.status() == EscrowStatus::Failed {
            return Ok(());
        }

        let reason = ctx.last_error().unwrap_or("escrow creation rolled back");
        escrow.mark_failed(SYSTEM_ACTOR, reason)?;
        self.collaborators.escrows.update(&mut escrow).await?;
        Ok(())
    }
}

#[async_trait]
impl SagaStep for CreateEscrowStep {
    fn name(&self) -> &'static str {
        STEP_CREATE_ESCROW
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepData> {
        let mut escrow = Escrow::open(
            NewEscrow {
                listing_id: ctx.listing_id.clone(),
                buyer_id: ctx.buyer_id.clone(),
                seller_id: ctx.seller_id.clone(),
                amount: ctx.amount,
                currency: ctx.currency.clone(),
                hold_terms: HoldTerms::new(self.config.auto_release_days),
            },
            ctx.buyer_id.as_str(),
        )?;

        self.collaborators.escrows.insert(&mut escrow).await?;
        tracing::debug!(escrow_id = %escrow.id(), "escrow created");

        Ok(StepData::escrow(escrow.id()))
    }

    async fn compensate(&self, ctx: &SagaContext) -> bool {
        match self.mark_failed(ctx).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(escrow_id = ?ctx.escrow_id(), error = %e, "failed to mark escrow failed");
                false
            }
        }
    }
}
