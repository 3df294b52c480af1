use async_trait::async_trait;
use domain::{EscrowStatus, PaymentAction, PaymentRecord, PaymentStatus, SYSTEM_ACTOR};
use escrow_store::EscrowRepositoryExt;

use super::{STEP_CAPTURE_PAYMENT, required};
use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::{SagaContext, StepData};
use crate::error::Result;
use crate::services::call_with_timeout;
use crate::step::SagaStep;

/// Captures the authorized funds; the escrow starts `HOLDING`.
///
/// Compensation refunds the capture and moves the escrow to `REFUNDED`.
pub struct CapturePaymentStep {
    collaborators: Collaborators,
    config: SagaConfig,
}

impl CapturePaymentStep {
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    async fn record(
        &self,
        ctx: &SagaContext,
        intent_id: &str,
        action: PaymentAction,
        status: PaymentStatus,
    ) -> Result<()> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;
        self.collaborators
            .payments
            .record(&PaymentRecord::new(
                escrow_id,
                self.collaborators.gateway.provider(),
                intent_id,
                action,
                ctx.amount,
                &ctx.currency,
                status,
            ))
            .await?;
        Ok(())
    }

    async fn hold_funds(&self, ctx: &SagaContext, intent_id: &str) -> Result<()> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;
        self.record(ctx, intent_id, PaymentAction::Capture, PaymentStatus::Succeeded)
            .await?;

        let mut escrow = self.collaborators.escrows.load(escrow_id).await?;
        escrow.capture(SYSTEM_ACTOR)?;
        self.collaborators.escrows.update(&mut escrow).await?;
        Ok(())
    }

    async fn refund_capture(&self, ctx: &SagaContext, intent_id: &str) -> Result<()> {
        let refunded = call_with_timeout(
            "payment refund",
            self.config.call_timeout,
            self.collaborators.gateway.refund(intent_id, ctx.amount),
        )
        .await;

        let status = match &refunded {
            Ok(()) => PaymentStatus::Succeeded,
            Err(_) => PaymentStatus::Failed,
        };
        self.record(ctx, intent_id, PaymentAction::Refund, status)
            .await?;
        refunded
    }

    async fn undo(&self, ctx: &SagaContext) -> Result<()> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;
        let intent_id = required(ctx.payment_intent_id(), "payment intent id")?;

        self.refund_capture(ctx, intent_id).await?;

        let mut escrow = self.collaborators.escrows.load(escrow_id).await?;
        if escrow.status() == EscrowStatus::Holding {
            escrow.refund(SYSTEM_ACTOR, "capture rolled back")?;
            self.collaborators.escrows.update(&mut escrow).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SagaStep for CapturePaymentStep {
    fn name(&self) -> &'static str {
        STEP_CAPTURE_PAYMENT
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepData> {
        let intent_id = required(ctx.payment_intent_id(), "payment intent id")?;

        let captured = call_with_timeout(
            "payment capture",
            self.config.call_timeout,
            self.collaborators.gateway.capture(intent_id),
        )
        .await;

        if let Err(e) = captured {
            self.record(ctx, intent_id, PaymentAction::Capture, PaymentStatus::Failed)
                .await?;
            return Err(e);
        }

        if let Err(e) = self.hold_funds(ctx, intent_id).await {
            // Funds were taken but the escrow does not hold them
            if let Err(refund_err) = self.refund_capture(ctx, intent_id).await {
                tracing::warn!(intent_id = %intent_id, error = %refund_err, "failed to refund orphaned capture");
            }
            return Err(e);
        }

        tracing::debug!(intent_id = %intent_id, "payment captured");
        Ok(StepData::default())
    }

    async fn compensate(&self, ctx: &SagaContext) -> bool {
        match self.undo(ctx).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(escrow_id = ?ctx.escrow_id(), error = %e, "failed to refund captured payment");
                false
            }
        }
    }
}

