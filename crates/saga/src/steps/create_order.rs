use async_trait::async_trait;
use common::OrderId;
use escrow_store::EscrowRepositoryExt;

use super::{STEP_CREATE_ORDER, required};
use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::{SagaContext, StepData};
use crate::error::{Result, SagaError};
use crate::services::call_with_timeout;
use crate::step::SagaStep;

/// Creates the order backed by the escrow, or links one supplied by the caller.
///
/// Compensation cancels the order if this step created it.
pub struct CreateOrderStep {
    collaborators: Collaborators,
    config: SagaConfig,
}

impl CreateOrderStep {
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    async fn link(&self, ctx: &SagaContext, order_id: &OrderId) -> Result<()> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;
        let mut escrow = self.collaborators.escrows.load(escrow_id).await?;
        escrow.link_order(order_id.clone())?;
        self.collaborators.escrows.update(&mut escrow).await?;
        Ok(())
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<bool> {
        call_with_timeout(
            "order cancel",
            self.config.call_timeout,
            self.collaborators.orders.cancel_order(order_id),
        )
        .await
    }

    async fn link_existing(&self, ctx: &SagaContext, order_id: &OrderId) -> Result<StepData> {
        let status = call_with_timeout(
            "order status",
            self.config.call_timeout,
            self.collaborators.orders.get_order_status(order_id),
        )
        .await?;

        if status.is_none() {
            return Err(SagaError::OrderService(format!("order {order_id} not found")));
        }

        self.link(ctx, order_id).await?;
        Ok(StepData::order(order_id.clone()))
    }
}

#[async_trait]
impl SagaStep for CreateOrderStep {
    fn name(&self) -> &'static str {
        STEP_CREATE_ORDER
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepData> {
        let escrow_id = required(ctx.escrow_id(), "escrow id")?;

        if let Some(order_id) = &ctx.existing_order_id {
            return self.link_existing(ctx, order_id).await;
        }

        let order_id = call_with_timeout(
            "order create",
            self.config.call_timeout,
            self.collaborators
                .orders
                .create_order(&ctx.buyer_id, &ctx.listing_id, escrow_id),
        )
        .await?
        .ok_or_else(|| SagaError::OrderService("order service returned no order id".to_string()))?;

        if let Err(e) = self.link(ctx, &order_id).await {
            // Don't leave an order without a funded escrow behind
            if let Err(cancel_err) = self.cancel(&order_id).await {
                tracing::warn!(order_id = %order_id, error = %cancel_err, "failed to cancel unlinked order");
            }
            return Err(e);
        }

        tracing::debug!(order_id = %order_id, "order created");
        Ok(StepData::order(order_id))
    }

    async fn compensate(&self, ctx: &SagaContext) -> bool {
        if !ctx.created_order() {
            return true;
        }
        let Some(order_id) = ctx.order_id() else {
            return true;
        };

        match self.cancel(order_id).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(order_id = %order_id, "order service rejected cancellation");
                false
            }
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "failed to cancel order");
                false
            }
        }
    }
}
