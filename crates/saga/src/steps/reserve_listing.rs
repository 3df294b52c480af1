use async_trait::async_trait;

use super::STEP_RESERVE_LISTING;
use crate::collaborators::Collaborators;
use crate::config::SagaConfig;
use crate::context::{SagaContext, StepData};
use crate::error::{Result, SagaError};
use crate::services::{ListingStatus, call_with_timeout};
use crate::step::SagaStep;

/// Takes the listing off the market by moving it to `IN_TRANSACTION`.
///
/// Compensation puts it back to `PUBLISHED`.
pub struct ReserveListingStep {
    collaborators: Collaborators,
    config: SagaConfig,
}

impl ReserveListingStep {
    pub fn new(collaborators: Collaborators, config: SagaConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    async fn set_status(&self, ctx: &SagaContext, status: ListingStatus) -> Result<bool> {
        call_with_timeout(
            "listing update",
            self.config.call_timeout,
            self.collaborators
                .listings
                .update_status(&ctx.listing_id, status),
        )
        .await
    }

    async fn publish(&self, ctx: &SagaContext) -> bool {
        match self.set_status(ctx, ListingStatus::Published).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(listing_id = %ctx.listing_id, "listing service rejected revert");
                false
            }
            Err(e) => {
                tracing::warn!(listing_id = %ctx.listing_id, error = %e, "failed to revert listing");
                false
            }
        }
    }
}

#[async_trait]
impl SagaStep for ReserveListingStep {
    fn name(&self) -> &'static str {
        STEP_RESERVE_LISTING
    }

    async fn execute(&self, ctx: &SagaContext) -> Result<StepData> {
        let listing = call_with_timeout(
            "listing lookup",
            self.config.call_timeout,
            self.collaborators.listings.get_listing(&ctx.listing_id),
        )
        .await?
        .ok_or_else(|| SagaError::ListingService(format!("listing {} not found", ctx.listing_id)))?;

        if listing.seller_id != ctx.seller_id {
            return Err(SagaError::ListingService(format!(
                "listing {} is not owned by seller {}",
                ctx.listing_id, ctx.seller_id
            )));
        }
        if listing.status != ListingStatus::Published {
            return Err(SagaError::ListingService(format!(
                "listing {} is {:?}, expected Published",
                ctx.listing_id, listing.status
            )));
        }

        let failure = match self.set_status(ctx, ListingStatus::InTransaction).await {
            Ok(true) => return Ok(StepData::default()),
            Ok(false) => SagaError::ListingService(format!(
                "listing service rejected reservation of {}",
                ctx.listing_id
            )),
            Err(e) => e,
        };

        // The change may have been applied before the failure surfaced
        self.publish(ctx).await;
        Err(failure)
    }

    async fn compensate(&self, ctx: &SagaContext) -> bool {
        self.publish(ctx).await
    }
}
