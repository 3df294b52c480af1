//! Listing service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{ListingId, UserId};
use serde::{Deserialize, Serialize};

use super::simulate_latency;
use crate::error::SagaError;

/// Availability of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    Published,
    InTransaction,
    Sold,
}

/// The subset of a listing the saga needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub status: ListingStatus,
}

/// Trait for listing service operations.
#[async_trait]
pub trait ListingService: Send + Sync {
    /// Moves a listing to a new status. Returns false if the service rejected it.
    async fn update_status(
        &self,
        listing_id: &ListingId,
        status: ListingStatus,
    ) -> Result<bool, SagaError>;

    /// Fetches a listing, or None if it doesn't exist.
    async fn get_listing(&self, listing_id: &ListingId) -> Result<Option<Listing>, SagaError>;
}

#[derive(Debug, Default)]
struct InMemoryListingState {
    listings: HashMap<ListingId, Listing>,
    updates: Vec<(ListingId, ListingStatus)>,
    fail_on: Option<ListingStatus>,
    reject_on: Option<ListingStatus>,
    delay: Option<Duration>,
}

/// In-memory listing service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryListingService {
    state: Arc<RwLock<InMemoryListingState>>,
}

impl InMemoryListingService {
    /// Creates a new in-memory listing service.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryListingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryListingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a published listing owned by the seller.
    pub fn publish(&self, listing_id: &ListingId, seller_id: &UserId) {
        self.insert(Listing {
            id: listing_id.clone(),
            seller_id: seller_id.clone(),
            status: ListingStatus::Published,
        });
    }

    /// Inserts or overwrites a listing.
    pub fn insert(&self, listing: Listing) {
        self.write().listings.insert(listing.id.clone(), listing);
    }

    /// Configures updates to the given status to fail with an error.
    pub fn set_fail_on_status(&self, status: Option<ListingStatus>) {
        self.write().fail_on = status;
    }

    /// Configures updates to the given status to be rejected.
    pub fn set_reject_on_status(&self, status: Option<ListingStatus>) {
        self.write().reject_on = status;
    }

    /// Delays every call by the given duration.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns the current status of a listing.
    pub fn status(&self, listing_id: &ListingId) -> Option<ListingStatus> {
        self.read().listings.get(listing_id).map(|l| l.status)
    }

    /// Returns every status update requested, oldest first.
    pub fn updates(&self) -> Vec<(ListingId, ListingStatus)> {
        self.read().updates.clone()
    }

    /// Returns how many times the listing was asked to go back to `Published`.
    pub fn revert_count(&self, listing_id: &ListingId) -> usize {
        self.read()
            .updates
            .iter()
            .filter(|(id, status)| id == listing_id && *status == ListingStatus::Published)
            .count()
    }

    fn delay(&self) -> Option<Duration> {
        self.read().delay
    }
}

#[async_trait]
impl ListingService for InMemoryListingService {
    async fn update_status(
        &self,
        listing_id: &ListingId,
        status: ListingStatus,
    ) -> Result<bool, SagaError> {
        simulate_latency(self.delay()).await;
        let mut state = self.write();
        state.updates.push((listing_id.clone(), status));

        if state.fail_on == Some(status) {
            return Err(SagaError::ListingService(format!(
                "cannot move listing {listing_id} to {status:?}"
            )));
        }
        if state.reject_on == Some(status) {
            return Ok(false);
        }

        match state.listings.get_mut(listing_id) {
            Some(listing) => {
                listing.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_listing(&self, listing_id: &ListingId) -> Result<Option<Listing>, SagaError> {
        simulate_latency(self.delay()).await;
        Ok(self.read().listings.get(listing_id).cloned())
    }
}
