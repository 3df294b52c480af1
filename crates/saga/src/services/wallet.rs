//! Wallet service trait and in-memory implementation.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, UserId};

use super::simulate_latency;
use crate::error::SagaError;

/// Trait for wallet operations.
///
/// Every call carries a caller-chosen `reference`. Implementations must treat
/// a repeated reference as the same operation and not move money twice.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Moves funds between two users. Returns false if the wallet declined.
    async fn transfer(
        &self,
        from: &UserId,
        to: &UserId,
        amount: Money,
        reference: &str,
    ) -> Result<bool, SagaError>;

    /// Credits held funds back to a user. Returns false if the wallet declined.
    async fn release(&self, user: &UserId, amount: Money, reference: &str)
    -> Result<bool, SagaError>;

    /// Places funds on hold for a user. Returns false if the wallet declined.
    async fn hold(&self, user: &UserId, amount: Money, reference: &str) -> Result<bool, SagaError>;
}

/// Kind of wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOperationKind {
    Transfer,
    Release,
    Hold,
}

/// A money movement applied by the in-memory wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletOperation {
    pub kind: WalletOperationKind,
    pub from: Option<UserId>,
    pub to: UserId,
    pub amount: Money,
    pub reference: String,
}

#[derive(Debug, Default)]
struct InMemoryWalletState {
    operations: Vec<WalletOperation>,
    references: HashSet<String>,
    attempts: usize,
    fail_on_transfer: bool,
    fail_on_release: bool,
    decline: bool,
    delay: Option<Duration>,
}

/// In-memory wallet for testing.
///
/// Deduplicates by reference: a repeated reference returns true without
/// applying a second movement.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWalletService {
    state: Arc<RwLock<InMemoryWalletState>>,
}

impl InMemoryWalletService {
    /// Creates a new in-memory wallet.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryWalletState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryWalletState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures transfers to fail with an error.
    pub fn set_fail_on_transfer(&self, fail: bool) {
        self.write().fail_on_transfer = fail;
    }

    /// Configures releases to fail with an error.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.write().fail_on_release = fail;
    }

    /// Configures every call to be declined (returns false).
    pub fn set_decline(&self, decline: bool) {
        self.write().decline = decline;
    }

    /// Delays every call by the given duration.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.write().delay = delay;
    }

    /// Returns every applied movement, oldest first.
    pub fn operations(&self) -> Vec<WalletOperation> {
        self.read().operations.clone()
    }

    /// Returns the applied movements of one kind.
    pub fn operations_of(&self, kind: WalletOperationKind) -> Vec<WalletOperation> {
        self.read()
            .operations
            .iter()
            .filter(|op| op.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns how many calls were received, including failed and repeated ones.
    pub fn attempt_count(&self) -> usize {
        self.read().attempts
    }

    fn delay(&self) -> Option<Duration> {
        self.read().delay
    }

    fn apply(&self, operation: WalletOperation, fail: bool) -> Result<bool, SagaError> {
        let mut state = self.write();
        state.attempts += 1;

        if fail {
            return Err(SagaError::WalletService(format!(
                "wallet unavailable for {}",
                operation.reference
            )));
        }
        if state.decline {
            return Ok(false);
        }
        if !state.references.insert(operation.reference.clone()) {
            return Ok(true);
        }

        state.operations.push(operation);
        Ok(true)
    }
}

#[async_trait]
impl WalletService for InMemoryWalletService {
    async fn transfer(
        &self,
        from: &UserId,
        to: &UserId,
        amount: Money,
        reference: &str,
    ) -> Result<bool, SagaError> {
        simulate_latency(self.delay()).await;
        let fail = self.read().fail_on_transfer;
        self.apply(
            WalletOperation {
                kind: WalletOperationKind::Transfer,
                from: Some(from.clone()),
                to: to.clone(),
                amount,
                reference: reference.to_string(),
            },
            fail,
        )
    }

    async fn release(
        &self,
        user: &UserId,
        amount: Money,
        reference: &str,
    ) -> Result<bool, SagaError> {
        simulate_latency(self.delay()).await;
        let fail = self.read().fail_on_release;
        self.apply(
            WalletOperation {
                kind: WalletOperationKind::Release,
                from: None,
                to: user.clone(),
                amount,
                reference: reference.to_string(),
            },
            fail,
        )
    }

    async fn hold(&self, user: &UserId, amount: Money, reference: &str) -> Result<bool, SagaError> {
        simulate_latency(self.delay()).await;
        self.apply(
            WalletOperation {
                kind: WalletOperationKind::Hold,
                from: Some(user.clone()),
                to: user.clone(),
                amount,
                reference: reference.to_string(),
            },
            false,
        )
    }
}
