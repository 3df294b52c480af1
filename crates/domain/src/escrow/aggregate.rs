//! Escrow aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{EscrowId, ListingId, Money, OrderId, UserId, Version};
use serde::{Deserialize, Serialize};

use super::{
    DisputeResolution, EscrowError, EscrowEvent, EscrowEventKind, EscrowStatus, HoldTerms,
    PaymentInfo, PayoutInfo, PayoutStatus, Settlement,
};

/// Parameters for opening a new escrow.
#[derive(Debug, Clone)]
pub struct NewEscrow {
    pub listing_id: ListingId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub hold_terms: HoldTerms,
}

/// Escrow aggregate root.
///
/// A persisted document that is mutated in place by the creation saga and by
/// the post-hold operations. Every mutation appends to `events`, which is
/// never truncated or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    id: EscrowId,

    /// Version of the stored document, checked on every conditional write.
    #[serde(default)]
    version: Version,

    listing_id: ListingId,
    buyer_id: UserId,
    seller_id: UserId,

    /// Set once, when the order backing this escrow exists.
    order_id: Option<OrderId>,

    status: EscrowStatus,
    currency: String,
    amount_total: Money,

    /// Portion of `amount_total` currently held; never exceeds it.
    amount_hold: Money,

    hold_terms: HoldTerms,
    payment: PaymentInfo,
    payout: PayoutInfo,

    /// Payout claimed by an operation that has not completed yet.
    #[serde(default)]
    pending_settlement: Option<Settlement>,

    events: Vec<EscrowEvent>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Escrow {
    pub fn id(&self) -> EscrowId {
        self.id
    }

    /// Returns the version of the document as last loaded or stored.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Sets the document version.
    ///
    /// Called by repositories after a successful write.
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn listing_id(&self) -> &ListingId {
        &self.listing_id
    }

    pub fn buyer_id(&self) -> &UserId {
        &self.buyer_id
    }

    pub fn seller_id(&self) -> &UserId {
        &self.seller_id
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn status(&self) -> EscrowStatus {
        self.status
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn amount_total(&self) -> Money {
        self.amount_total
    }

    pub fn amount_hold(&self) -> Money {
        self.amount_hold
    }

    pub fn hold_terms(&self) -> &HoldTerms {
        &self.hold_terms
    }

    pub fn payment(&self) -> &PaymentInfo {
        &self.payment
    }

    /// Returns the payment intent ID, if one was authorized.
    pub fn intent_id(&self) -> Option<&str> {
        self.payment.intent_id.as_deref()
    }

    pub fn payout(&self) -> &PayoutInfo {
        &self.payout
    }

    pub fn pending_settlement(&self) -> Option<Settlement> {
        self.pending_settlement
    }

    /// Returns the audit log, oldest first.
    pub fn events(&self) -> &[EscrowEvent] {
        &self.events
    }

    /// Returns the kinds of all audit entries, oldest first.
    pub fn event_kinds(&self) -> Vec<EscrowEventKind> {
        self.events.iter().map(|e| e.kind).collect()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the user is the buyer or the seller.
    pub fn is_participant(&self, user_id: &UserId) -> bool {
        &self.buyer_id == user_id || &self.seller_id == user_id
    }

    /// Returns true if the escrow is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods
impl Escrow {
    /// Opens a new escrow in `CREATED` state and records the `CREATED` entry.
    pub fn open(params: NewEscrow, by: &str) -> Result<Self, EscrowError> {
        if !params.amount.is_positive() {
            return Err(EscrowError::InvalidAmount {
                cents: params.amount.cents(),
            });
        }
        if params.buyer_id == params.seller_id {
            return Err(EscrowError::SameParty);
        }

        let now = Utc::now();
        let description = format!(
            "escrow opened for listing {} ({} {})",
            params.listing_id, params.amount, params.currency
        );
        let mut escrow = Self {
            id: EscrowId::new(),
            version: Version::initial(),
            payout: PayoutInfo {
                seller_account: Some(params.seller_id.clone()),
                ..PayoutInfo::default()
            },
            listing_id: params.listing_id,
            buyer_id: params.buyer_id,
            seller_id: params.seller_id,
            order_id: None,
            status: EscrowStatus::Created,
            currency: params.currency,
            amount_total: params.amount,
            amount_hold: Money::zero(),
            hold_terms: params.hold_terms,
            payment: PaymentInfo::default(),
            pending_settlement: None,
            events: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        escrow.record(EscrowEventKind::Created, by, description);
        Ok(escrow)
    }

    /// Records a successful gateway authorization.
    pub fn authorize(
        &mut self,
        provider: impl Into<String>,
        intent_id: impl Into<String>,
        by: &str,
    ) -> Result<(), EscrowError> {
        self.transition(EscrowStatus::Authorized, "authorize")?;
        let intent_id = intent_id.into();
        self.payment.provider = Some(provider.into());
        self.payment.intent_id = Some(intent_id.clone());
        self.payment.authorized_at = Some(Utc::now());
        self.record(
            EscrowEventKind::Authorized,
            by,
            format!("payment intent {intent_id} authorized"),
        );
        Ok(())
    }

    /// Notes that the gateway authorization was voided during rollback.
    ///
    /// Leaves the status untouched; the escrow is failed separately.
    pub fn note_authorization_cancelled(&mut self, by: &str) {
        self.payment.cancelled_at = Some(Utc::now());
        let description = match &self.payment.intent_id {
            Some(intent) => format!("authorization {intent} cancelled"),
            None => "authorization cancelled".to_string(),
        };
        self.record(EscrowEventKind::AuthorizationCancelled, by, description);
    }

    /// Links the order backing this escrow.
    ///
    /// Linking the same order again is a no-op; linking a different one is an error.
    pub fn link_order(&mut self, order_id: OrderId) -> Result<(), EscrowError> {
        match &self.order_id {
            Some(existing) if existing == &order_id => Ok(()),
            Some(existing) => Err(EscrowError::OrderAlreadyLinked {
                existing: existing.clone(),
            }),
            None => {
                self.order_id = Some(order_id);
                self.touch();
                Ok(())
            }
        }
    }

    /// Records the capture of the authorized funds; the escrow now holds them.
    pub fn capture(&mut self, by: &str) -> Result<(), EscrowError> {
        self.transition(EscrowStatus::Holding, "capture")?;
        let now = Utc::now();
        self.set_hold(self.amount_total)?;
        self.payment.captured_at = Some(now);
        self.hold_terms.auto_release_at =
            Some(now + Duration::days(i64::from(self.hold_terms.auto_release_days)));
        self.record(
            EscrowEventKind::Captured,
            by,
            format!("{} {} captured and held", self.amount_total, self.currency),
        );
        Ok(())
    }

    /// Notes that a rollback refunded funds the gateway captured.
    ///
    /// Leaves the status untouched; the escrow is failed separately.
    pub fn note_capture_refunded(&mut self, by: &str) {
        self.payment.refunded_at = Some(Utc::now());
        let description = match &self.payment.intent_id {
            Some(intent) => format!("capture of {intent} refunded during rollback"),
            None => "capture refunded during rollback".to_string(),
        };
        self.record(EscrowEventKind::Refunded, by, description);
    }

    /// Claims the held funds for a payout in the given direction.
    ///
    /// The claim must be stored before any money moves. Returns false if the
    /// same direction was already claimed; a claim in the other direction is
    /// rejected.
    pub fn claim_settlement(&mut self, settlement: Settlement) -> Result<bool, EscrowError> {
        if !matches!(self.status, EscrowStatus::Holding | EscrowStatus::Disputed) {
            return Err(EscrowError::InvalidStateTransition {
                current: self.status,
                action: "claim settlement",
            });
        }
        self.check_settlement(settlement)?;
        if self.pending_settlement.is_some() {
            return Ok(false);
        }
        self.pending_settlement = Some(settlement);
        self.touch();
        Ok(true)
    }

    /// Pays the held funds out to the seller.
    pub fn release(&mut self, by: &str, reason: &str) -> Result<(), EscrowError> {
        self.check_settlement(Settlement::ToSeller)?;
        self.transition(EscrowStatus::Released, "release")?;
        self.pay_out();
        self.record(EscrowEventKind::Released, by, reason.to_string());
        Ok(())
    }

    /// Returns the held funds to the buyer.
    pub fn refund(&mut self, by: &str, reason: &str) -> Result<(), EscrowError> {
        self.check_settlement(Settlement::ToBuyer)?;
        self.transition(EscrowStatus::Refunded, "refund")?;
        self.return_to_buyer();
        self.record(EscrowEventKind::Refunded, by, reason.to_string());
        Ok(())
    }

    /// Puts the held funds under dispute.
    pub fn open_dispute(&mut self, by: &str, reason: &str) -> Result<(), EscrowError> {
        if let Some(pending) = self.pending_settlement {
            return Err(EscrowError::SettlementInProgress { pending });
        }
        self.transition(EscrowStatus::Disputed, "open dispute")?;
        self.record(EscrowEventKind::Disputed, by, reason.to_string());
        Ok(())
    }

    /// Settles a dispute, moving the held funds to the winning party.
    pub fn resolve(
        &mut self,
        resolution: DisputeResolution,
        by: &str,
        reason: &str,
    ) -> Result<(), EscrowError> {
        self.check_settlement(resolution.into())?;
        self.transition(EscrowStatus::Resolved, "resolve dispute")?;
        match resolution {
            DisputeResolution::ReleaseToSeller => self.pay_out(),
            DisputeResolution::RefundToBuyer => self.return_to_buyer(),
        }
        self.record(
            EscrowEventKind::Resolved,
            by,
            format!("{resolution}: {reason}"),
        );
        Ok(())
    }

    /// Marks the escrow as failed after the creation saga was rolled back.
    pub fn mark_failed(&mut self, by: &str, reason: &str) -> Result<(), EscrowError> {
        self.transition(EscrowStatus::Failed, "mark failed")?;
        self.record(EscrowEventKind::Failed, by, reason.to_string());
        Ok(())
    }

    fn transition(&mut self, next: EscrowStatus, action: &'static str) -> Result<(), EscrowError> {
        if !self.status.can_transition_to(next) {
            return Err(EscrowError::InvalidStateTransition {
                current: self.status,
                action,
            });
        }
        self.status = next;
        Ok(())
    }

    fn set_hold(&mut self, hold: Money) -> Result<(), EscrowError> {
        if hold > self.amount_total {
            return Err(EscrowError::HoldExceedsTotal {
                hold,
                total: self.amount_total,
            });
        }
        self.amount_hold = hold;
        Ok(())
    }

    fn check_settlement(&self, settlement: Settlement) -> Result<(), EscrowError> {
        match self.pending_settlement {
            Some(pending) if pending != settlement => {
                Err(EscrowError::SettlementInProgress { pending })
            }
            _ => Ok(()),
        }
    }

    fn pay_out(&mut self) {
        let now = Utc::now();
        self.pending_settlement = None;
        self.amount_hold = Money::zero();
        self.payout.seller_account = Some(self.seller_id.clone());
        self.payout.status = PayoutStatus::Paid;
        self.payout.paid_at = Some(now);
    }

    fn return_to_buyer(&mut self) {
        self.pending_settlement = None;
        self.amount_hold = Money::zero();
        self.payment.refunded_at = Some(Utc::now());
    }

    fn record(&mut self, kind: EscrowEventKind, by: &str, description: String) {
        let event = EscrowEvent::now(kind, by, description);
        self.updated_at = event.at;
        self.events.push(event);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escrow::SYSTEM_ACTOR;

    fn new_params() -> NewEscrow {
        NewEscrow {
            listing_id: ListingId::new("listing-1"),
            buyer_id: UserId::new("buyer"),
            seller_id: UserId::new("seller"),
            amount: Money::from_cents(10_000),
            currency: "USD".to_string(),
            hold_terms: HoldTerms::new(7),
        }
    }

    fn holding_escrow() -> Escrow {
        let mut escrow = Escrow::open(new_params(), "buyer").unwrap();
        escrow.authorize("mock", "pi_1", SYSTEM_ACTOR).unwrap();
        escrow.link_order(OrderId::new("ord_1")).unwrap();
        escrow.capture(SYSTEM_ACTOR).unwrap();
        escrow
    }

    #[test]
    fn test_open_records_created_event() {
        let escrow = Escrow::open(new_params(), "buyer").unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Created);
        assert_eq!(escrow.event_kinds(), vec![EscrowEventKind::Created]);
        assert_eq!(escrow.events()[0].by, "buyer");
        assert!(escrow.order_id().is_none());
        assert_eq!(escrow.amount_hold(), Money::zero());
        assert_eq!(escrow.version(), Version::initial());
    }

    #[test]
    fn test_open_rejects_invalid_amount() {
        let mut params = new_params();
        params.amount = Money::zero();
        assert!(matches!(
            Escrow::open(params, "buyer"),
            Err(EscrowError::InvalidAmount { cents: 0 })
        ));
    }

    #[test]
    fn test_open_rejects_self_dealing() {
        let mut params = new_params();
        params.seller_id = params.buyer_id.clone();
        assert!(matches!(
            Escrow::open(params, "buyer"),
            Err(EscrowError::SameParty)
        ));
    }

    #[test]
    fn test_forward_path_events_in_order() {
        let escrow = holding_escrow();
        assert_eq!(escrow.status(), EscrowStatus::Holding);
        assert_eq!(
            escrow.event_kinds(),
            vec![
                EscrowEventKind::Created,
                EscrowEventKind::Authorized,
                EscrowEventKind::Captured
            ]
        );
        assert_eq!(escrow.intent_id(), Some("pi_1"));
        assert_eq!(escrow.amount_hold(), escrow.amount_total());
        assert!(escrow.hold_terms().auto_release_at.is_some());
        assert!(escrow.payment().captured_at.is_some());
    }

    #[test]
    fn test_capture_requires_authorization() {
        let mut escrow = Escrow::open(new_params(), "buyer").unwrap();
        let err = escrow.capture(SYSTEM_ACTOR).unwrap_err();
        assert!(matches!(
            err,
            EscrowError::InvalidStateTransition {
                current: EscrowStatus::Created,
                ..
            }
        ));
        assert_eq!(escrow.event_kinds(), vec![EscrowEventKind::Created]);
    }

    #[test]
    fn test_order_is_linked_at_most_once() {
        let mut escrow = Escrow::open(new_params(), "buyer").unwrap();
        escrow.link_order(OrderId::new("ord_1")).unwrap();
        escrow.link_order(OrderId::new("ord_1")).unwrap();
        let err = escrow.link_order(OrderId::new("ord_2")).unwrap_err();
        assert!(matches!(err, EscrowError::OrderAlreadyLinked { .. }));
        assert_eq!(escrow.order_id(), Some(&OrderId::new("ord_1")));
    }

    #[test]
    fn test_release_pays_seller() {
        let mut escrow = holding_escrow();
        escrow.release("seller", "item delivered").unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Released);
        assert_eq!(escrow.amount_hold(), Money::zero());
        assert_eq!(escrow.payout().status, PayoutStatus::Paid);
        assert!(escrow.payout().paid_at.is_some());
        assert_eq!(escrow.events().last().unwrap().kind, EscrowEventKind::Released);
    }

    #[test]
    fn test_refund_returns_to_buyer() {
        let mut escrow = holding_escrow();
        escrow.refund("buyer", "item returned").unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Refunded);
        assert!(escrow.payment().refunded_at.is_some());
        assert_eq!(escrow.payout().status, PayoutStatus::Pending);
        assert!(escrow.release("seller", "too late").is_err());
    }

    #[test]
    fn test_mark_failed_only_before_holding() {
        let mut escrow = Escrow::open(new_params(), "buyer").unwrap();
        escrow.authorize("mock", "pi_1", SYSTEM_ACTOR).unwrap();
        escrow.note_authorization_cancelled(SYSTEM_ACTOR);
        escrow.mark_failed(SYSTEM_ACTOR, "saga rolled back").unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Failed);
        assert!(escrow.payment().cancelled_at.is_some());
        assert_eq!(
            escrow.event_kinds(),
            vec![
                EscrowEventKind::Created,
                EscrowEventKind::Authorized,
                EscrowEventKind::AuthorizationCancelled,
                EscrowEventKind::Failed
            ]
        );

        let mut holding = holding_escrow();
        assert!(holding.mark_failed(SYSTEM_ACTOR, "nope").is_err());
    }

    #[test]
    fn test_dispute_and_resolve() {
        let mut escrow = holding_escrow();
        escrow.open_dispute("buyer", "item damaged").unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Disputed);
        assert!(escrow.release("seller", "mine").is_err());

        escrow
            .resolve(DisputeResolution::RefundToBuyer, "admin", "photos confirm damage")
            .unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Resolved);
        assert_eq!(escrow.amount_hold(), Money::zero());
        assert!(escrow.payment().refunded_at.is_some());
        assert!(escrow.events().last().unwrap().description.starts_with("refund_to_buyer"));
    }

    #[test]
    fn test_events_only_grow() {
        let mut escrow = holding_escrow();
        let before = escrow.events().to_vec();
        let _ = escrow.mark_failed(SYSTEM_ACTOR, "illegal");
        escrow.release("seller", "delivered").unwrap();
        assert_eq!(&escrow.events()[..before.len()], before.as_slice());
        assert_eq!(escrow.events().len(), before.len() + 1);
    }

    #[test]
    fn test_claim_blocks_dispute_and_other_direction() {
        let mut escrow = holding_escrow();
        assert!(escrow.claim_settlement(Settlement::ToSeller).unwrap());
        assert!(!escrow.claim_settlement(Settlement::ToSeller).unwrap());
        assert_eq!(escrow.pending_settlement(), Some(Settlement::ToSeller));

        let before = escrow.clone();
        assert!(matches!(
            escrow.open_dispute("buyer", "too late"),
            Err(EscrowError::SettlementInProgress {
                pending: Settlement::ToSeller
            })
        ));
        assert!(escrow.claim_settlement(Settlement::ToBuyer).is_err());
        assert!(escrow.refund("buyer", "returned").is_err());
        assert_eq!(escrow, before);

        escrow.release("seller", "delivered").unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Released);
        assert!(escrow.pending_settlement().is_none());
        assert_eq!(
            escrow.event_kinds().last(),
            Some(&EscrowEventKind::Released)
        );
    }

    #[test]
    fn test_resolution_must_match_claim() {
        let mut escrow = holding_escrow();
        escrow.open_dispute("buyer", "damaged").unwrap();
        escrow.claim_settlement(Settlement::ToBuyer).unwrap();

        assert!(
            escrow
                .resolve(DisputeResolution::ReleaseToSeller, "admin", "changed mind")
                .is_err()
        );
        escrow
            .resolve(DisputeResolution::RefundToBuyer, "admin", "damaged")
            .unwrap();
        assert_eq!(escrow.status(), EscrowStatus::Resolved);
        assert!(escrow.pending_settlement().is_none());
    }

    #[test]
    fn test_claim_requires_held_funds() {
        let mut escrow = Escrow::open(new_params(), "buyer").unwrap();
        assert!(matches!(
            escrow.claim_settlement(Settlement::ToSeller),
            Err(EscrowError::InvalidStateTransition {
                current: EscrowStatus::Created,
                ..
            })
        ));
        assert!(escrow.pending_settlement().is_none());
    }

    #[test]
    fn test_participants() {
        let escrow = holding_escrow();
        assert!(escrow.is_participant(&UserId::new("buyer")));
        assert!(escrow.is_participant(&UserId::new("seller")));
        assert!(!escrow.is_participant(&UserId::new("mallory")));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let escrow = holding_escrow();
        let json = serde_json::to_string(&escrow).unwrap();
        let deserialized: Escrow = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, escrow);
    }
}
