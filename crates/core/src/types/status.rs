//! Purchase status and the payment-event state machine.
//!
//! ```text
//!            processing              settled
//!   new ───────────────► payment-processing ──────► Settle()
//!    │ \                                              │
//!    │  \──────────── settled ───────────────────────►│
//!    │                                                ├──► finalized
//!    │ expired                                        └──► underdelivered ─┐
//!    ▼                                                       ▲  restock    │
//!  expired                                                   └─────────────┘
//! ```
//!
//! Transitions only move forward. There is no way back to `new` and no way
//! out of `finalized` or `expired`.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.purchase_status", rename_all = "kebab-case")
)]
#[serde(rename_all = "kebab-case")]
pub enum PurchaseStatus {
    /// Order placed, waiting for payment.
    #[default]
    New,
    /// A payment is on the way but not yet confirmed.
    PaymentProcessing,
    /// Paid, but stock ran out before every unit could be delivered.
    Underdelivered,
    /// Paid and fully delivered.
    Finalized,
    /// Payment never arrived in time.
    Expired,
}

impl PurchaseStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::PaymentProcessing,
        Self::Underdelivered,
        Self::Finalized,
        Self::Expired,
    ];

    /// The status is final and no event can change it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Expired)
    }

    /// Unpaid: the customer still has to pay.
    #[must_use]
    pub const fn is_unpaid(self) -> bool {
        matches!(self, Self::New)
    }

    /// The customer is waiting for something (payment confirmation or codes).
    #[must_use]
    pub const fn is_waiting(self) -> bool {
        matches!(
            self,
            Self::New | Self::PaymentProcessing | Self::Underdelivered
        )
    }

    /// Purchases in this status are removed by the cleanup sweep once their
    /// delete date has passed.
    #[must_use]
    pub const fn is_cleanup_candidate(self) -> bool {
        matches!(self, Self::New | Self::Expired | Self::Finalized)
    }

    /// Decide what a payment event means for a purchase in this status.
    ///
    /// Repeated deliveries of the same event (webhook retries) resolve to
    /// [`Transition::Ignore`] rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::NotAllowed` for events that would move the
    /// purchase backwards or out of a terminal status.
    pub const fn on_event(self, event: PaymentEvent) -> Result<Transition, TransitionError> {
        match (self, event) {
            (Self::New, PaymentEvent::Processing) => Ok(Transition::MarkProcessing),
            (Self::New | Self::PaymentProcessing | Self::Underdelivered, PaymentEvent::Settled) => {
                Ok(Transition::Settle)
            }
            (Self::New, PaymentEvent::Expired) => Ok(Transition::Expire),
            (Self::PaymentProcessing, PaymentEvent::Processing)
            | (Self::Finalized, PaymentEvent::Settled)
            | (Self::Expired, PaymentEvent::Expired) => Ok(Transition::Ignore),
            (from, event) => Err(TransitionError::NotAllowed { from, event }),
        }
    }

    /// Stable string form, identical to the serde and database encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PaymentProcessing => "payment-processing",
            Self::Underdelivered => "underdelivered",
            Self::Finalized => "finalized",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid purchase status: {s}"))
    }
}

/// Payment state reported by a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEvent {
    /// Payment seen but not yet confirmed.
    Processing,
    /// Payment confirmed; goods may be delivered.
    Settled,
    /// The invoice expired without (sufficient) payment.
    Expired,
}

impl std::fmt::Display for PaymentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Settled => write!(f, "settled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// What to do in response to a payment event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Set status to `payment-processing`.
    MarkProcessing,
    /// Run the settlement (withdraw stock and deliver).
    Settle,
    /// Set status to `expired`.
    Expire,
    /// Nothing to do; the event was already applied.
    Ignore,
}

/// A payment event that does not apply to the purchase's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("payment event '{event}' not allowed in status '{from}'")]
    NotAllowed {
        from: PurchaseStatus,
        event: PaymentEvent,
    },
}
