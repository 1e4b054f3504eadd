//! Customer notifications.
//!
//! A customer may leave an email address or an ntfy topic with a purchase.
//! Once payment has been received they are told so over that channel.

use async_trait::async_trait;
use thiserror::Error;

use voucher_store_core::{Notify, NotifyProto, Purchase, PurchaseStatus};

use super::email::{EmailError, EmailService};
use super::ntfy::{NtfyClient, NtfyError};

/// Errors that can occur when notifying a customer.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("email notification failed: {0}")]
    Email(#[from] EmailError),

    #[error("ntfy notification failed: {0}")]
    Ntfy(#[from] NtfyError),

    #[error("{0} notifications are not configured")]
    NotConfigured(NotifyProto),
}

/// A notification ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// The "payment received" message for a purchase.
    #[must_use]
    pub fn payment_received(purchase: &Purchase) -> Self {
        let body = if purchase.status == PurchaseStatus::Underdelivered {
            "We have received your payment, but have gone out of stock meanwhile. \
             You will receive the missing codes as soon as possible. \
             Sorry for the inconvenience."
        } else {
            "We have received your payment. \
             Please download your vouchers within the next 30 days."
        };
        Self {
            subject: format!("Purchase {} payment received", purchase.id),
            body: body.to_string(),
        }
    }

    /// The message for an underdelivered purchase that a restock completed.
    #[must_use]
    pub fn restocked(purchase: &Purchase) -> Self {
        Self {
            subject: format!("Purchase {} delivered", purchase.id),
            body: "The missing vouchers of your purchase are now available. \
                   Please download them within the next 30 days."
                .to_string(),
        }
    }
}

/// Delivers notifications to customers.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Send `notification` to `target`.
    async fn send(
        &self,
        target: &Notify,
        notification: &Notification,
    ) -> Result<(), NotificationError>;
}

/// Sends over SMTP and ntfy.
#[derive(Clone)]
pub struct Notifier {
    email: Option<EmailService>,
    ntfy: NtfyClient,
}

impl Notifier {
    /// Create a notifier. Without an email service, email targets fail with
    /// `NotificationError::NotConfigured`.
    #[must_use]
    pub const fn new(email: Option<EmailService>, ntfy: NtfyClient) -> Self {
        Self { email, ntfy }
    }
}

#[async_trait]
impl NotificationSender for Notifier {
    async fn send(
        &self,
        target: &Notify,
        notification: &Notification,
    ) -> Result<(), NotificationError> {
        match target.proto {
            NotifyProto::Email => {
                let email = self
                    .email
                    .as_ref()
                    .ok_or(NotificationError::NotConfigured(NotifyProto::Email))?;
                email
                    .send_text(&target.addr, &notification.subject, &notification.body)
                    .await?;
            }
            NotifyProto::Ntfy => {
                self.ntfy
                    .publish(&target.addr, &notification.subject, &notification.body)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSender for NoopNotifier {
    async fn send(
        &self,
        _target: &Notify,
        _notification: &Notification,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}
