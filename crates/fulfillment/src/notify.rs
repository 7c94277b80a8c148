//! Customer notifications.
//!
//! The dispatcher composes status emails, hands them to the email provider,
//! and records every attempt as a [`NotificationRecord`]. Delivery-status
//! webhooks from the provider later advance those records, never the other
//! way around: the dispatcher runs strictly downstream of a committed order
//! state change, so a provider outage can never roll back an order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{instrument, warn};

use tidepool_core::{
    Email, NotificationId, NotificationKind, NotificationRecord, NotificationStatus, Order,
    ProviderMessageId,
};

use crate::error::FulfillmentError;
use crate::store::NotificationStore;

/// Errors from the email provider.
#[derive(Debug, Error)]
pub enum EmailError {
    /// Provider returned a non-2xx response.
    #[error("email provider rejected request: {status} {message}")]
    Rejected { status: u16, message: String },

    /// Network failure or timeout. Retryable.
    #[error("email request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not match any known shape.
    #[error("email response unparseable: {0}")]
    Parse(String),
}

/// A composed email ready for the provider.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: Email,
    pub subject: String,
    pub html_body: String,
}

/// Transactional email sending.
#[async_trait]
pub trait EmailApi: Send + Sync {
    /// Send one email and return the provider's message ID.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] when the provider rejects the message or is
    /// unreachable.
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, EmailError>;
}

/// HTTP email client.
///
/// Cheap to clone; all requests share one connection pool and a bounded
/// 30-second timeout.
#[derive(Clone)]
pub struct HttpEmailClient {
    inner: Arc<EmailClientInner>,
}

struct EmailClientInner {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    from_address: String,
}

impl HttpEmailClient {
    /// Create an email client for the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        from_address: impl Into<String>,
    ) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(EmailClientInner {
                client,
                base_url: base_url.into().trim_end_matches('/').to_owned(),
                api_key,
                from_address: from_address.into(),
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[async_trait]
impl EmailApi for HttpEmailClient {
    #[instrument(skip(self, email), fields(subject = %email.subject))]
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, EmailError> {
        let body = serde_json::json!({
            "from": self.inner.from_address,
            "to": [email.to.as_str()],
            "subject": email.subject,
            "html": email.html_body,
        });

        let response = self
            .inner
            .client
            .post(format!("{}/emails", self.inner.base_url))
            .bearer_auth(self.inner.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| EmailError::Parse(e.to_string()))?;

        Ok(ProviderMessageId::new(sent.id))
    }
}

/// Composes, sends, and records customer notifications.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Arc<dyn EmailApi>,
    store: Arc<dyn NotificationStore>,
    store_name: String,
}

impl NotificationDispatcher {
    pub fn new(
        email: Arc<dyn EmailApi>,
        store: Arc<dyn NotificationStore>,
        store_name: impl Into<String>,
    ) -> Self {
        Self {
            email,
            store,
            store_name: store_name.into(),
        }
    }

    /// Send an order notification and record the attempt.
    ///
    /// A provider failure is still recorded (as a `Failed` record, eligible
    /// for manual resend) before the error is returned; the caller decides
    /// whether that failure matters for its own unit of work.
    ///
    /// # Errors
    ///
    /// Returns the provider error on send failure, or a repository error if
    /// the record cannot be persisted.
    #[instrument(skip(self, order), fields(order_id = %order.id, kind = ?kind))]
    pub async fn send_order_notification(
        &self,
        order: &Order,
        kind: NotificationKind,
    ) -> Result<NotificationRecord, FulfillmentError> {
        let (subject, html_body) = self.compose(order, kind);
        let outbound = OutboundEmail {
            to: order.customer.email.clone(),
            subject: subject.clone(),
            html_body: html_body.clone(),
        };

        let now = Utc::now();
        let mut record = NotificationRecord {
            id: NotificationId::generate(),
            order_id: Some(order.id),
            recipient: order.customer.email.clone(),
            kind,
            status: NotificationStatus::Sent,
            provider_message_id: None,
            subject,
            html_body,
            created_at: now,
            updated_at: now,
        };

        match self.email.send(&outbound).await {
            Ok(message_id) => {
                record.provider_message_id = Some(message_id);
                self.store.insert(record.clone()).await?;
                Ok(record)
            }
            Err(err) => {
                warn!(error = %err, "notification send failed, recording for resend");
                record.status = NotificationStatus::Failed;
                self.store.insert(record).await?;
                Err(err.into())
            }
        }
    }

    /// Apply a provider delivery-status update to the matching record.
    ///
    /// Returns true if a record changed. Unknown message IDs and
    /// non-advancing updates are ignored; status webhooks arrive
    /// at-least-once and out of order, so the advance runs atomically in
    /// the store and a stale update can never overwrite a terminal record.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store fails.
    #[instrument(skip(self))]
    pub async fn apply_provider_status(
        &self,
        message_id: &ProviderMessageId,
        status: NotificationStatus,
    ) -> Result<bool, FulfillmentError> {
        let Some(changed) = self
            .store
            .advance_status(message_id, status, Utc::now())
            .await?
        else {
            warn!(%message_id, "status update for unknown provider message, ignoring");
            return Ok(false);
        };
        Ok(changed)
    }

    /// Send an ad hoc support reply about an order and record it.
    ///
    /// # Errors
    ///
    /// Returns the provider error on send failure, or a repository error if
    /// the record cannot be persisted.
    #[instrument(skip_all, fields(order_id = %order.id))]
    pub async fn send_support_reply(
        &self,
        order: &Order,
        subject: String,
        html_body: String,
    ) -> Result<NotificationRecord, FulfillmentError> {
        let message_id = self
            .email
            .send(&OutboundEmail {
                to: order.customer.email.clone(),
                subject: subject.clone(),
                html_body: html_body.clone(),
            })
            .await?;

        let now = Utc::now();
        let record = NotificationRecord {
            id: NotificationId::generate(),
            order_id: Some(order.id),
            recipient: order.customer.email.clone(),
            kind: NotificationKind::SupportReply,
            status: NotificationStatus::Sent,
            provider_message_id: Some(message_id),
            subject,
            html_body,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone()).await?;
        Ok(record)
    }

    /// Re-send a previously failed notification verbatim.
    ///
    /// Failed is a terminal status, so the resend gets a fresh record
    /// rather than mutating the old one.
    ///
    /// # Errors
    ///
    /// Returns [`FulfillmentError::Validation`] if the record is missing or
    /// not in the `Failed` status, or the provider error on send failure.
    #[instrument(skip(self))]
    pub async fn resend(&self, id: NotificationId) -> Result<NotificationRecord, FulfillmentError> {
        let Some(original) = self.store.get(id).await? else {
            return Err(FulfillmentError::Validation(format!(
                "no notification with id {id}"
            )));
        };
        if original.status != NotificationStatus::Failed {
            return Err(FulfillmentError::Validation(format!(
                "notification {id} is {:?}, only failed notifications can be re-sent",
                original.status
            )));
        }

        let outbound = OutboundEmail {
            to: original.recipient.clone(),
            subject: original.subject.clone(),
            html_body: original.html_body.clone(),
        };
        let message_id = self.email.send(&outbound).await?;

        let now = Utc::now();
        let record = NotificationRecord {
            id: NotificationId::generate(),
            order_id: original.order_id,
            recipient: original.recipient,
            kind: original.kind,
            status: NotificationStatus::Sent,
            provider_message_id: Some(message_id),
            subject: original.subject,
            html_body: original.html_body,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(record.clone()).await?;
        Ok(record)
    }

    fn compose(&self, order: &Order, kind: NotificationKind) -> (String, String) {
        let short_ref = &order.payment_reference;
        match kind {
            NotificationKind::OrderConfirmation => {
                let items: String = order
                    .items
                    .iter()
                    .map(|item| {
                        format!("<li>{} &times; {}</li>", item.quantity, item.name)
                    })
                    .collect();
                (
                    format!("{}: order confirmed", self.store_name),
                    format!(
                        "<p>Hi {name},</p><p>Thanks for your order ({short_ref}). \
                         We'll let you know when it ships.</p><ul>{items}</ul>",
                        name = order.customer.name,
                    ),
                )
            }
            NotificationKind::ShippingConfirmation => {
                let tracking = order.tracking_url.as_deref().map_or_else(
                    || "<p>Tracking details will follow shortly.</p>".to_owned(),
                    |url| format!("<p><a href=\"{url}\">Track your package</a></p>"),
                );
                (
                    format!("{}: your order is on its way", self.store_name),
                    format!(
                        "<p>Hi {name},</p><p>Your order ({short_ref}) has shipped.</p>{tracking}",
                        name = order.customer.name,
                    ),
                )
            }
            NotificationKind::DeliveredConfirmation => (
                format!("{}: your order has been delivered", self.store_name),
                format!(
                    "<p>Hi {name},</p><p>Your order ({short_ref}) has been delivered. Enjoy!</p>",
                    name = order.customer.name,
                ),
            ),
            NotificationKind::StatusUpdate => (
                format!("{}: order update", self.store_name),
                format!(
                    "<p>Hi {name},</p><p>Your order ({short_ref}) is now {status}.</p>",
                    name = order.customer.name,
                    status = order.status,
                ),
            ),
            NotificationKind::SupportReply => (
                format!("{}: a message about your order", self.store_name),
                format!(
                    "<p>Hi {name},</p><p>We have an update regarding your order \
                     ({short_ref}).</p>",
                    name = order.customer.name,
                ),
            ),
        }
    }
}
