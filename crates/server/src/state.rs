//! Application state shared across handlers.

use std::sync::Arc;

use tidepool_fulfillment::carrier::{CarrierError, HttpCarrierClient};
use tidepool_fulfillment::notify::{EmailError, HttpEmailClient, NotificationDispatcher};
use tidepool_fulfillment::quote::{RateCard, RateTier, WeightTable};
use tidepool_fulfillment::store::{
    InMemoryCartStore, InMemoryIdempotencyStore, InMemoryNotificationStore,
    InMemoryOrderRepository,
};
use tidepool_fulfillment::{Orchestrator, WebhookProcessor};

use crate::config::ServerConfig;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("carrier client: {0}")]
    Carrier(#[from] CarrierError),
    #[error("email client: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    orchestrator: Orchestrator,
    processor: WebhookProcessor,
}

impl AppState {
    /// Wire up the pipeline from configuration: HTTP provider clients,
    /// in-memory stores, orchestrator, and webhook processor.
    ///
    /// # Errors
    ///
    /// Returns an error if a provider HTTP client cannot be built.
    pub fn new(config: ServerConfig) -> Result<Self, StateError> {
        let carrier = Arc::new(HttpCarrierClient::new(
            config.carrier.base_url.clone(),
            config.carrier.api_key.clone(),
        )?);
        let email = Arc::new(HttpEmailClient::new(
            config.email.base_url.clone(),
            config.email.api_key.clone(),
            config.email.from_address.clone(),
        )?);

        let dispatcher = NotificationDispatcher::new(
            email,
            Arc::new(InMemoryNotificationStore::new()),
            config.store_name.clone(),
        );
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryCartStore::new()),
            carrier,
            dispatcher,
            default_rate_card(&config),
        );
        let processor = WebhookProcessor::new(
            orchestrator.clone(),
            Arc::new(InMemoryIdempotencyStore::default()),
            config.payment_webhook_secret.clone(),
            config.email_webhook_secret.clone(),
            config.carrier_webhook_token.clone(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                processor,
            }),
        })
    }

    /// Build state around an already-wired pipeline. Used by the
    /// integration tests to substitute fake providers and shared stores.
    #[must_use]
    pub fn with_pipeline(
        config: ServerConfig,
        orchestrator: Orchestrator,
        processor: WebhookProcessor,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                processor,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the fulfillment orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    /// Get a reference to the webhook processor.
    #[must_use]
    pub fn processor(&self) -> &WebhookProcessor {
        &self.inner.processor
    }
}

/// The standard rate card: per-category default weights plus three weight
/// tiers in the configured currency.
fn default_rate_card(config: &ServerConfig) -> RateCard {
    let weights = WeightTable::new()
        .with_category("apparel", 350)
        .with_category("footwear", 900)
        .with_category("accessories", 150);

    RateCard::new(
        config.carrier.name.clone(),
        config.quote_currency,
        weights,
        vec![
            RateTier {
                max_weight_grams: 1_000,
                pickup_point_minor: 495,
                home_delivery_minor: 795,
            },
            RateTier {
                max_weight_grams: 5_000,
                pickup_point_minor: 895,
                home_delivery_minor: 1_295,
            },
            RateTier {
                max_weight_grams: 20_000,
                pickup_point_minor: 1_495,
                home_delivery_minor: 1_995,
            },
        ],
    )
}
