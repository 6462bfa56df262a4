pub mod attachments;
pub mod config;
pub mod db;
pub mod gateways;
pub mod health;
pub mod ledger;
pub mod locations;
pub mod models;
pub mod routes;
pub mod scraper;
pub mod services;
pub mod sink;
pub mod validation;

use std::sync::Arc;

use crate::config::Config;
use crate::gateways::{
    ContinuationCodec, GatewayRegistry, HostedCheckoutConfig, HostedCheckoutGateway,
    VaultConfig, VaultGateway,
};
use crate::ledger::Ledger;
use crate::models::Provider;
use crate::services::{AdmissionService, DispatchService, PaymentService};

/// Shared state handed to every route handler
#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentService,
    pub admission: AdmissionService,
    pub dispatch: DispatchService,
    pub ledger: Arc<dyn Ledger>,
    /// Base URL of the web app callbacks redirect the payer to
    pub frontend_url: String,
    /// Providers with credentials, reported by the health check
    pub providers: Vec<Provider>,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        payments: PaymentService,
        admission: AdmissionService,
        dispatch: DispatchService,
        frontend_url: impl Into<String>,
    ) -> Self {
        let providers = payments.providers();
        Self {
            payments,
            admission,
            dispatch,
            ledger,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
            providers,
        }
    }
}

/// Payment gateways enabled for this process
pub struct Gateways {
    pub registry: GatewayRegistry,
    pub vault: Option<Arc<VaultGateway>>,
}

impl Gateways {
    /// Register the given gateway configurations; `None` leaves the
    /// provider disabled
    pub fn build(
        hosted: Option<HostedCheckoutConfig>,
        vault: Option<VaultConfig>,
        codec: ContinuationCodec,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        let mut registry = GatewayRegistry::new();

        if let Some(config) = hosted {
            match HostedCheckoutGateway::new(config, codec) {
                Ok(gateway) => registry.register(Arc::new(gateway)),
                Err(e) => tracing::warn!(
                    provider = %Provider::GatewayA,
                    error = %e,
                    "Payment provider disabled"
                ),
            }
        }

        let vault = vault.and_then(|config| match VaultGateway::new(config, ledger) {
            Ok(gateway) => {
                let gateway = Arc::new(gateway);
                registry.register(gateway.clone());
                Some(gateway)
            }
            Err(e) => {
                tracing::warn!(provider = %Provider::GatewayB, error = %e, "Payment provider disabled");
                None
            }
        });

        Self { registry, vault }
    }

    /// Build the gateways whose credentials are present in the environment
    pub fn from_env(config: &Config, ledger: Arc<dyn Ledger>) -> Self {
        let hosted = HostedCheckoutConfig::from_env(&config.public_base_url)
            .map_err(|e| {
                tracing::warn!(provider = %Provider::GatewayA, error = %e, "Payment provider disabled");
            })
            .ok();
        let vault = VaultConfig::from_env(&config.public_base_url)
            .map_err(|e| {
                tracing::warn!(provider = %Provider::GatewayB, error = %e, "Payment provider disabled");
            })
            .ok();

        let codec = ContinuationCodec::from_secret(config.continuation_signing_secret.as_deref());
        if !codec.is_signed() {
            tracing::warn!(
                "CONTINUATION_SIGNING_SECRET not set; continuation tokens are issued unsigned"
            );
        }

        Self::build(hosted, vault, codec, ledger)
    }

    pub fn into_service(self, ledger: Arc<dyn Ledger>) -> PaymentService {
        PaymentService::new(ledger, self.registry, self.vault)
    }
}
