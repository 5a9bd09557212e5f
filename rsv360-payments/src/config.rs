//! Gateway configuration loaded from the environment

use crate::error::{PaymentError, PaymentResult};
use secrecy::SecretString;
use std::time::Duration;

/// Default Stripe API base URL
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Default Mercado Pago API base URL
pub const MERCADO_PAGO_API_BASE: &str = "https://api.mercadopago.com";

/// Stripe settings
#[derive(Debug)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: SecretString,
    /// API base URL
    pub api_base: String,
    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: Option<SecretString>,
}

impl StripeConfig {
    /// Create a Stripe configuration
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret(secret_key),
            api_base: STRIPE_API_BASE.to_string(),
            webhook_secret: None,
        }
    }

    /// Set a custom API base URL (for testing)
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    /// Set the webhook signing secret
    pub fn with_webhook_secret(mut self, value: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret(value));
        self
    }
}

/// Mercado Pago settings
#[derive(Debug)]
pub struct MercadoPagoConfig {
    /// Access token
    pub access_token: SecretString,
    /// API base URL
    pub api_base: String,
    /// Webhook signing secret
    pub webhook_secret: Option<SecretString>,
}

impl MercadoPagoConfig {
    /// Create a Mercado Pago configuration
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: secret(access_token),
            api_base: MERCADO_PAGO_API_BASE.to_string(),
            webhook_secret: None,
        }
    }

    /// Set a custom API base URL (for testing)
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    /// Set the webhook signing secret
    pub fn with_webhook_secret(mut self, value: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret(value));
        self
    }
}

/// HTTP client settings shared by both adapters
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Network timeout per request
    pub timeout: Duration,
    /// Automatic retries for idempotent reads
    pub max_network_retries: u32,
    /// Prefix for generated idempotency keys
    pub idempotency_prefix: String,
    /// Value injected as the `source` metadata field
    pub source: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            max_network_retries: 2,
            idempotency_prefix: "rsv360".to_string(),
            source: "rsv360".to_string(),
        }
    }
}

impl ClientConfig {
    /// Set the network timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry count for idempotent reads
    pub fn with_max_network_retries(mut self, retries: u32) -> Self {
        self.max_network_retries = retries;
        self
    }

    /// Set the idempotency key prefix
    pub fn with_idempotency_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.idempotency_prefix = prefix.into();
        self
    }
}

/// Complete payments configuration
#[derive(Debug)]
pub struct PaymentsConfig {
    pub stripe: StripeConfig,
    pub mercado_pago: MercadoPagoConfig,
    pub client: ClientConfig,
}

impl PaymentsConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    /// Missing credentials are not an error here; the provider rejects them
    /// on the first call.
    pub fn from_env() -> PaymentResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> PaymentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ClientConfig::default();
        let var_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let mut stripe = StripeConfig::new(lookup("STRIPE_SECRET_KEY").unwrap_or_default())
            .with_api_base(var_or("STRIPE_API_BASE", STRIPE_API_BASE));
        if let Some(secret) = lookup("STRIPE_WEBHOOK_SECRET") {
            stripe = stripe.with_webhook_secret(secret);
        }

        let mut mercado_pago =
            MercadoPagoConfig::new(lookup("MERCADOPAGO_ACCESS_TOKEN").unwrap_or_default())
                .with_api_base(var_or("MERCADOPAGO_API_BASE", MERCADO_PAGO_API_BASE));
        if let Some(secret) = lookup("MERCADOPAGO_WEBHOOK_SECRET") {
            mercado_pago = mercado_pago.with_webhook_secret(secret);
        }

        let timeout_ms = parse_number(
            "PAYMENT_GATEWAY_TIMEOUT_MS",
            lookup("PAYMENT_GATEWAY_TIMEOUT_MS"),
            defaults.timeout.as_millis() as u64,
        )?;
        let max_network_retries = parse_number(
            "PAYMENT_GATEWAY_MAX_RETRIES",
            lookup("PAYMENT_GATEWAY_MAX_RETRIES"),
            u64::from(defaults.max_network_retries),
        )?;
        let max_network_retries = u32::try_from(max_network_retries).map_err(|_| {
            PaymentError::Config(format!(
                "PAYMENT_GATEWAY_MAX_RETRIES is too large: {}",
                max_network_retries
            ))
        })?;

        let client = ClientConfig {
            timeout: Duration::from_millis(timeout_ms),
            max_network_retries,
            idempotency_prefix: var_or("PAYMENT_IDEMPOTENCY_PREFIX", &defaults.idempotency_prefix),
            source: var_or("PAYMENT_SOURCE", &defaults.source),
        };

        Ok(Self {
            stripe,
            mercado_pago,
            client,
        })
    }
}

fn secret(value: impl Into<String>) -> SecretString {
    SecretString::new(Into::<String>::into(value).into_boxed_str())
}

fn parse_number(key: &str, value: Option<String>, default: u64) -> PaymentResult<u64> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| PaymentError::Config(format!("{} must be a number, got '{}'", key, raw))),
    }
}
