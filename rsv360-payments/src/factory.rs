//! Gateway factory and the provider-agnostic facade
//!
//! Callers pick a gateway by name and get a [`GatewayHandle`] exposing the
//! four payment operations in major units with normalized statuses. Unit
//! conversion for Stripe happens here and nowhere else.

use crate::{
    config::PaymentsConfig,
    error::{PaymentError, PaymentResult},
    money::{from_minor, normalize_currency, to_minor},
    provider::PaymentProvider,
    providers::{
        MercadoPagoProvider, StripeProvider,
        mercado_pago::{MercadoPagoPayment, MercadoPagoPaymentRequest, MercadoPagoRefundRequest},
        stripe::{STRIPE_MIN_AMOUNT, StripePaymentIntent, StripePaymentRequest, StripeRefundRequest},
    },
    types::{DEFAULT_CURRENCY, Gateway, Metadata, Payment, PaymentRequest, PaymentStatus, Refund, RefundRequest},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Map a Stripe payment intent status onto the normalized vocabulary.
pub fn normalize_stripe_status(status: &str) -> PaymentStatus {
    match status {
        "succeeded" => PaymentStatus::Confirmed,
        "requires_payment_method"
        | "requires_confirmation"
        | "requires_action"
        | "processing"
        | "requires_capture" => PaymentStatus::Pending,
        "canceled" => PaymentStatus::Cancelled,
        other => PaymentStatus::Other(other.to_string()),
    }
}

/// Whether `name` selects a supported gateway
pub fn is_gateway_supported(name: &str) -> bool {
    Gateway::parse(name).is_some()
}

/// Names of all supported gateways
pub fn available_gateways() -> Vec<&'static str> {
    Gateway::names()
}

/// Stripe behind the uniform interface, converting major to minor units
pub struct StripeGateway {
    provider: StripeProvider,
}

impl StripeGateway {
    pub fn new(provider: StripeProvider) -> Self {
        Self { provider }
    }

    fn payment(intent: StripePaymentIntent) -> Payment {
        let mut extras = Metadata::new();
        extras.insert("provider_status".into(), intent.status.clone().into());
        if let Some(charge_id) = intent.latest_charge_id() {
            extras.insert("charge_id".into(), charge_id.into());
        }
        if let Some(url) = intent.latest_charge().and_then(|c| c.receipt_url.clone()) {
            extras.insert("receipt_url".into(), url.into());
        }

        Payment {
            gateway: Gateway::Stripe,
            status: normalize_stripe_status(&intent.status),
            amount: from_minor(intent.amount),
            currency: normalize_currency(&intent.currency),
            transaction_id: intent.id,
            client_secret: intent.client_secret,
            metadata: intent.metadata,
            extras,
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Stripe
    }

    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<Payment> {
        // Minimum applies to the major-unit amount, before any conversion
        let minimum = from_minor(STRIPE_MIN_AMOUNT);
        if request.amount < minimum {
            return Err(PaymentError::InsufficientAmount(format!(
                "minimum amount is {}, got {}",
                minimum, request.amount
            )));
        }

        let intent = self
            .provider
            .create_payment(StripePaymentRequest {
                amount: to_minor(request.amount)?,
                currency: request.currency,
                payment_method_id: request.payment_method_id,
                card_data: request.card_data,
                customer_id: request.customer_id,
                description: request.description,
                metadata: request.metadata,
                idempotency_key: request.idempotency_key,
            })
            .await?;
        Ok(Self::payment(intent))
    }

    async fn confirm_payment(&self, transaction_id: &str) -> PaymentResult<Payment> {
        let intent = self.provider.confirm_payment(transaction_id).await?;
        Ok(Self::payment(intent))
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        request: RefundRequest,
    ) -> PaymentResult<Refund> {
        let refund = self
            .provider
            .refund_payment(
                transaction_id,
                StripeRefundRequest {
                    amount: request.amount.map(to_minor).transpose()?,
                    reason: request.reason,
                },
            )
            .await?;

        Ok(Refund {
            refund_id: refund.id,
            transaction_id: transaction_id.trim().to_string(),
            amount: from_minor(refund.amount),
            currency: normalize_currency(&refund.currency),
            status: refund.status.unwrap_or_default(),
        })
    }

    async fn get_payment(&self, transaction_id: &str) -> PaymentResult<Payment> {
        let intent = self.provider.get_payment(transaction_id).await?;
        Ok(Self::payment(intent))
    }
}

/// Mercado Pago behind the uniform interface; amounts pass through
pub struct MercadoPagoGateway {
    provider: MercadoPagoProvider,
}

impl MercadoPagoGateway {
    pub fn new(provider: MercadoPagoProvider) -> Self {
        Self { provider }
    }

    fn payment(payment: MercadoPagoPayment, fallback_currency: &str) -> Payment {
        Payment {
            gateway: Gateway::MercadoPago,
            status: payment.normalized_status(),
            amount: payment.transaction_amount,
            currency: payment
                .currency_id
                .clone()
                .unwrap_or_else(|| fallback_currency.to_string()),
            client_secret: None,
            extras: payment.extras(),
            transaction_id: payment.id,
            metadata: payment.metadata,
        }
    }
}

#[async_trait]
impl PaymentProvider for MercadoPagoGateway {
    fn gateway(&self) -> Gateway {
        Gateway::MercadoPago
    }

    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<Payment> {
        let currency = request.currency.clone();
        let payment = self
            .provider
            .create_payment(MercadoPagoPaymentRequest {
                amount: request.amount,
                payment_method_id: request.payment_method_id,
                card_token: request.card_token,
                card_data: request.card_data,
                description: request.description,
                payer_email: request.payer_email,
                installments: request.installments,
                issuer_id: request.issuer_id,
                metadata: request.metadata,
                idempotency_key: request.idempotency_key,
            })
            .await?;
        Ok(Self::payment(payment, &currency))
    }

    async fn confirm_payment(&self, transaction_id: &str) -> PaymentResult<Payment> {
        let payment = self.provider.confirm_payment(transaction_id).await?;
        Ok(Self::payment(payment, DEFAULT_CURRENCY))
    }

    async fn refund_payment(
        &self,
        transaction_id: &str,
        request: RefundRequest,
    ) -> PaymentResult<Refund> {
        let refund = self
            .provider
            .refund_payment(
                transaction_id,
                MercadoPagoRefundRequest {
                    amount: request.amount,
                    reason: request.reason,
                },
            )
            .await?;

        Ok(Refund {
            refund_id: refund.id,
            transaction_id: refund.payment_id,
            amount: refund.amount,
            currency: refund
                .currency_id
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            status: refund.status.unwrap_or_default(),
        })
    }

    async fn get_payment(&self, transaction_id: &str) -> PaymentResult<Payment> {
        let payment = self.provider.get_payment(transaction_id).await?;
        Ok(Self::payment(payment, DEFAULT_CURRENCY))
    }
}

/// A selected gateway exposing the four payment operations.
///
/// Cheap to clone; clones share the underlying provider.
#[derive(Clone)]
pub struct GatewayHandle {
    gateway: Gateway,
    provider: Arc<dyn PaymentProvider>,
}

impl GatewayHandle {
    /// Canonical gateway name (`stripe`, `mercado_pago`)
    pub fn name(&self) -> &'static str {
        self.gateway.as_str()
    }

    /// Selected gateway
    pub fn gateway(&self) -> Gateway {
        self.gateway
    }

    /// Create a payment
    pub async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<Payment> {
        self.provider.create_payment(request).await
    }

    /// Confirm a payment
    pub async fn confirm_payment(&self, transaction_id: &str) -> PaymentResult<Payment> {
        self.provider.confirm_payment(transaction_id).await
    }

    /// Refund a payment
    pub async fn refund_payment(
        &self,
        transaction_id: &str,
        request: RefundRequest,
    ) -> PaymentResult<Refund> {
        self.provider.refund_payment(transaction_id, request).await
    }

    /// Read a payment
    pub async fn get_payment(&self, transaction_id: &str) -> PaymentResult<Payment> {
        self.provider.get_payment(transaction_id).await
    }
}

impl std::fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHandle")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

/// Builds gateway handles over adapters constructed once at startup
#[derive(Clone)]
pub struct GatewayFactory {
    stripe: Arc<dyn PaymentProvider>,
    mercado_pago: Arc<dyn PaymentProvider>,
}

impl GatewayFactory {
    /// Create a factory over already constructed adapters
    pub fn new(stripe: StripeProvider, mercado_pago: MercadoPagoProvider) -> Self {
        Self {
            stripe: Arc::new(StripeGateway::new(stripe)),
            mercado_pago: Arc::new(MercadoPagoGateway::new(mercado_pago)),
        }
    }

    /// Construct both adapters from configuration
    pub fn from_config(config: &PaymentsConfig) -> PaymentResult<Self> {
        Ok(Self::new(
            StripeProvider::new(&config.stripe, &config.client)?,
            MercadoPagoProvider::new(&config.mercado_pago, &config.client)?,
        ))
    }

    /// Select a gateway by name, ignoring case and surrounding whitespace.
    pub fn create_gateway(&self, name: &str) -> PaymentResult<GatewayHandle> {
        let gateway = Gateway::parse(name).ok_or_else(|| PaymentError::UnsupportedGateway {
            name: name.to_string(),
            available: available_gateways(),
        })?;
        Ok(self.gateway(gateway))
    }

    /// Handle for a known gateway
    pub fn gateway(&self, gateway: Gateway) -> GatewayHandle {
        let provider = match gateway {
            Gateway::Stripe => Arc::clone(&self.stripe),
            Gateway::MercadoPago => Arc::clone(&self.mercado_pago),
        };
        GatewayHandle { gateway, provider }
    }
}
