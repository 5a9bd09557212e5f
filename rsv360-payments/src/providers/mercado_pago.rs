//! Mercado Pago payment provider implementation
//!
//! Mercado Pago works in major units, so amounts pass through unchanged.
//! Card, PIX and boleto payments all go through `/v1/payments`; the
//! `payment_method_id` decides which fields are attached.

use crate::{
    config::{ClientConfig, MercadoPagoConfig},
    error::{PaymentError, PaymentResult},
    provider::{ProviderClient, ProviderResponse, require_id, stamp_metadata},
    types::{CardData, Gateway, Metadata, PaymentStatus},
};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Methods that never carry card fields
const NON_CARD_METHODS: [&str; 5] = ["pix", "boleto", "bolbradesco", "pec", "account_money"];

/// Smallest amount Mercado Pago accepts, in major units
pub fn mercado_pago_min_amount() -> Decimal {
    Decimal::new(50, 2)
}

/// Map a Mercado Pago status onto the normalized vocabulary.
///
/// Unknown statuses pass through unchanged.
pub fn normalize_status(status: &str) -> PaymentStatus {
    match status {
        "pending" | "in_process" | "in_mediation" => PaymentStatus::Pending,
        "approved" | "authorized" => PaymentStatus::Confirmed,
        "rejected" => PaymentStatus::Failed,
        "cancelled" => PaymentStatus::Cancelled,
        "refunded" => PaymentStatus::Refunded,
        "charged_back" => PaymentStatus::Chargeback,
        other => PaymentStatus::Other(other.to_string()),
    }
}

/// Whether a method discriminator is a card (or card brand)
pub fn is_card_method(method: &str) -> bool {
    !NON_CARD_METHODS.contains(&method)
}

fn wire_method(method: &str) -> &str {
    match method {
        "boleto" => "bolbradesco",
        other => other,
    }
}

/// Mercado Pago provider
pub struct MercadoPagoProvider {
    client: ProviderClient,
    source: String,
}

/// Payment request in major units
#[derive(Debug, Clone, Default)]
pub struct MercadoPagoPaymentRequest {
    pub amount: Decimal,
    /// `credit_card`, `debit_card`, `pix`, `boleto` or a brand id
    pub payment_method_id: Option<String>,
    /// Card token created client-side
    pub card_token: Option<String>,
    /// Raw card fields, tokenized when no card token is given
    pub card_data: Option<CardData>,
    pub description: Option<String>,
    pub payer_email: Option<String>,
    pub installments: Option<u32>,
    pub issuer_id: Option<String>,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

/// Refund request in major units
#[derive(Debug, Clone, Default)]
pub struct MercadoPagoRefundRequest {
    /// Amount to refund (None = full refund)
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreatePaymentBody<'a> {
    #[serde(with = "rust_decimal::serde::float")]
    transaction_amount: Decimal,
    payment_method_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payer: Option<Payer<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuer_id: Option<&'a str>,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
struct Payer<'a> {
    email: &'a str,
}

/// Empty body means a full refund
#[derive(Debug, Serialize)]
struct RefundBody {
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    amount: Option<Decimal>,
}

impl MercadoPagoProvider {
    /// Create a new Mercado Pago provider
    pub fn new(config: &MercadoPagoConfig, settings: &ClientConfig) -> PaymentResult<Self> {
        let access_token = SecretString::new(config.access_token.expose_secret().into());
        Ok(Self {
            client: ProviderClient::new(
                &config.api_base,
                access_token,
                "X-Idempotency-Key",
                settings,
            )?,
            source: settings.source.clone(),
        })
    }

    /// Create a payment
    pub async fn create_payment(
        &self,
        request: MercadoPagoPaymentRequest,
    ) -> PaymentResult<MercadoPagoPayment> {
        if request.amount < mercado_pago_min_amount() {
            return Err(PaymentError::InsufficientAmount(format!(
                "minimum amount is {}, got {}",
                mercado_pago_min_amount(),
                request.amount
            )));
        }
        let method = request
            .payment_method_id
            .as_deref()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                PaymentError::InvalidRequest("payment_method_id is required".to_string())
            })?;
        let idempotency_key = self.client.idempotency_key(request.idempotency_key.as_deref());
        let card = is_card_method(&method);

        let token = match (card, &request.card_token, &request.card_data) {
            (false, _, _) => None,
            (true, Some(token), _) => Some(token.clone()),
            (true, None, Some(card_data)) => Some(
                self.create_card_token(card_data, &format!("{}-card", idempotency_key))
                    .await?,
            ),
            (true, None, None) => {
                return Err(PaymentError::InvalidRequest(
                    "card payments require a card token or card data".to_string(),
                ));
            }
        };

        let body = CreatePaymentBody {
            transaction_amount: request.amount,
            payment_method_id: wire_method(&method),
            description: request.description.as_deref(),
            payer: request.payer_email.as_deref().map(|email| Payer { email }),
            token,
            installments: card.then(|| request.installments.unwrap_or(1)),
            issuer_id: request.issuer_id.as_deref().filter(|_| card),
            metadata: stamp_metadata(request.metadata.clone(), &self.source),
        };

        debug!(
            gateway = "mercado_pago",
            amount = %request.amount,
            method = %method,
            "Creating payment"
        );
        let payment: MercadoPagoPayment = decode(
            self.client
                .post_json("/v1/payments", &body, &idempotency_key)
                .await,
        )?;

        info!(
            gateway = "mercado_pago",
            transaction_id = %payment.id,
            status = %payment.status,
            "Payment created"
        );
        Ok(payment)
    }

    /// Confirm a payment.
    ///
    /// Mercado Pago needs no confirmation call after creation, so this only
    /// reads the current state.
    pub async fn confirm_payment(&self, transaction_id: &str) -> PaymentResult<MercadoPagoPayment> {
        self.get_payment(transaction_id).await
    }

    /// Refund an approved payment
    pub async fn refund_payment(
        &self,
        transaction_id: &str,
        request: MercadoPagoRefundRequest,
    ) -> PaymentResult<MercadoPagoRefund> {
        let id = require_id(transaction_id)?;
        if let Some(amount) = request.amount.filter(|amount| *amount <= Decimal::ZERO) {
            return Err(PaymentError::InvalidRequest(format!(
                "refund amount must be positive, got {}",
                amount
            )));
        }
        let body = RefundBody {
            amount: request.amount,
        };

        let payment = self.get_payment(id).await?;
        if payment.status != "approved" {
            return Err(PaymentError::RefundUnavailable(format!(
                "payment {} is {}, only approved payments can be refunded",
                id, payment.status
            )));
        }

        if let Some(reason) = &request.reason {
            debug!(gateway = "mercado_pago", transaction_id = %id, reason = %reason, "Refund reason");
        }

        let key = self.client.idempotency_key(None);
        let mut refund: MercadoPagoRefund = decode(
            self.client
                .post_json(&format!("/v1/payments/{}/refunds", id), &body, &key)
                .await,
        )?;
        if refund.currency_id.is_none() {
            refund.currency_id = payment.currency_id;
        }

        info!(
            gateway = "mercado_pago",
            transaction_id = %id,
            refund_id = %refund.id,
            amount = %refund.amount,
            "Payment refunded"
        );
        Ok(refund)
    }

    /// Retrieve a payment
    pub async fn get_payment(&self, transaction_id: &str) -> PaymentResult<MercadoPagoPayment> {
        let id = require_id(transaction_id)?;
        debug!(gateway = "mercado_pago", transaction_id = %id, "Retrieving payment");
        decode(self.client.get(&format!("/v1/payments/{}", id)).await)
    }

    async fn create_card_token(
        &self,
        card: &CardData,
        idempotency_key: &str,
    ) -> PaymentResult<String> {
        let body = json!({
            "card_number": card.number,
            "expiration_month": card.exp_month,
            "expiration_year": card.exp_year,
            "security_code": card.cvv,
            "cardholder": { "name": card.holder_name },
        });

        debug!(gateway = "mercado_pago", last4 = %card.last4(), "Tokenizing card");
        let token: MercadoPagoCardToken = decode(
            self.client
                .post_json("/v1/card_tokens", &body, idempotency_key)
                .await,
        )?;
        Ok(token.id)
    }
}

fn decode<T: DeserializeOwned>(
    result: Result<ProviderResponse, reqwest::Error>,
) -> PaymentResult<T> {
    let response = result.map_err(|e| {
        warn!(gateway = "mercado_pago", error = %e, "Mercado Pago request failed");
        PaymentError::Provider(e.to_string())
    })?;

    if !response.is_success() {
        let error = map_mercado_pago_error(response.status, &response.body);
        warn!(
            gateway = "mercado_pago",
            status = response.status.as_u16(),
            code = error.code(),
            "Mercado Pago returned an error"
        );
        return Err(error);
    }

    response.json()
}

/// Translate a Mercado Pago error response into the normalized vocabulary
pub fn map_mercado_pago_error(status: StatusCode, body: &[u8]) -> PaymentError {
    let message = serde_json::from_slice::<MercadoPagoErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| format!("Mercado Pago returned HTTP {}", status.as_u16()));

    if message.to_lowercase().contains("card") {
        return PaymentError::CardDeclined(message);
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => PaymentError::RateLimited(message),
        StatusCode::BAD_REQUEST => PaymentError::InvalidRequest(message),
        StatusCode::UNAUTHORIZED => PaymentError::Authentication {
            gateway: Gateway::MercadoPago,
            message,
        },
        s if s.is_server_error() => PaymentError::ProviderApi(message),
        _ => PaymentError::Provider(message),
    }
}

fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

// Mercado Pago API types

#[derive(Debug, Deserialize)]
struct MercadoPagoErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MercadoPagoCardToken {
    id: String,
}

/// Payment as returned by Mercado Pago
#[derive(Debug, Clone, Deserialize)]
pub struct MercadoPagoPayment {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    /// Provider-native status
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    /// Amount in major units
    #[serde(default)]
    pub transaction_amount: Decimal,
    #[serde(default)]
    pub currency_id: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub point_of_interaction: Option<PointOfInteraction>,
    #[serde(default)]
    pub transaction_details: Option<TransactionDetails>,
}

impl MercadoPagoPayment {
    /// Normalized status
    pub fn normalized_status(&self) -> PaymentStatus {
        normalize_status(&self.status)
    }

    /// PIX and boleto details plus the raw provider status
    pub fn extras(&self) -> Metadata {
        let mut extras = Metadata::new();
        extras.insert("provider_status".into(), self.status.clone().into());
        if let Some(detail) = &self.status_detail {
            extras.insert("status_detail".into(), detail.clone().into());
        }
        if let Some(method) = &self.payment_method_id {
            extras.insert("payment_method_id".into(), method.clone().into());
        }
        if let Some(data) = self
            .point_of_interaction
            .as_ref()
            .and_then(|poi| poi.transaction_data.as_ref())
        {
            let fields = [
                ("qr_code", &data.qr_code),
                ("qr_code_base64", &data.qr_code_base64),
                ("ticket_url", &data.ticket_url),
            ];
            for (key, value) in fields {
                if let Some(value) = value {
                    extras.insert(key.into(), value.clone().into());
                }
            }
        }
        if let Some(url) = self
            .transaction_details
            .as_ref()
            .and_then(|details| details.external_resource_url.as_ref())
        {
            extras.insert("boleto_url".into(), url.clone().into());
        }
        extras
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointOfInteraction {
    #[serde(default)]
    pub transaction_data: Option<TransactionData>,
}

/// PIX payment data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionData {
    #[serde(default)]
    pub qr_code: Option<String>,
    #[serde(default)]
    pub qr_code_base64: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionDetails {
    /// Boleto slip URL
    #[serde(default)]
    pub external_resource_url: Option<String>,
}

/// Refund as returned by Mercado Pago
#[derive(Debug, Clone, Deserialize)]
pub struct MercadoPagoRefund {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(deserialize_with = "id_as_string")]
    pub payment_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    /// Not part of the refund payload; filled from the refunded payment
    #[serde(default)]
    pub currency_id: Option<String>,
}
