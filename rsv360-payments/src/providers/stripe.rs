//! Stripe payment provider implementation
//!
//! Works in Stripe's native minor units (cents). Conversion from the major
//! units callers use happens in [`crate::factory`].

use crate::{
    config::{ClientConfig, StripeConfig},
    error::{PaymentError, PaymentResult},
    provider::{ProviderClient, ProviderResponse, require_id, stamp_metadata},
    types::{CardData, Gateway, Metadata},
};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Smallest amount Stripe accepts, in cents
pub const STRIPE_MIN_AMOUNT: i64 = 50;

/// Refund reasons Stripe accepts as the `reason` parameter
const STRIPE_REFUND_REASONS: [&str; 3] = ["duplicate", "fraudulent", "requested_by_customer"];

/// Stripe provider
pub struct StripeProvider {
    client: ProviderClient,
    source: String,
}

/// Payment intent request in cents
#[derive(Debug, Clone, Default)]
pub struct StripePaymentRequest {
    /// Amount in cents
    pub amount: i64,
    /// ISO currency code, any case
    pub currency: String,
    /// Tokenized payment method (`pm_...`)
    pub payment_method_id: Option<String>,
    /// Raw card fields, tokenized when no payment method is given
    pub card_data: Option<CardData>,
    pub customer_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

/// Refund request in cents
#[derive(Debug, Clone, Default)]
pub struct StripeRefundRequest {
    /// Amount in cents (None = full refund)
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

impl StripeProvider {
    /// Create a new Stripe provider
    pub fn new(config: &StripeConfig, settings: &ClientConfig) -> PaymentResult<Self> {
        let api_key = SecretString::new(config.secret_key.expose_secret().into());
        Ok(Self {
            client: ProviderClient::new(&config.api_base, api_key, "Idempotency-Key", settings)?,
            source: settings.source.clone(),
        })
    }

    /// Create a payment intent with manual confirmation.
    ///
    /// Raw card data is tokenized first when no payment method id is given.
    pub async fn create_payment(
        &self,
        request: StripePaymentRequest,
    ) -> PaymentResult<StripePaymentIntent> {
        if request.amount < STRIPE_MIN_AMOUNT {
            return Err(PaymentError::InsufficientAmount(format!(
                "minimum amount is {} cents, got {}",
                STRIPE_MIN_AMOUNT, request.amount
            )));
        }

        let idempotency_key = self.client.idempotency_key(request.idempotency_key.as_deref());

        let payment_method = match (&request.payment_method_id, &request.card_data) {
            (Some(id), _) => Some(id.clone()),
            (None, Some(card)) => Some(
                self.create_payment_method(card, &format!("{}-pm", idempotency_key))
                    .await?,
            ),
            (None, None) => None,
        };

        let mut params = vec![
            ("amount".to_string(), request.amount.to_string()),
            ("currency".to_string(), request.currency.trim().to_lowercase()),
            ("confirmation_method".to_string(), "manual".to_string()),
            ("confirm".to_string(), "false".to_string()),
        ];
        if let Some(pm) = payment_method {
            params.push(("payment_method".to_string(), pm));
        }
        if let Some(customer) = &request.customer_id {
            params.push(("customer".to_string(), customer.clone()));
        }
        if let Some(desc) = &request.description {
            params.push(("description".to_string(), desc.clone()));
        }
        for (key, value) in stamp_metadata(request.metadata, &self.source) {
            if let Some(value) = form_value(&value) {
                params.push((format!("metadata[{}]", key), value));
            }
        }

        debug!(gateway = "stripe", amount = request.amount, "Creating payment intent");
        let intent: StripePaymentIntent = decode(
            self.client
                .post_form("/v1/payment_intents", &params, &idempotency_key)
                .await,
        )?;

        info!(
            gateway = "stripe",
            transaction_id = %intent.id,
            status = %intent.status,
            "Payment intent created"
        );
        Ok(intent)
    }

    /// Confirm a payment intent
    pub async fn confirm_payment(&self, transaction_id: &str) -> PaymentResult<StripePaymentIntent> {
        let id = require_id(transaction_id)?;
        let key = self.client.idempotency_key(None);

        debug!(gateway = "stripe", transaction_id = %id, "Confirming payment intent");
        let intent: StripePaymentIntent = decode(
            self.client
                .post_form(
                    &format!("/v1/payment_intents/{}/confirm", id),
                    &[("expand[]", "latest_charge")],
                    &key,
                )
                .await,
        )?;

        info!(
            gateway = "stripe",
            transaction_id = %intent.id,
            status = %intent.status,
            "Payment intent confirmed"
        );
        Ok(intent)
    }

    /// Refund the latest charge of a succeeded payment intent
    pub async fn refund_payment(
        &self,
        transaction_id: &str,
        request: StripeRefundRequest,
    ) -> PaymentResult<StripeRefund> {
        let id = require_id(transaction_id)?;
        if let Some(amount) = request.amount.filter(|amount| *amount <= 0) {
            return Err(PaymentError::InvalidRequest(format!(
                "refund amount must be positive, got {}",
                amount
            )));
        }

        let intent = self.get_payment(id).await?;
        let charge_id = intent.latest_charge_id().map(str::to_string).ok_or_else(|| {
            PaymentError::RefundUnavailable(format!("payment {} has no charge to refund", id))
        })?;
        if intent.status != "succeeded" {
            return Err(PaymentError::RefundUnavailable(format!(
                "payment {} is {}, only succeeded payments can be refunded",
                id, intent.status
            )));
        }

        let mut params = vec![("charge".to_string(), charge_id)];
        if let Some(amount) = request.amount {
            params.push(("amount".to_string(), amount.to_string()));
        }
        let reason = request.reason.unwrap_or_else(|| "requested_by_customer".to_string());
        if STRIPE_REFUND_REASONS.contains(&reason.as_str()) {
            params.push(("reason".to_string(), reason.clone()));
        }
        params.push(("metadata[payment_intent_id]".to_string(), id.to_string()));
        params.push(("metadata[reason]".to_string(), reason));
        params.push((
            "metadata[refunded_at]".to_string(),
            chrono::Utc::now().to_rfc3339(),
        ));

        let key = self.client.idempotency_key(None);
        let refund: StripeRefund =
            decode(self.client.post_form("/v1/refunds", &params, &key).await)?;

        info!(
            gateway = "stripe",
            transaction_id = %id,
            refund_id = %refund.id,
            amount = refund.amount,
            "Payment refunded"
        );
        Ok(refund)
    }

    /// Retrieve a payment intent
    pub async fn get_payment(&self, transaction_id: &str) -> PaymentResult<StripePaymentIntent> {
        let id = require_id(transaction_id)?;
        debug!(gateway = "stripe", transaction_id = %id, "Retrieving payment intent");
        decode(
            self.client
                .get(&format!("/v1/payment_intents/{}?expand[]=latest_charge", id))
                .await,
        )
    }

    async fn create_payment_method(
        &self,
        card: &CardData,
        idempotency_key: &str,
    ) -> PaymentResult<String> {
        let params = [
            ("type", "card".to_string()),
            ("card[number]", card.number.clone()),
            ("card[exp_month]", card.exp_month.to_string()),
            ("card[exp_year]", card.exp_year.to_string()),
            ("card[cvc]", card.cvv.clone()),
            ("billing_details[name]", card.holder_name.clone()),
        ];

        debug!(gateway = "stripe", last4 = %card.last4(), "Tokenizing card");
        let method: StripePaymentMethod = decode(
            self.client
                .post_form("/v1/payment_methods", &params, idempotency_key)
                .await,
        )?;
        Ok(method.id)
    }
}

fn form_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn decode<T: DeserializeOwned>(
    result: Result<ProviderResponse, reqwest::Error>,
) -> PaymentResult<T> {
    let response = result.map_err(|e| {
        warn!(gateway = "stripe", error = %e, "Stripe request failed");
        PaymentError::Connection(e.to_string())
    })?;

    if !response.is_success() {
        let error = map_stripe_error(response.status, &response.body);
        warn!(
            gateway = "stripe",
            status = response.status.as_u16(),
            code = error.code(),
            "Stripe returned an error"
        );
        return Err(error);
    }

    response.json()
}

/// Translate a Stripe error response into the normalized vocabulary
pub fn map_stripe_error(status: StatusCode, body: &[u8]) -> PaymentError {
    let detail = serde_json::from_slice::<StripeErrorBody>(body)
        .map(|b| b.error)
        .unwrap_or_default();
    let message = detail
        .message
        .clone()
        .unwrap_or_else(|| format!("Stripe returned HTTP {}", status.as_u16()));
    let error_type = detail.error_type.as_deref().unwrap_or_default();

    if error_type == "card_error" {
        return PaymentError::CardDeclined(message);
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || error_type == "rate_limit_error"
        || detail.code.as_deref() == Some("rate_limit")
    {
        return PaymentError::RateLimited(message);
    }
    if status == StatusCode::UNAUTHORIZED || error_type == "authentication_error" {
        return PaymentError::Authentication {
            gateway: Gateway::Stripe,
            message,
        };
    }
    if matches!(error_type, "invalid_request_error" | "idempotency_error") {
        return PaymentError::InvalidRequest(message);
    }
    if error_type == "api_error" || status.is_server_error() {
        return PaymentError::ProviderApi(message);
    }
    PaymentError::Provider(message)
}

// Stripe API types

#[derive(Debug, Default, Deserialize)]
struct StripeErrorBody {
    #[serde(default)]
    error: StripeErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    id: String,
}

/// Payment intent as returned by Stripe
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    /// Amount in cents
    pub amount: i64,
    /// Lowercase currency code
    pub currency: String,
    /// Provider-native status
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub latest_charge: Option<StripeChargeRef>,
}

impl StripePaymentIntent {
    /// Id of the charge a refund should target
    pub fn latest_charge_id(&self) -> Option<&str> {
        match self.latest_charge.as_ref()? {
            StripeChargeRef::Id(id) => Some(id),
            StripeChargeRef::Expanded(charge) => Some(&charge.id),
        }
    }

    /// Latest charge, when the intent was fetched with it expanded
    pub fn latest_charge(&self) -> Option<&StripeCharge> {
        match self.latest_charge.as_ref()? {
            StripeChargeRef::Expanded(charge) => Some(charge),
            StripeChargeRef::Id(_) => None,
        }
    }
}

/// `latest_charge` is an id unless expanded
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripeChargeRef {
    Id(String),
    Expanded(StripeCharge),
}

/// Charge attached to a payment intent
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

/// Refund as returned by Stripe
#[derive(Debug, Clone, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    /// Amount in cents
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
}
