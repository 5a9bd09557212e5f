//! Webhook verification for payment notifications
//!
//! Both providers sign notifications with HMAC-SHA256 but over different
//! material. Verified notifications are turned into a [`WebhookEvent`] with
//! the same normalized status vocabulary the gateways use.

use crate::{
    config::{MercadoPagoConfig, StripeConfig},
    error::{PaymentError, PaymentResult},
    factory::normalize_stripe_status,
    providers::mercado_pago::normalize_status,
    types::{Gateway, PaymentStatus},
};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a Stripe signature timestamp
pub const STRIPE_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verified webhook notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub gateway: Gateway,
    /// Provider event id
    pub event_id: String,
    /// Provider event type (`payment_intent.succeeded`, `payment.updated`)
    pub event_type: String,
    /// Payment the event refers to, when it names one
    pub transaction_id: Option<String>,
    /// Normalized status carried by the event, if any
    pub status: Option<PaymentStatus>,
    pub created_at: DateTime<Utc>,
    /// Raw event payload
    pub data: Value,
}

fn signature_parts<'a>(header: &'a str, timestamp_key: &str) -> (Option<&'a str>, Vec<&'a str>) {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        if key == timestamp_key {
            timestamp = Some(value);
        } else if key == "v1" {
            signatures.push(value);
        }
    }
    (timestamp, signatures)
}

fn verify_hmac(secret: &SecretString, message: &[u8], signatures: &[&str]) -> PaymentResult<()> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| PaymentError::Config(format!("invalid webhook secret: {}", e)))?;
    mac.update(message);

    let matched = signatures.iter().any(|signature| {
        hex::decode(signature)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(PaymentError::InvalidWebhookSignature(
            "signature does not match payload".to_string(),
        ));
    }
    Ok(())
}

/// Stripe event type to normalized status
pub fn stripe_event_status(event_type: &str) -> Option<PaymentStatus> {
    match event_type {
        "payment_intent.succeeded" => Some(PaymentStatus::Confirmed),
        "payment_intent.payment_failed" => Some(PaymentStatus::Failed),
        "payment_intent.canceled" => Some(PaymentStatus::Cancelled),
        "charge.refunded" => Some(PaymentStatus::Refunded),
        "charge.dispute.created" => Some(PaymentStatus::Chargeback),
        _ => None,
    }
}

/// Verifies `Stripe-Signature` headers
#[derive(Debug)]
pub struct StripeWebhookVerifier {
    secret: SecretString,
    tolerance_secs: i64,
}

impl StripeWebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into().into_boxed_str()),
            tolerance_secs: STRIPE_TIMESTAMP_TOLERANCE_SECS,
        }
    }

    /// Build from configuration; fails when no signing secret is set.
    pub fn from_config(config: &StripeConfig) -> PaymentResult<Self> {
        let secret = config
            .webhook_secret
            .as_ref()
            .ok_or_else(|| PaymentError::Config("STRIPE_WEBHOOK_SECRET is not set".to_string()))?;
        Ok(Self::new(secret.expose_secret()))
    }

    /// Verify and parse a notification
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> PaymentResult<WebhookEvent> {
        self.verify_at(payload, signature_header, Utc::now().timestamp())
    }

    /// Verify against an explicit current time (unix seconds)
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> PaymentResult<WebhookEvent> {
        let (timestamp, signatures) = signature_parts(signature_header, "t");
        let timestamp: i64 = timestamp
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| PaymentError::InvalidWebhookSignature("missing timestamp".to_string()))?;
        if signatures.is_empty() {
            return Err(PaymentError::InvalidWebhookSignature(
                "missing v1 signature".to_string(),
            ));
        }

        let age = now - timestamp;
        if age.abs() > self.tolerance_secs {
            warn!(
                gateway = "stripe",
                event_timestamp = timestamp,
                age_secs = age,
                "Webhook timestamp outside tolerance"
            );
            return Err(PaymentError::InvalidWebhookSignature(format!(
                "timestamp outside tolerance ({} seconds)",
                age
            )));
        }

        let mut signed = format!("{}.", timestamp).into_bytes();
        signed.extend_from_slice(payload);
        verify_hmac(&self.secret, &signed, &signatures).inspect_err(|_| {
            warn!(gateway = "stripe", "Invalid webhook signature");
        })?;

        let event: StripeEvent = serde_json::from_slice(payload)?;
        let object = event.data.get("object").cloned().unwrap_or(Value::Null);
        let transaction_id = match object.get("object").and_then(Value::as_str) {
            Some("payment_intent") => object.get("id"),
            _ => object.get("payment_intent"),
        }
        .and_then(Value::as_str)
        .map(str::to_string);

        let status = stripe_event_status(&event.event_type).or_else(|| {
            match object.get("object").and_then(Value::as_str) {
                Some("payment_intent") => object
                    .get("status")
                    .and_then(Value::as_str)
                    .map(normalize_stripe_status),
                _ => None,
            }
        });

        Ok(WebhookEvent {
            gateway: Gateway::Stripe,
            event_id: event.id,
            status,
            transaction_id,
            created_at: Utc
                .timestamp_opt(event.created, 0)
                .single()
                .unwrap_or_else(Utc::now),
            event_type: event.event_type,
            data: object,
        })
    }
}

/// Verifies Mercado Pago `x-signature` headers
pub struct MercadoPagoWebhookVerifier {
    secret: SecretString,
}

impl MercadoPagoWebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::new(secret.into().into_boxed_str()),
        }
    }

    /// Build from configuration; fails when no signing secret is set.
    pub fn from_config(config: &MercadoPagoConfig) -> PaymentResult<Self> {
        let secret = config.webhook_secret.as_ref().ok_or_else(|| {
            PaymentError::Config("MERCADOPAGO_WEBHOOK_SECRET is not set".to_string())
        })?;
        Ok(Self::new(secret.expose_secret()))
    }

    /// Verify and parse a notification.
    ///
    /// The signed manifest is `id:{data.id};request-id:{x_request_id};ts:{ts};`.
    pub fn verify(
        &self,
        payload: &[u8],
        x_signature: &str,
        x_request_id: &str,
    ) -> PaymentResult<WebhookEvent> {
        let (ts, signatures) = signature_parts(x_signature, "ts");
        let ts = ts.ok_or_else(|| {
            PaymentError::InvalidWebhookSignature("missing ts".to_string())
        })?;
        if signatures.is_empty() {
            return Err(PaymentError::InvalidWebhookSignature(
                "missing v1 signature".to_string(),
            ));
        }

        let notification: MercadoPagoNotification = serde_json::from_slice(payload)?;
        let data_id = notification.data_id().ok_or_else(|| {
            PaymentError::InvalidWebhookSignature("notification has no data.id".to_string())
        })?;

        let manifest = format!("id:{};request-id:{};ts:{};", data_id, x_request_id, ts);
        verify_hmac(&self.secret, manifest.as_bytes(), &signatures).inspect_err(|_| {
            warn!(gateway = "mercado_pago", "Invalid webhook signature");
        })?;

        let status = notification
            .data
            .get("status")
            .and_then(Value::as_str)
            .map(normalize_status);
        let created_at = notification
            .date_created
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let event_type = notification
            .action
            .clone()
            .or_else(|| notification.notification_type.clone())
            .unwrap_or_default();

        Ok(WebhookEvent {
            gateway: Gateway::MercadoPago,
            event_id: notification.id.map(|id| id_string(&id)).unwrap_or_default(),
            event_type,
            transaction_id: Some(data_id),
            status,
            created_at,
            data: notification.data,
        })
    }
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct MercadoPagoNotification {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "type", default)]
    notification_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    date_created: Option<String>,
    #[serde(default)]
    data: Value,
}

impl MercadoPagoNotification {
    fn data_id(&self) -> Option<String> {
        match self.data.get("id")? {
            Value::Null => None,
            id => Some(id_string(id).to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    const STRIPE_PAYLOAD: &str = r#"{"id":"evt_1","type":"payment_intent.succeeded","created":1700000000,"data":{"object":{"id":"pi_1","object":"payment_intent","status":"succeeded","amount":1000}}}"#;

    #[test]
    fn test_stripe_valid_signature() {
        let verifier = StripeWebhookVerifier::new("whsec_test");
        let header = format!(
            "t=1700000000,v1={}",
            sign("whsec_test", &format!("1700000000.{}", STRIPE_PAYLOAD))
        );

        let event = verifier
            .verify_at(STRIPE_PAYLOAD.as_bytes(), &header, 1700000010)
            .unwrap();

        assert_eq!(event.gateway, Gateway::Stripe);
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.transaction_id.as_deref(), Some("pi_1"));
        assert_eq!(event.status, Some(PaymentStatus::Confirmed));
        assert_eq!(event.created_at.timestamp(), 1700000000);
    }

    #[test]
    fn test_stripe_accepts_any_matching_v1() {
        let verifier = StripeWebhookVerifier::new("whsec_test");
        let header = format!(
            "t=1700000000,v1=deadbeef,v1={}",
            sign("whsec_test", &format!("1700000000.{}", STRIPE_PAYLOAD))
        );

        assert!(verifier
            .verify_at(STRIPE_PAYLOAD.as_bytes(), &header, 1700000000)
            .is_ok());
    }

    #[test]
    fn test_stripe_rejects_tampered_payload() {
        let verifier = StripeWebhookVerifier::new("whsec_test");
        let header = format!(
            "t=1700000000,v1={}",
            sign("whsec_test", &format!("1700000000.{}", STRIPE_PAYLOAD))
        );
        let tampered = STRIPE_PAYLOAD.replace("1000", "1");

        let err = verifier
            .verify_at(tampered.as_bytes(), &header, 1700000000)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_WEBHOOK_SIGNATURE");
    }

    #[test]
    fn test_stripe_rejects_stale_timestamp() {
        let verifier = StripeWebhookVerifier::new("whsec_test");
        let header = format!(
            "t=1700000000,v1={}",
            sign("whsec_test", &format!("1700000000.{}", STRIPE_PAYLOAD))
        );

        let err = verifier
            .verify_at(STRIPE_PAYLOAD.as_bytes(), &header, 1700000301)
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_WEBHOOK_SIGNATURE");
    }

    #[test]
    fn test_stripe_malformed_header() {
        let verifier = StripeWebhookVerifier::new("whsec_test");
        for header in ["", "v1=abc", "t=1700000000", "t=abc,v1=abc"] {
            assert!(
                verifier
                    .verify_at(STRIPE_PAYLOAD.as_bytes(), header, 1700000000)
                    .is_err(),
                "{}",
                header
            );
        }
    }

    #[test]
    fn test_stripe_refund_event_targets_payment_intent() {
        let payload = r#"{"id":"evt_2","type":"charge.refunded","created":1700000000,"data":{"object":{"id":"ch_1","object":"charge","payment_intent":"pi_9"}}}"#;
        let verifier = StripeWebhookVerifier::new("whsec_test");
        let header = format!(
            "t=1700000000,v1={}",
            sign("whsec_test", &format!("1700000000.{}", payload))
        );

        let event = verifier
            .verify_at(payload.as_bytes(), &header, 1700000000)
            .unwrap();
        assert_eq!(event.transaction_id.as_deref(), Some("pi_9"));
        assert_eq!(event.status, Some(PaymentStatus::Refunded));
    }

    #[test]
    fn test_stripe_event_status_table() {
        assert_eq!(
            stripe_event_status("payment_intent.payment_failed"),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(
            stripe_event_status("payment_intent.canceled"),
            Some(PaymentStatus::Cancelled)
        );
        assert_eq!(
            stripe_event_status("charge.dispute.created"),
            Some(PaymentStatus::Chargeback)
        );
        assert_eq!(stripe_event_status("customer.created"), None);
    }

    const MP_PAYLOAD: &str = r#"{"id":12345,"type":"payment","action":"payment.updated","date_created":"2024-05-01T12:00:00Z","data":{"id":"987654"}}"#;

    #[test]
    fn test_mercado_pago_valid_signature() {
        let verifier = MercadoPagoWebhookVerifier::new("mp_secret");
        let manifest = "id:987654;request-id:req-1;ts:1714564800;";
        let header = format!("ts=1714564800,v1={}", sign("mp_secret", manifest));

        let event = verifier
            .verify(MP_PAYLOAD.as_bytes(), &header, "req-1")
            .unwrap();

        assert_eq!(event.gateway, Gateway::MercadoPago);
        assert_eq!(event.event_id, "12345");
        assert_eq!(event.event_type, "payment.updated");
        assert_eq!(event.transaction_id.as_deref(), Some("987654"));
        assert_eq!(event.status, None);
    }

    #[test]
    fn test_mercado_pago_wrong_request_id() {
        let verifier = MercadoPagoWebhookVerifier::new("mp_secret");
        let manifest = "id:987654;request-id:req-1;ts:1714564800;";
        let header = format!("ts=1714564800,v1={}", sign("mp_secret", manifest));

        let err = verifier
            .verify(MP_PAYLOAD.as_bytes(), &header, "req-2")
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_WEBHOOK_SIGNATURE");
    }

    #[test]
    fn test_mercado_pago_status_from_data() {
        let payload = r#"{"id":"n1","type":"payment","data":{"id":"55","status":"charged_back"}}"#;
        let verifier = MercadoPagoWebhookVerifier::new("mp_secret");
        let header = format!(
            "ts=1,v1={}",
            sign("mp_secret", "id:55;request-id:r;ts:1;")
        );

        let event = verifier.verify(payload.as_bytes(), &header, "r").unwrap();
        assert_eq!(event.status, Some(PaymentStatus::Chargeback));
        assert_eq!(event.event_type, "payment");
    }

    #[test]
    fn test_from_config_requires_secret() {
        let err = StripeWebhookVerifier::from_config(&StripeConfig::new("sk")).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");

        let config = MercadoPagoConfig::new("token").with_webhook_secret("mp_secret");
        assert!(MercadoPagoWebhookVerifier::from_config(&config).is_ok());
    }
}
