//! Payment types and data structures

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Open key-value metadata attached to payments.
///
/// Values are expected to be scalars (strings, numbers, booleans).
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Currency used when a request does not name one
pub const DEFAULT_CURRENCY: &str = "BRL";

/// Supported payment gateways
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Stripe,
    MercadoPago,
}

impl Gateway {
    /// Every supported gateway, in listing order
    pub const ALL: [Gateway; 2] = [Gateway::Stripe, Gateway::MercadoPago];

    /// Canonical gateway name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::MercadoPago => "mercado_pago",
        }
    }

    /// Parse a gateway name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|g| g.as_str() == normalized)
    }

    /// Canonical names of every supported gateway
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Gateway::as_str).collect()
    }

    /// Error code used when the provider rejects credentials
    pub fn auth_error_code(&self) -> &'static str {
        match self {
            Self::Stripe => "PROVIDER_AUTH_ERROR",
            Self::MercadoPago => "AUTH_ERROR",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized payment status.
///
/// Provider statuses without a mapping are carried verbatim in `Other`
/// instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
    Refunded,
    Chargeback,
    Other(String),
}

impl PaymentStatus {
    /// Status name as exposed to callers
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Chargeback => "chargeback",
            Self::Other(raw) => raw,
        }
    }

    /// Parse a normalized status name; anything else becomes `Other`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "pending" => Self::Pending,
            "confirmed" => Self::Confirmed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "chargeback" => Self::Chargeback,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the status is one of the six normalized values
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PaymentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PaymentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}

/// Raw card fields used for implicit tokenization
#[derive(Clone, Deserialize)]
pub struct CardData {
    /// Card number
    pub number: String,
    /// Expiration month (1-12)
    pub exp_month: u32,
    /// Expiration year
    pub exp_year: u32,
    /// Security code
    pub cvv: String,
    /// Cardholder name
    pub holder_name: String,
}

impl CardData {
    /// Last four digits of the card number
    pub fn last4(&self) -> &str {
        let len = self.number.len();
        self.number.get(len.saturating_sub(4)..).unwrap_or_default()
    }
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("number", &format_args!("**** {}", self.last4()))
            .field("exp_month", &self.exp_month)
            .field("exp_year", &self.exp_year)
            .field("cvv", &"***")
            .field("holder_name", &self.holder_name)
            .finish()
    }
}

/// Payment request in major currency units
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    /// Amount in major units (e.g. reais)
    pub amount: Decimal,
    /// Tokenized instrument (Stripe) or method discriminator (Mercado Pago)
    #[serde(default)]
    pub payment_method_id: Option<String>,
    /// Raw card fields for implicit tokenization
    #[serde(default)]
    pub card_data: Option<CardData>,
    /// Pre-created card token (Mercado Pago card methods)
    #[serde(default)]
    pub card_token: Option<String>,
    /// Free-text label
    #[serde(default)]
    pub description: Option<String>,
    /// Payer email (Mercado Pago)
    #[serde(default)]
    pub payer_email: Option<String>,
    /// Customer reference (Stripe)
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Caller metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Number of card installments
    #[serde(default)]
    pub installments: Option<u32>,
    /// Card issuer id
    #[serde(default)]
    pub issuer_id: Option<String>,
    /// Idempotency key for the create call
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl PaymentRequest {
    /// Create a request for the given amount in major units
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            payment_method_id: None,
            card_data: None,
            card_token: None,
            description: None,
            payer_email: None,
            customer_id: None,
            metadata: Metadata::new(),
            currency: default_currency(),
            installments: None,
            issuer_id: None,
            idempotency_key: None,
        }
    }

    /// With payment method id or discriminator
    pub fn payment_method(mut self, id: impl Into<String>) -> Self {
        self.payment_method_id = Some(id.into());
        self
    }

    /// With raw card data
    pub fn card(mut self, card: CardData) -> Self {
        self.card_data = Some(card);
        self
    }

    /// With card token
    pub fn card_token(mut self, token: impl Into<String>) -> Self {
        self.card_token = Some(token.into());
        self
    }

    /// With description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With payer email
    pub fn payer_email(mut self, email: impl Into<String>) -> Self {
        self.payer_email = Some(email.into());
        self
    }

    /// With customer
    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// With metadata entry
    pub fn metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// With currency
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// With installments
    pub fn installments(mut self, installments: u32) -> Self {
        self.installments = Some(installments);
        self
    }

    /// With issuer
    pub fn issuer(mut self, issuer_id: impl Into<String>) -> Self {
        self.issuer_id = Some(issuer_id.into());
        self
    }

    /// With idempotency key
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Refund options in major currency units
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefundRequest {
    /// Amount to refund (None = full refund)
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Free-text reason
    #[serde(default)]
    pub reason: Option<String>,
}

impl RefundRequest {
    /// Full refund
    pub fn full() -> Self {
        Self::default()
    }

    /// Partial refund
    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// With reason
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Normalized payment returned by every gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Gateway that processed the payment
    pub gateway: Gateway,
    /// Provider-native identifier
    pub transaction_id: String,
    /// Normalized status
    pub status: PaymentStatus,
    /// Amount in major units
    pub amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Client secret for client-side confirmation (Stripe)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Request metadata plus provider-added fields
    pub metadata: Metadata,
    /// Provider-specific extras
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub extras: Metadata,
}

/// Refund returned by every gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    /// Provider refund id
    pub refund_id: String,
    /// Refunded payment
    pub transaction_id: String,
    /// Amount refunded in major units
    pub amount: Decimal,
    /// ISO currency code
    pub currency: String,
    /// Provider-native refund status
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_parse_normalizes_input() {
        assert_eq!(Gateway::parse("stripe"), Some(Gateway::Stripe));
        assert_eq!(Gateway::parse("STRIPE "), Some(Gateway::Stripe));
        assert_eq!(Gateway::parse(" Stripe"), Some(Gateway::Stripe));
        assert_eq!(Gateway::parse("Mercado_Pago"), Some(Gateway::MercadoPago));
        assert_eq!(Gateway::parse("paypal"), None);
        assert_eq!(Gateway::names(), vec!["stripe", "mercado_pago"]);
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&PaymentStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");

        let other: PaymentStatus = serde_json::from_str("\"disputed\"").unwrap();
        assert_eq!(other, PaymentStatus::Other("disputed".into()));
        assert!(!other.is_known());
        assert_eq!(other.to_string(), "disputed");
    }

    #[test]
    fn test_payment_request_builder() {
        let req = PaymentRequest::new(Decimal::new(1050, 2))
            .payment_method("pix")
            .description("Reserva #42")
            .metadata("booking_id", "42")
            .metadata("nights", 3);

        assert_eq!(req.amount, Decimal::new(1050, 2));
        assert_eq!(req.currency, "BRL");
        assert_eq!(req.payment_method_id.as_deref(), Some("pix"));
        assert_eq!(req.metadata["booking_id"], "42");
        assert_eq!(req.metadata["nights"], 3);
    }

    #[test]
    fn test_payment_request_deserialize_defaults() {
        let req: PaymentRequest = serde_json::from_str(r#"{"amount": "25.90"}"#).unwrap();
        assert_eq!(req.amount, Decimal::new(2590, 2));
        assert_eq!(req.currency, DEFAULT_CURRENCY);
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn test_card_debug_masks_sensitive_fields() {
        let card = CardData {
            number: "4242424242424242".into(),
            exp_month: 12,
            exp_year: 2030,
            cvv: "123".into(),
            holder_name: "Maria Silva".into(),
        };

        let debug = format!("{:?}", card);
        assert!(debug.contains("**** 4242"));
        assert!(!debug.contains("4242424242424242"));
        assert!(!debug.contains("\"123\""));
    }
}
