//! Payment provider trait and common functionality

use crate::{
    config::ClientConfig,
    error::{PaymentError, PaymentResult},
    retry::RetryPolicy,
    types::{Gateway, Metadata, Payment, PaymentRequest, Refund, RefundRequest},
};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

/// Uniform payment capability.
///
/// Exactly the four operations every gateway handle exposes. Amounts are in
/// major currency units and statuses are normalized.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Gateway backing this provider
    fn gateway(&self) -> Gateway;

    /// Create a payment
    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<Payment>;

    /// Confirm a previously created payment
    async fn confirm_payment(&self, transaction_id: &str) -> PaymentResult<Payment>;

    /// Refund a payment (full refund when no amount is given)
    async fn refund_payment(
        &self,
        transaction_id: &str,
        request: RefundRequest,
    ) -> PaymentResult<Refund>;

    /// Read the current payment state
    async fn get_payment(&self, transaction_id: &str) -> PaymentResult<Payment>;
}

/// Buffered provider response
#[derive(Debug)]
pub struct ProviderResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ProviderResponse {
    /// Whether the provider answered with a 2xx status
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> PaymentResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Common HTTP client for providers
///
/// Holds the only state shared between concurrent calls: a connection pool,
/// the base URL and the credential, all read-only after construction.
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    idempotency_header: &'static str,
    idempotency_prefix: String,
    retry: RetryPolicy,
}

impl ProviderClient {
    /// Create a new provider client
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        idempotency_header: &'static str,
        settings: &ClientConfig,
    ) -> PaymentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| PaymentError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            idempotency_header,
            idempotency_prefix: settings.idempotency_prefix.clone(),
            retry: RetryPolicy::with_max_retries(settings.max_network_retries),
        })
    }

    /// Replace the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Use the caller's idempotency key or generate a prefixed one
    pub fn idempotency_key(&self, explicit: Option<&str>) -> String {
        match explicit {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => format!("{}-{}", self.idempotency_prefix, uuid::Uuid::new_v4()),
        }
    }

    /// GET request, retried on transport errors and retriable statuses
    pub async fn get(&self, path: &str) -> Result<ProviderResponse, reqwest::Error> {
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            let result = self
                .send(self.client.get(&url).bearer_auth(self.api_key.expose_secret()))
                .await;

            let can_retry = attempt < self.retry.max_retries;
            match result {
                Ok(response) if can_retry && self.retry.should_retry_status(response.status.as_u16()) => {
                    debug!(
                        url = %url,
                        attempt = attempt + 1,
                        status = %response.status,
                        "Retrying provider read due to status code"
                    );
                }
                Err(e) if can_retry && self.retry.should_retry_error(&e) => {
                    debug!(
                        url = %url,
                        attempt = attempt + 1,
                        error = %e,
                        "Retrying provider read due to error"
                    );
                }
                other => return other,
            }

            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            attempt += 1;
        }
    }

    /// POST request with form body
    pub async fn post_form<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        idempotency_key: &str,
    ) -> Result<ProviderResponse, reqwest::Error> {
        let request = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .header(self.idempotency_header, idempotency_key)
            .form(body);
        self.send(request).await
    }

    /// POST request with JSON body
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        idempotency_key: &str,
    ) -> Result<ProviderResponse, reqwest::Error> {
        let request = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .header(self.idempotency_header, idempotency_key)
            .json(body);
        self.send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<ProviderResponse, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(ProviderResponse { status, body })
    }
}

/// Merge caller metadata with the fields every created payment carries.
///
/// System fields win over caller-supplied keys of the same name.
pub fn stamp_metadata(mut metadata: Metadata, source: &str) -> Metadata {
    metadata.insert("source".to_string(), source.into());
    metadata.insert(
        "created_at".to_string(),
        chrono::Utc::now().to_rfc3339().into(),
    );
    metadata
}

/// Reject empty transaction ids before they turn into malformed URLs
pub fn require_id(transaction_id: &str) -> PaymentResult<&str> {
    let id = transaction_id.trim();
    if id.is_empty() {
        return Err(PaymentError::InvalidRequest(
            "transaction id must not be empty".to_string(),
        ));
    }
    if id.contains('/') || id.contains('?') || id.contains('#') {
        return Err(PaymentError::InvalidRequest(format!(
            "transaction id '{}' contains reserved characters",
            id
        )));
    }
    Ok(id)
}
