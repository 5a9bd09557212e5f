//! Integration tests for common payment workflows.
//!
//! Both providers are replaced by `wiremock` servers; every test goes through
//! the gateway facade the way a booking service would.

use rsv360::prelude::*;
use rsv360::{ClientConfig, MercadoPagoConfig, StripeConfig};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn amount(raw: &str) -> Decimal {
    Decimal::from_str(raw).unwrap()
}

struct Providers {
    stripe: MockServer,
    mercado_pago: MockServer,
    factory: GatewayFactory,
}

async fn providers() -> Providers {
    let stripe = MockServer::start().await;
    let mercado_pago = MockServer::start().await;

    let config = PaymentsConfig {
        stripe: StripeConfig::new("sk_test_123").with_api_base(stripe.uri()),
        mercado_pago: MercadoPagoConfig::new("TEST-token").with_api_base(mercado_pago.uri()),
        client: ClientConfig::default().with_max_network_retries(0),
    };
    let factory = GatewayFactory::from_config(&config).unwrap();

    Providers {
        stripe,
        mercado_pago,
        factory,
    }
}

// =============================================================================
// Gateway selection
// =============================================================================

#[tokio::test]
async fn test_gateway_names_are_normalized() {
    let p = providers().await;

    for name in ["STRIPE ", "stripe", " Stripe"] {
        assert_eq!(p.factory.create_gateway(name).unwrap().name(), "stripe");
    }
    assert_eq!(
        p.factory.create_gateway("Mercado_Pago").unwrap().name(),
        "mercado_pago"
    );
}

#[tokio::test]
async fn test_unsupported_gateway_lists_available() {
    let p = providers().await;

    let err = p.factory.create_gateway("paypal").unwrap_err();

    assert_eq!(err.code(), "UNSUPPORTED_GATEWAY");
    assert!(err.to_string().ends_with("available gateways: stripe, mercado_pago"));
    assert!(!rsv360::is_gateway_supported("paypal"));
    assert_eq!(rsv360::available_gateways(), vec!["stripe", "mercado_pago"]);
}

// =============================================================================
// Stripe
// =============================================================================

#[tokio::test]
async fn test_stripe_major_units_round_trip() {
    let p = providers().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("amount=1000"))
        .and(body_string_contains("currency=brl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_round",
            "amount": 1000,
            "currency": "brl",
            "status": "requires_confirmation",
            "client_secret": "pi_round_secret",
            "metadata": {"source": "rsv360", "booking_id": "42"}
        })))
        .expect(1)
        .mount(&p.stripe)
        .await;

    let gateway = p.factory.create_gateway("stripe").unwrap();
    let payment = gateway
        .create_payment(
            PaymentRequest::new(amount("10.00"))
                .payment_method("pm_123")
                .metadata("booking_id", "42"),
        )
        .await
        .unwrap();

    assert_eq!(payment.gateway, Gateway::Stripe);
    assert_eq!(payment.amount, amount("10.00"));
    assert_eq!(payment.currency, "BRL");
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.metadata["booking_id"], "42");
}

#[tokio::test]
async fn test_stripe_one_real_payment() {
    let p = providers().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("amount=100&"))
        .and(body_string_contains("payment_method=pm_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_one",
            "amount": 100,
            "currency": "brl",
            "status": "requires_confirmation",
            "client_secret": "pi_one_secret"
        })))
        .expect(1)
        .mount(&p.stripe)
        .await;

    let gateway = p.factory.gateway(Gateway::Stripe);
    let payment = gateway
        .create_payment(PaymentRequest::new(amount("1.00")).payment_method("pm_123"))
        .await
        .unwrap();

    assert_eq!(payment.amount, amount("1.00"));
    assert_eq!(payment.transaction_id, "pi_one");
    assert_eq!(payment.client_secret.as_deref(), Some("pi_one_secret"));
}

#[tokio::test]
async fn test_stripe_below_minimum_never_reaches_provider() {
    let p = providers().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&p.stripe)
        .await;

    let gateway = p.factory.gateway(Gateway::Stripe);
    for raw in ["0.49", "0.495", "0.4999"] {
        let err = gateway
            .create_payment(PaymentRequest::new(amount(raw)).payment_method("pm_123"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_AMOUNT", "{}", raw);
    }

    assert!(p.stripe.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stripe_sub_cent_amount_is_not_rounded() {
    let p = providers().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&p.stripe)
        .await;

    let err = p
        .factory
        .gateway(Gateway::Stripe)
        .create_payment(PaymentRequest::new(amount("10.005")).payment_method("pm_123"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_REQUEST");
}

#[tokio::test]
async fn test_stripe_confirm_then_refund() {
    let p = providers().await;
    let succeeded = json!({
        "id": "pi_flow",
        "amount": 25000,
        "currency": "brl",
        "status": "succeeded",
        "latest_charge": {
            "id": "ch_flow",
            "object": "charge",
            "amount": 25000,
            "status": "succeeded",
            "receipt_url": "https://pay.stripe.com/receipts/ch_flow"
        }
    });
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_flow/confirm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded.clone()))
        .expect(1)
        .mount(&p.stripe)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_flow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(succeeded))
        .expect(1)
        .mount(&p.stripe)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/refunds"))
        .and(body_string_contains("charge=ch_flow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "re_flow",
            "amount": 25000,
            "currency": "brl",
            "status": "succeeded"
        })))
        .expect(1)
        .mount(&p.stripe)
        .await;

    let gateway = p.factory.gateway(Gateway::Stripe);

    let confirmed = gateway.confirm_payment("pi_flow").await.unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Confirmed);
    assert_eq!(confirmed.amount, amount("250.00"));
    assert_eq!(confirmed.extras["charge_id"], "ch_flow");
    assert_eq!(
        confirmed.extras["receipt_url"],
        "https://pay.stripe.com/receipts/ch_flow"
    );

    let refund = gateway
        .refund_payment("pi_flow", RefundRequest::full().reason("requested_by_customer"))
        .await
        .unwrap();
    assert_eq!(refund.refund_id, "re_flow");
    assert_eq!(refund.amount, amount("250.00"));
    assert_eq!(refund.status, "succeeded");
}

#[tokio::test]
async fn test_stripe_declined_card_is_terminal() {
    let p = providers().await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents/pi_declined/confirm"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "message": "Your card was declined."
            }
        })))
        .expect(1)
        .mount(&p.stripe)
        .await;

    let err = p
        .factory
        .gateway(Gateway::Stripe)
        .confirm_payment("pi_declined")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CARD_DECLINED");
    assert!(!err.is_retryable());
}

// =============================================================================
// Mercado Pago
// =============================================================================

#[tokio::test]
async fn test_mercado_pago_pix_below_minimum() {
    let p = providers().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&p.mercado_pago)
        .await;

    let err = p
        .factory
        .create_gateway("mercado_pago")
        .unwrap()
        .create_payment(PaymentRequest::new(amount("0.30")).payment_method("pix"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "INSUFFICIENT_AMOUNT");
    assert!(err.to_string().starts_with("INSUFFICIENT_AMOUNT"));
}

#[tokio::test]
async fn test_mercado_pago_minimum_amount_is_accepted() {
    let p = providers().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .and(body_partial_json(json!({"transaction_amount": 0.5})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 4001,
            "status": "pending",
            "transaction_amount": 0.5,
            "currency_id": "BRL"
        })))
        .expect(1)
        .mount(&p.mercado_pago)
        .await;

    let payment = p
        .factory
        .gateway(Gateway::MercadoPago)
        .create_payment(PaymentRequest::new(amount("0.50")).payment_method("pix"))
        .await
        .unwrap();

    assert_eq!(payment.amount, amount("0.50"));
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_mercado_pago_every_status_maps() {
    let p = providers().await;
    let table = [
        ("pending", PaymentStatus::Pending),
        ("approved", PaymentStatus::Confirmed),
        ("authorized", PaymentStatus::Confirmed),
        ("in_process", PaymentStatus::Pending),
        ("in_mediation", PaymentStatus::Pending),
        ("rejected", PaymentStatus::Failed),
        ("cancelled", PaymentStatus::Cancelled),
        ("refunded", PaymentStatus::Refunded),
        ("charged_back", PaymentStatus::Chargeback),
        ("disputed", PaymentStatus::Other("disputed".into())),
    ];

    for (index, (raw, _)) in table.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(format!("/v1/payments/{}", index)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": index,
                "status": raw,
                "transaction_amount": 100,
                "currency_id": "BRL"
            })))
            .mount(&p.mercado_pago)
            .await;
    }

    let gateway = p.factory.gateway(Gateway::MercadoPago);
    for (index, (raw, expected)) in table.iter().enumerate() {
        let payment = gateway.get_payment(&index.to_string()).await.unwrap();
        assert_eq!(&payment.status, expected, "{}", raw);
    }
}

#[tokio::test]
async fn test_mercado_pago_refund_requires_approval() {
    let p = providers().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/5001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5001,
            "status": "in_process",
            "transaction_amount": 300,
            "currency_id": "BRL"
        })))
        .mount(&p.mercado_pago)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/5001/refunds"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&p.mercado_pago)
        .await;

    let err = p
        .factory
        .gateway(Gateway::MercadoPago)
        .refund_payment("5001", RefundRequest::full())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "REFUND_UNAVAILABLE");
}

#[tokio::test]
async fn test_mercado_pago_partial_refund() {
    let p = providers().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/5002"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5002,
            "status": "approved",
            "transaction_amount": 300,
            "currency_id": "BRL"
        })))
        .mount(&p.mercado_pago)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/payments/5002/refunds"))
        .and(body_partial_json(json!({"amount": 120.5})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 9001,
            "payment_id": 5002,
            "amount": 120.5,
            "status": "approved"
        })))
        .expect(1)
        .mount(&p.mercado_pago)
        .await;

    let refund = p
        .factory
        .gateway(Gateway::MercadoPago)
        .refund_payment("5002", RefundRequest::full().amount(amount("120.50")))
        .await
        .unwrap();

    assert_eq!(refund.refund_id, "9001");
    assert_eq!(refund.transaction_id, "5002");
    assert_eq!(refund.amount, amount("120.5"));
    assert_eq!(refund.currency, "BRL");
}

#[tokio::test]
async fn test_mercado_pago_rate_limit_is_retryable() {
    let p = providers().await;
    Mock::given(method("POST"))
        .and(path("/v1/payments"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"message": "too many requests"})),
        )
        .expect(1)
        .mount(&p.mercado_pago)
        .await;

    let err = p
        .factory
        .gateway(Gateway::MercadoPago)
        .create_payment(PaymentRequest::new(amount("80.00")).payment_method("pix"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RATE_LIMIT");
    assert!(err.is_retryable());
}

// =============================================================================
// Handles
// =============================================================================

#[tokio::test]
async fn test_handles_share_providers_across_tasks() {
    let p = providers().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/6001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 6001,
            "status": "approved",
            "transaction_amount": 10,
            "currency_id": "BRL"
        })))
        .expect(4)
        .mount(&p.mercado_pago)
        .await;

    let gateway = p.factory.gateway(Gateway::MercadoPago);
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.get_payment("6001").await })
        })
        .collect();

    for task in tasks {
        let payment = task.await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
    }
}
