//! Payment gateway layer for RSV360
//!
//! Provides a provider-agnostic interface for taking payments through
//! Stripe and Mercado Pago.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       GatewayFactory                             │
//! │   create_gateway("stripe" | "mercado_pago") -> GatewayHandle     │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                    GatewayHandle                          │   │
//! │  │  create_payment | confirm_payment | refund_payment | get  │   │
//! │  │         major units, normalized statuses                  │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! │                 │                              │                 │
//! │                 ▼                              ▼                 │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐     │
//! │  │  StripeGateway (×100)    │  │  MercadoPagoGateway      │     │
//! │  │  StripeProvider (cents)  │  │  MercadoPagoProvider     │     │
//! │  └──────────────────────────┘  └──────────────────────────┘     │
//! │                                                                  │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │      Webhook verification (Stripe, Mercado Pago)          │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rsv360_payments::{GatewayFactory, PaymentRequest, PaymentsConfig};
//! use rust_decimal::Decimal;
//!
//! let factory = GatewayFactory::from_config(&PaymentsConfig::from_env()?)?;
//! let gateway = factory.create_gateway("mercado_pago")?;
//!
//! let payment = gateway
//!     .create_payment(
//!         PaymentRequest::new(Decimal::new(15050, 2))
//!             .payment_method("pix")
//!             .payer_email("guest@example.com")
//!             .metadata("booking_id", "42"),
//!     )
//!     .await?;
//!
//! println!("{} is {}", payment.transaction_id, payment.status);
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod money;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod types;
pub mod webhook;

pub use config::*;
pub use error::*;
pub use factory::*;
pub use money::*;
pub use provider::*;
pub use providers::{MercadoPagoProvider, StripeProvider};
pub use retry::RetryPolicy;
pub use types::*;
pub use webhook::*;
