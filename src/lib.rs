// RSV360 - Payment gateway layer for a multi-tenant travel-agency platform
//
// This library re-exports the payments crate and provides logging setup for
// services embedding it.

// Re-export the payment layer
pub use rsv360_payments::*;

pub mod logging;

/// Prelude for common imports.
///
/// ```
/// use rsv360::prelude::*;
/// ```
pub mod prelude {
    pub use rsv360_payments::{
        Gateway, GatewayFactory, GatewayHandle, Payment, PaymentError, PaymentRequest,
        PaymentResult, PaymentStatus, PaymentsConfig, Refund, RefundRequest,
    };
}
