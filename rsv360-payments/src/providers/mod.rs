//! Payment provider implementations

pub mod mercado_pago;
pub mod stripe;

pub use mercado_pago::MercadoPagoProvider;
pub use stripe::StripeProvider;
