// Checkout orchestration
pub mod checkout;

// External Services
pub mod payment_gateway;
pub mod stripe;

pub use checkout::{to_minor_units, CallbackUrls, CheckoutService};
pub use payment_gateway::PaymentGateway;
pub use stripe::StripeGateway;
