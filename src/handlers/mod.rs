pub mod common;
pub mod health;
pub mod payment;

pub use payment::{payment_routes, PaymentRoute};
