pub mod order;

pub use order::{AppliedDiscount, CheckoutOrder, OrderLine};
