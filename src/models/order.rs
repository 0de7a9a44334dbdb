use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// A pending order as checkout sees it: lines in display order and the
/// discount applied when it was placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutOrder {
    pub id: Uuid,
    pub items: Vec<OrderLine>,
    pub discount: Option<AppliedDiscount>,
    pub paid: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    #[schema(value_type = String, example = "19.99")]
    pub price: Decimal,
    pub quantity: i32,
}

impl OrderLine {
    pub fn cost(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Coupon code plus the percentage frozen on the order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct AppliedDiscount {
    pub code: String,
    #[schema(value_type = String, example = "10")]
    pub percent_off: Decimal,
}

impl CheckoutOrder {
    pub fn total_cost_before_discount(&self) -> Decimal {
        self.items.iter().map(OrderLine::cost).sum()
    }

    pub fn discount_amount(&self) -> Decimal {
        match &self.discount {
            Some(discount) => (self.total_cost_before_discount() * discount.percent_off
                / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            None => Decimal::ZERO,
        }
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost_before_discount() - self.discount_amount()
    }
}
