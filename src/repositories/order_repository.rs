use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{coupon, order, order_item, product, Coupon, Order, OrderItem, Product};
use crate::errors::ServiceError;
use crate::models::{AppliedDiscount, CheckoutOrder, OrderLine};
use crate::repositories::Repository;

use super::BaseRepository;

/// Read access to orders for checkout
#[derive(Debug, Clone)]
pub struct OrderRepository {
    base: BaseRepository,
}

impl OrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find an order by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Order::find_by_id(id)
            .one(self.base.get_db())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Load an order with its lines, product names and applied coupon.
    #[instrument(skip(self))]
    pub async fn find_checkout_order(
        &self,
        id: Uuid,
    ) -> Result<Option<CheckoutOrder>, ServiceError> {
        let Some(order) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let db = self.base.get_db();

        let items: Vec<(order_item::Model, Option<product::Model>)> = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Id)
            .find_also_related(Product)
            .all(db)
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for (item, product) in items {
            let product = product.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Order item {} references missing product {}",
                    item.id, item.product_id
                ))
            })?;
            lines.push(OrderLine {
                product_id: product.id,
                product_name: product.name,
                price: item.price,
                quantity: item.quantity,
            });
        }

        let coupon: Option<coupon::Model> = order.find_related(Coupon).one(db).await?;
        let discount = coupon.map(|coupon| AppliedDiscount {
            code: coupon.code,
            percent_off: Decimal::from(order.discount),
        });

        Ok(Some(CheckoutOrder {
            id: order.id,
            items: lines,
            discount,
            paid: order.paid,
        }))
    }
}
