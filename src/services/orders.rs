use crate::{
    entities::{
        order, order_item, product, Order, OrderItem, OrderModel, PaymentMethod, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order persistence. Orders are created by checkout and never mutated
/// afterwards; the only other operation is the per-user history read.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Persists exactly one order with its snapshotted line items.
    #[instrument(skip(self, input))]
    pub async fn create_order(&self, input: NewOrder) -> Result<OrderModel, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let txn = self.db.begin().await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(input.user_id),
            total_amount: Set(input.total_amount),
            payment_method: Set(input.payment_method),
            payment_reference: Set(input.payment_reference),
            shipping_name: Set(input.shipping.as_ref().map(|s| s.name.clone())),
            shipping_address: Set(input.shipping.as_ref().map(|s| s.address.clone())),
            shipping_phone: Set(input.shipping.as_ref().map(|s| s.phone.clone())),
            created_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        for line in &input.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        info!(
            "Created order {} via {:?} for {}",
            order_id, order.payment_method, order.total_amount
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Order history for a user, newest first, with product display fields
    /// resolved for the frontend. Unit prices remain the purchase-time
    /// snapshot regardless of current catalog prices.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?;

        let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut items_by_order: HashMap<Uuid, Vec<OrderLineView>> = HashMap::new();
        for item in items {
            let (name, image) = products
                .get(&item.product_id)
                .map(|p| (p.name.clone(), Some(p.image.clone())))
                .unwrap_or_else(|| ("(removed product)".to_string(), None));
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(OrderLineView {
                    product_id: item.product_id,
                    name,
                    image,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                });
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderView {
                lines: items_by_order.remove(&order.id).unwrap_or_default(),
                id: order.id,
                total_amount: order.total_amount,
                payment_method: order.payment_method,
                payment_reference: order.payment_reference,
                created_at: order.created_at,
            })
            .collect())
    }
}

/// Shipping details required for cash-on-delivery orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// New order input, produced by the checkout orchestrator
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Option<Uuid>,
    pub lines: Vec<NewOrderLine>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_reference: String,
    pub shipping: Option<ShippingInfo>,
}

/// Order line with the price snapshotted at purchase time
#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order history entry with display fields populated
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: Uuid,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_reference: String,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
}

#[derive(Debug, Serialize)]
pub struct OrderLineView {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}
