use crate::{
    entities::{cart_item, product, product_variant, CartItem, Product, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{self, Availability},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Per-user cart mutator.
///
/// Every mutation reads catalog state fresh: stock is fast-changing and
/// consistency-critical, so nothing here caches availability. Validation is
/// still optimistic — checkout re-validates once more at price lock as the
/// second line of defense against time-of-check/time-of-use drift.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Lists the user's cart with display fields resolved against the
    /// current catalog. Lines whose product has vanished are dropped.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?;

        if items.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut variants_by_product: HashMap<Uuid, Vec<product_variant::Model>> = HashMap::new();
        for variant in ProductVariant::find()
            .filter(product_variant::Column::ProductId.is_in(product_ids))
            .all(&*self.db)
            .await?
        {
            variants_by_product
                .entry(variant.product_id)
                .or_default()
                .push(variant);
        }

        let lines = items
            .into_iter()
            .filter_map(|item| {
                let product = products.get(&item.product_id)?;
                let variant = item.variant_key.as_deref().and_then(|key| {
                    variants_by_product
                        .get(&item.product_id)
                        .and_then(|variants| stock::resolve_variant(variants, key))
                });
                Some(CartLine::resolve(product, variant, item.quantity))
            })
            .collect();

        Ok(lines)
    }

    /// Adds one unit of a (product, variant) pair, merging into an existing
    /// line rather than duplicating it.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let txn = self.db.begin().await?;

        let (product, available) = self
            .resolve_availability(&txn, input.product_id, input.variant_key.as_deref())
            .await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(match &input.variant_key {
                Some(key) => cart_item::Column::VariantKey.eq(key.clone()),
                None => cart_item::Column::VariantKey.is_null(),
            })
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let new_quantity = item.quantity + 1;
            if !available.allows(new_quantity) {
                return Err(ServiceError::InsufficientStock(format!(
                    "{} has {} in stock, cart already holds {}",
                    product.name, available, item.quantity
                )));
            }
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(new_quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        } else {
            if !available.allows(1) {
                return Err(ServiceError::OutOfStock(product.name.clone()));
            }
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                product_id: Set(input.product_id),
                variant_key: Set(input.variant_key.clone()),
                quantity: Set(1),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added to cart for user {}: product {} variant {:?}",
            user_id, input.product_id, input.variant_key
        );
        self.get_cart(user_id).await
    }

    /// Sets a line's quantity. Zero removes the line unconditionally — no
    /// stock check, even when current stock is zero. Positive quantities are
    /// re-validated against live availability; a rejected update leaves the
    /// cart untouched.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        variant_key: Option<String>,
    ) -> Result<Vec<CartLine>, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::InvalidInput(
                "quantity must be non-negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .filter(match &variant_key {
                Some(key) => cart_item::Column::VariantKey.eq(key.clone()),
                None => cart_item::Column::VariantKey.is_null(),
            })
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found in cart", product_id))
            })?;

        if quantity == 0 {
            CartItem::delete_by_id(existing.id).exec(&txn).await?;
        } else {
            let (product, available) = self
                .resolve_availability(&txn, product_id, variant_key.as_deref())
                .await?;

            if !available.allows(quantity) {
                return Err(ServiceError::ExceedsStock(format!(
                    "{} has {} in stock, requested {}",
                    product.name, available, quantity
                )));
            }

            let mut item: cart_item::ActiveModel = existing.into();
            item.quantity = Set(quantity);
            item.updated_at = Set(Utc::now());
            item.update(&txn).await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                user_id,
                product_id,
                quantity,
            })
            .await;

        self.get_cart(user_id).await
    }

    /// Removes lines from the cart: no product clears everything, a product
    /// alone removes all its lines, product + variant removes that line
    /// only.
    #[instrument(skip(self))]
    pub async fn remove_items(
        &self,
        user_id: Uuid,
        product_id: Option<Uuid>,
        variant_key: Option<String>,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let mut delete = CartItem::delete_many().filter(cart_item::Column::UserId.eq(user_id));

        if let Some(product_id) = product_id {
            delete = delete.filter(cart_item::Column::ProductId.eq(product_id));
            if let Some(key) = &variant_key {
                delete = delete.filter(cart_item::Column::VariantKey.eq(key.clone()));
            }
        }

        delete.exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemsRemoved { user_id })
            .await;

        self.get_cart(user_id).await
    }

    /// Fetches the product and its variants fresh and resolves availability
    /// for the supplied variant key.
    async fn resolve_availability(
        &self,
        conn: &impl ConnectionTrait,
        product_id: Uuid,
        variant_key: Option<&str>,
    ) -> Result<(product::Model, Availability), ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(conn)
            .await?;

        let available = stock::availability(&product, &variants, variant_key)?;
        Ok((product, available))
    }
}

/// Input for adding an item to the cart
#[derive(Debug, Deserialize)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub variant_key: Option<String>,
}

/// Display descriptor of the variant a cart line refers to
#[derive(Debug, Clone, Serialize)]
pub struct VariantSummary {
    pub sku: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
}

/// Cart line with display fields resolved per variant
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub image: String,
    pub price: Decimal,
    pub quantity: i32,
    pub variant: Option<VariantSummary>,
}

impl CartLine {
    fn resolve(
        product: &product::Model,
        variant: Option<&product_variant::Model>,
        quantity: i32,
    ) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            image: variant
                .and_then(|v| v.image.clone())
                .unwrap_or_else(|| product.image.clone()),
            price: variant
                .map(|v| v.effective_price(product.price))
                .unwrap_or(product.price),
            quantity,
            variant: variant.map(|v| VariantSummary {
                sku: v.sku.clone(),
                color: v.color.clone(),
                size: v.size.clone(),
            }),
        }
    }
}
