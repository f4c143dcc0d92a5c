use crate::{
    cache::CacheBackend,
    entities::{product, product_variant, Product, ProductModel, ProductVariant},
    errors::ServiceError,
    events::{Event, EventSender},
    services::search::{invalidate_catalog_caches, FEATURED_KEY},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Catalog maintenance and read paths. Every write invalidates the search
/// and suggestion caches wholesale and drops the featured-products entry, so
/// a fresh write is never masked by a stale cached page.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    cache: Arc<dyn CacheBackend>,
}

impl ProductService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        cache: Arc<dyn CacheBackend>,
    ) -> Self {
        Self {
            db,
            event_sender,
            cache,
        }
    }

    /// Creates a product with its embedded variants. Variant stock defaults
    /// to zero; price and image overrides stay NULL and fall back to the
    /// product fields at read time.
    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductWithVariants, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("name is required".to_string()));
        }
        if input.price < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "price must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let product_id = Uuid::new_v4();
        let now = Utc::now();

        let product = product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            image: Set(input.image),
            category: Set(input.category),
            is_featured: Set(input.is_featured),
            stock: Set(input.stock),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let product = product.insert(&txn).await?;

        let mut variants = Vec::with_capacity(input.variants.len());
        for variant in input.variants {
            let model = product_variant::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                sku: Set(variant.sku),
                color: Set(variant.color),
                size: Set(variant.size),
                price: Set(variant.price),
                stock: Set(variant.stock.unwrap_or(0)),
                image: Set(variant.image),
                created_at: Set(now),
                updated_at: Set(now),
            };
            variants.push(model.insert(&txn).await?);
        }

        txn.commit().await?;

        self.invalidate_caches().await;
        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!("Created product {} with {} variants", product_id, variants.len());
        Ok(ProductWithVariants { product, variants })
    }

    /// Applies a partial update to a product.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let product = self.get_product_model(product_id).await?;
        let mut active: product::ActiveModel = product.into();

        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::InvalidInput(
                    "price must not be negative".to_string(),
                ));
            }
            active.price = Set(price);
        }
        if let Some(image) = input.image {
            active.image = Set(image);
        }
        if let Some(category) = input.category {
            active.category = Set(category);
        }
        if let Some(is_featured) = input.is_featured {
            active.is_featured = Set(is_featured);
        }
        if let Some(stock) = input.stock {
            active.stock = Set(stock);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.invalidate_caches().await;
        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(updated)
    }

    /// Deletes a product and its variants.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        ProductVariant::delete_many()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        let result = Product::delete_by_id(product_id).exec(&txn).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        txn.commit().await?;

        self.invalidate_caches().await;
        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;

        info!("Deleted product {}", product_id);
        Ok(())
    }

    pub async fn get_product_model(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Fetches a product together with its variants.
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductWithVariants, ServiceError> {
        let product = self.get_product_model(product_id).await?;
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .all(&*self.db)
            .await?;
        Ok(ProductWithVariants { product, variants })
    }

    /// Lists the whole catalog (admin view).
    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        let products = Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    pub async fn list_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<ProductModel>, ServiceError> {
        let products = Product::find()
            .filter(product::Column::Category.eq(category))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    /// Featured products behind a read-through cache entry. No TTL: the
    /// entry lives until a catalog write drops or refreshes it.
    #[instrument(skip(self))]
    pub async fn featured_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        if let Some(cached) = self.cache.get(FEATURED_KEY).await? {
            return Ok(serde_json::from_str(&cached)?);
        }

        let featured = Product::find()
            .filter(product::Column::IsFeatured.eq(true))
            .all(&*self.db)
            .await?;

        self.cache
            .set(FEATURED_KEY, &serde_json::to_string(&featured)?, None)
            .await?;

        Ok(featured)
    }

    /// Flips a product's featured flag and refreshes the featured cache
    /// entry eagerly.
    #[instrument(skip(self))]
    pub async fn toggle_featured(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        let product = self.get_product_model(product_id).await?;
        let flipped = !product.is_featured;

        let mut active: product::ActiveModel = product.into();
        active.is_featured = Set(flipped);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.invalidate_caches().await;
        self.refresh_featured_cache().await;
        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(updated)
    }

    /// Random product sample for recommendation shelves.
    #[instrument(skip(self))]
    pub async fn recommended_products(
        &self,
        count: u64,
    ) -> Result<Vec<RecommendedProduct>, ServiceError> {
        let products = Product::find()
            .order_by(Expr::cust("RANDOM()"), Order::Asc)
            .limit(count)
            .all(&*self.db)
            .await?;

        Ok(products.into_iter().map(RecommendedProduct::from).collect())
    }

    /// Cache maintenance never fails a catalog write; a stale entry is
    /// bounded by the TTL anyway.
    async fn invalidate_caches(&self) {
        if let Err(err) = invalidate_catalog_caches(self.cache.as_ref()).await {
            warn!("Search cache invalidation failed: {}", err);
        }
    }

    async fn refresh_featured_cache(&self) {
        let featured = match Product::find()
            .filter(product::Column::IsFeatured.eq(true))
            .all(&*self.db)
            .await
        {
            Ok(featured) => featured,
            Err(err) => {
                warn!("Featured cache refresh query failed: {}", err);
                return;
            }
        };

        let payload = match serde_json::to_string(&featured) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("Featured cache serialization failed: {}", err);
                return;
            }
        };

        if let Err(err) = self.cache.set(FEATURED_KEY, &payload, None).await {
            warn!("Featured cache refresh failed: {}", err);
        }
    }
}

/// Input for creating a product with embedded variants
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: String,
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
    pub stock: Option<i32>,
    #[serde(default)]
    pub variants: Vec<CreateVariantInput>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVariantInput {
    pub sku: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub image: Option<String>,
}

/// Partial update input
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub is_featured: Option<bool>,
    /// `Some(None)` clears bare-product stock back to untracked.
    pub stock: Option<Option<i32>>,
}

#[derive(Debug, Serialize)]
pub struct ProductWithVariants {
    pub product: ProductModel,
    pub variants: Vec<product_variant::Model>,
}

/// Trimmed projection for recommendation shelves
#[derive(Debug, Serialize)]
pub struct RecommendedProduct {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image: String,
    pub price: Decimal,
}

impl From<ProductModel> for RecommendedProduct {
    fn from(product: ProductModel) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            image: product.image,
            price: product.price,
        }
    }
}
