use crate::{
    cache::CacheBackend,
    config::AppConfig,
    entities::{product, Product, ProductModel},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, SimpleExpr},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Cache namespaces. Any catalog write invalidates both wholesale —
/// correctness over precision, since a fresh write must never be masked by
/// a stale cached page.
pub(crate) const SEARCH_NS: &str = "search:";
pub(crate) const SUGGEST_NS: &str = "suggest:";
pub(crate) const FEATURED_KEY: &str = "featured_products";

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_SUGGEST_LIMIT: u64 = 6;
const MAX_SUGGEST_LIMIT: u64 = 20;

/// Read-through product search with a short-TTL cache in front of the
/// primary token query and its substring fallback.
#[derive(Clone)]
pub struct SearchService {
    db: Arc<DatabaseConnection>,
    cache: Arc<dyn CacheBackend>,
    config: Arc<AppConfig>,
}

impl SearchService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cache: Arc<dyn CacheBackend>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { db, cache, config }
    }

    /// Searches the catalog. An exact-key cache hit within the TTL window is
    /// returned verbatim; otherwise the primary query runs (every token must
    /// match name or description), falling back to a whole-phrase substring
    /// match when the primary yields nothing, and the chosen result page is
    /// cached.
    #[instrument(skip(self))]
    pub async fn search(&self, query: SearchQuery) -> Result<SearchPage, ServiceError> {
        let query = query.sanitized()?;
        let cache_key = query.cache_key();

        if let Some(cached) = self.cache.get(&cache_key).await? {
            debug!("search cache hit: {}", cache_key);
            return Ok(serde_json::from_str(&cached)?);
        }

        // Primary: every token must appear as a whole word in name or
        // description, approximating the store's text index.
        let mut filter = Condition::all();
        for token in query.q.split_whitespace() {
            filter = filter.add(
                Condition::any()
                    .add(word_match(product::Column::Name, token))
                    .add(word_match(product::Column::Description, token)),
            );
        }
        let filter = query.with_shared_filters(filter);

        let mut page = self.run_page_query(filter, &query).await?;

        if page.products.is_empty() {
            // Whole-phrase substring fallback with the same filters; this is
            // what catches partial-word queries the text index misses.
            let fallback = query.with_shared_filters(
                Condition::all().add(
                    Condition::any()
                        .add(ci_contains(product::Column::Name, &query.q))
                        .add(ci_contains(product::Column::Description, &query.q)),
                ),
            );
            page = self.run_page_query(fallback, &query).await?;
        }

        self.cache
            .set(
                &cache_key,
                &serde_json::to_string(&page)?,
                Some(Duration::from_secs(self.config.cache.search_ttl_secs)),
            )
            .await?;

        Ok(page)
    }

    /// Prefix suggestions on product names, cached under an independent
    /// namespace with a smaller TTL. An empty query suggests nothing.
    #[instrument(skip(self))]
    pub async fn suggest(
        &self,
        q: &str,
        limit: Option<u64>,
    ) -> Result<Vec<Suggestion>, ServiceError> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit
            .unwrap_or(DEFAULT_SUGGEST_LIMIT)
            .clamp(1, MAX_SUGGEST_LIMIT);

        let cache_key = format!("{}{}:{}", SUGGEST_NS, q, limit);
        if let Some(cached) = self.cache.get(&cache_key).await? {
            return Ok(serde_json::from_str(&cached)?);
        }

        let pattern = format!("{}%", escape_like(&q.to_lowercase()));
        let suggestions: Vec<Suggestion> = Product::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(product::Column::Name)))
                    .like(LikeExpr::new(pattern).escape('\\')),
            )
            .order_by_asc(product::Column::Name)
            .paginate(&*self.db, limit)
            .fetch_page(0)
            .await?
            .into_iter()
            .map(Suggestion::from)
            .collect();

        self.cache
            .set(
                &cache_key,
                &serde_json::to_string(&suggestions)?,
                Some(Duration::from_secs(self.config.cache.suggest_ttl_secs)),
            )
            .await?;

        Ok(suggestions)
    }

    /// Wholesale invalidation of both namespaces plus the featured-products
    /// entry. Invoked by every catalog write path.
    pub async fn invalidate(&self) -> Result<(), ServiceError> {
        invalidate_catalog_caches(self.cache.as_ref()).await
    }

    async fn run_page_query(
        &self,
        filter: Condition,
        query: &SearchQuery,
    ) -> Result<SearchPage, ServiceError> {
        let mut select = Product::find().filter(filter);

        select = match query.sort {
            Some(SortMode::PriceAsc) => select.order_by_asc(product::Column::Price),
            Some(SortMode::PriceDesc) => select.order_by_desc(product::Column::Price),
            // No portable relevance score exists here; recency stands in for
            // it, matching the fallback path's default ordering.
            None => select.order_by_desc(product::Column::CreatedAt),
        };

        let paginator = select.paginate(&*self.db, query.limit);
        let total = paginator.num_items().await?;
        let products = paginator
            .fetch_page(query.page.saturating_sub(1))
            .await?
            .into_iter()
            .map(ProductHit::from)
            .collect();

        Ok(SearchPage {
            products,
            total,
            page: query.page,
            pages: total.div_ceil(query.limit),
        })
    }
}

/// Invalidates every cache entry any catalog write could have staled.
pub(crate) async fn invalidate_catalog_caches(
    cache: &dyn CacheBackend,
) -> Result<(), ServiceError> {
    cache.delete_prefix(SEARCH_NS).await?;
    cache.delete_prefix(SUGGEST_NS).await?;
    cache.delete(FEATURED_KEY).await?;
    Ok(())
}

/// Search parameters; the canonical tuple that keys the cache.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub limit: u64,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort: Option<SortMode>,
}

impl SearchQuery {
    pub fn for_text(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            category: None,
            min_price: None,
            max_price: None,
            sort: None,
        }
    }

    /// Clamps page/limit, sanitizes prices to non-negative values and
    /// collapses an inverted price range onto its minimum.
    fn sanitized(mut self) -> Result<Self, ServiceError> {
        self.q = self.q.trim().to_string();
        if self.q.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Missing search query".to_string(),
            ));
        }

        self.page = self.page.max(1);
        self.limit = if self.limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.limit.min(MAX_PAGE_SIZE)
        };

        self.min_price = self.min_price.map(|p| p.max(Decimal::ZERO));
        self.max_price = self.max_price.map(|p| p.max(Decimal::ZERO));
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if max < min {
                self.max_price = Some(min);
            }
        }

        Ok(self)
    }

    /// Canonical cache key: identical parameter tuples yield byte-identical
    /// keys, with empty-string placeholders for absent filters.
    fn cache_key(&self) -> String {
        format!(
            "{}{}:{}:{}:{}:{}:{}:{}",
            SEARCH_NS,
            self.q,
            self.page,
            self.limit,
            self.category.as_deref().unwrap_or(""),
            self.min_price.map(|p| p.to_string()).unwrap_or_default(),
            self.max_price.map(|p| p.to_string()).unwrap_or_default(),
            match self.sort {
                Some(SortMode::PriceAsc) => "price_asc",
                Some(SortMode::PriceDesc) => "price_desc",
                None => "",
            },
        )
    }

    /// Applies the category and price-range filters shared by the primary
    /// and fallback paths.
    fn with_shared_filters(&self, mut filter: Condition) -> Condition {
        if let Some(category) = &self.category {
            filter = filter.add(product::Column::Category.eq(category.clone()));
        }
        if let Some(min) = self.min_price {
            filter = filter.add(product::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price {
            filter = filter.add(product::Column::Price.lte(max));
        }
        filter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    PriceAsc,
    PriceDesc,
}

/// Search result envelope consumed by the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub products: Vec<ProductHit>,
    pub total: u64,
    pub page: u64,
    pub pages: u64,
}

/// Trimmed product projection returned by search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductHit {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: String,
    pub category: String,
}

impl From<ProductModel> for ProductHit {
    fn from(product: ProductModel) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            price: product.price,
            image: product.image,
            category: product.category,
        }
    }
}

/// Suggestion entry: just enough to render a typeahead row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub price: Decimal,
}

impl From<ProductModel> for Suggestion {
    fn from(product: ProductModel) -> Self {
        Self {
            id: product.id,
            name: product.name,
            image: product.image,
            price: product.price,
        }
    }
}

/// Case-insensitive substring match with LIKE-wildcard escaping.
fn ci_contains(column: product::Column, needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&needle.to_lowercase()));
    Expr::expr(Func::lower(Expr::col(column))).like(LikeExpr::new(pattern).escape('\\'))
}

/// Case-insensitive whole-word match: the token standing alone, or
/// space-delimited at either edge of the text. Word boundaries are spaces
/// only, which is as close as portable LIKE gets to a text index.
fn word_match(column: product::Column, token: &str) -> Condition {
    let token = escape_like(&token.to_lowercase());
    let lowered = || Expr::expr(Func::lower(Expr::col(column)));
    Condition::any()
        .add(lowered().like(LikeExpr::new(token.clone()).escape('\\')))
        .add(lowered().like(LikeExpr::new(format!("{token} %")).escape('\\')))
        .add(lowered().like(LikeExpr::new(format!("% {token}")).escape('\\')))
        .add(lowered().like(LikeExpr::new(format!("% {token} %")).escape('\\')))
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
