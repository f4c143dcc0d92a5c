#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use storefront_api::{
    cache::InMemoryCache,
    config::AppConfig,
    db,
    errors::ServiceError,
    events,
    payments::{
        wallet::is_success_body, CardGateway, CardSession, CreateSessionRequest, PaymentStatus,
        WalletGateway, WalletVerification,
    },
    services::{CheckoutLine, CreateProductInput, CreateVariantInput},
    AppState,
};
use tempfile::TempDir;
use uuid::Uuid;

/// Test harness wiring the full service graph over a throwaway SQLite
/// database, with programmable payment gateway fakes at the edges.
pub struct TestApp {
    pub state: AppState,
    pub card: Arc<FakeCardGateway>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_wallet(Arc::new(FakeWalletGateway::with_body("Success"))).await
    }

    pub async fn with_wallet(wallet: Arc<dyn WalletGateway>) -> Self {
        let db_dir = TempDir::new().expect("failed to create temp dir");
        let db_url = format!("sqlite://{}/test.db?mode=rwc", db_dir.path().display());

        let mut config = AppConfig::new(db_url);
        config.db_max_connections = 1;
        config.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, mut event_rx) = events::channel(config.event_channel_capacity);
        // Drain events so fire-and-forget publishing never backs up.
        tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

        let card = Arc::new(FakeCardGateway::default());
        let state = AppState::new(
            Arc::new(pool),
            Arc::new(config),
            Arc::new(event_sender),
            Arc::new(InMemoryCache::new()),
            card.clone(),
            wallet,
        );

        Self {
            state,
            card,
            _db_dir: db_dir,
        }
    }

    /// Seeds a bare product (no variants) through the catalog service.
    pub async fn seed_product(
        &self,
        name: &str,
        price: Decimal,
        stock: Option<i32>,
    ) -> storefront_api::entities::ProductModel {
        self.state
            .products
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: format!("{} description", name),
                price,
                image: format!("{}.jpg", name.to_lowercase().replace(' ', "-")),
                category: "general".to_string(),
                is_featured: false,
                stock,
                variants: Vec::new(),
            })
            .await
            .expect("failed to seed product")
            .product
    }

    /// Seeds a product with one variant per (sku, stock) pair.
    pub async fn seed_product_with_variants(
        &self,
        name: &str,
        price: Decimal,
        variants: &[(&str, i32)],
    ) -> storefront_api::services::ProductWithVariants {
        self.state
            .products
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: format!("{} description", name),
                price,
                image: format!("{}.jpg", name.to_lowercase().replace(' ', "-")),
                category: "general".to_string(),
                is_featured: false,
                stock: None,
                variants: variants
                    .iter()
                    .map(|(sku, stock)| CreateVariantInput {
                        sku: Some(sku.to_string()),
                        color: Some("black".to_string()),
                        size: Some("M".to_string()),
                        price: None,
                        stock: Some(*stock),
                        image: None,
                    })
                    .collect(),
            })
            .await
            .expect("failed to seed product with variants")
    }
}

/// Builds a checkout line for tests.
pub fn checkout_line(product_id: Uuid, quantity: i32, unit_price: Decimal) -> CheckoutLine {
    CheckoutLine {
        product_id,
        variant_key: None,
        quantity,
        unit_price,
        name: "Test product".to_string(),
        image: None,
    }
}

fn round_minor(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// In-memory card gateway: sessions are held in a map and flipped to paid
/// explicitly by the test.
#[derive(Default)]
pub struct FakeCardGateway {
    sessions: Mutex<HashMap<String, CardSession>>,
    discounts: Mutex<HashMap<String, i32>>,
    counter: AtomicUsize,
}

impl FakeCardGateway {
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(session_id)
            .expect("unknown session marked paid");
        session.payment_status = PaymentStatus::Paid;
    }

    pub fn session(&self, session_id: &str) -> CardSession {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .expect("unknown session")
            .clone()
    }
}

#[async_trait::async_trait]
impl CardGateway for FakeCardGateway {
    async fn create_session(
        &self,
        req: CreateSessionRequest,
    ) -> Result<CardSession, ServiceError> {
        let subtotal: i64 = req
            .line_items
            .iter()
            .map(|item| item.unit_amount_minor * i64::from(item.quantity))
            .sum();

        let discount = req
            .discount_id
            .as_ref()
            .and_then(|id| self.discounts.lock().unwrap().get(id).copied())
            .map(|percent| round_minor(Decimal::from(subtotal) * Decimal::from(percent) / Decimal::ONE_HUNDRED))
            .unwrap_or(0);

        let id = format!("cs_test_{}", self.counter.fetch_add(1, Ordering::SeqCst));
        let session = CardSession {
            id: id.clone(),
            payment_status: PaymentStatus::Unpaid,
            amount_total_minor: subtotal - discount,
            metadata: req.metadata,
        };

        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CardSession, ServiceError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ServiceError::PaymentFailed(format!("no such session {}", session_id)))
    }

    async fn create_percent_discount(&self, percent: i32) -> Result<String, ServiceError> {
        let id = format!("disc_test_{}", self.counter.fetch_add(1, Ordering::SeqCst));
        self.discounts.lock().unwrap().insert(id.clone(), percent);
        Ok(id)
    }
}

/// Wallet gateway fake that classifies a canned response body with the real
/// classifier, so body semantics stay identical to the HTTP implementation.
pub struct FakeWalletGateway {
    body: String,
}

impl FakeWalletGateway {
    pub fn with_body(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl WalletGateway for FakeWalletGateway {
    async fn verify(
        &self,
        _pid: &str,
        _amount: Decimal,
    ) -> Result<WalletVerification, ServiceError> {
        Ok(WalletVerification {
            success: is_success_body(&self.body),
            raw_body: self.body.clone(),
        })
    }
}
