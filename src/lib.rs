//! Storefront backend core.
//!
//! This crate implements the inventory-consistent cart and checkout engine
//! of a storefront: stock-validated cart mutation, a single-use coupon
//! ledger, checkout orchestration across three payment rails (card gateway,
//! wallet redirect, cash on delivery) and a read-through product search
//! cache. HTTP routing, authentication and rendering are external
//! collaborators; embedders wire the services here into their own surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod payments;
pub mod services;

use crate::cache::{CacheBackend, InMemoryCache};
use crate::config::AppConfig;
use crate::events::{Event, EventSender};
use crate::payments::{CardGateway, HttpWalletGateway, StripeGateway, WalletGateway};
use crate::services::{
    CartService, CheckoutService, CouponService, OrderService, ProductService, SearchService,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Wired service handles sharing one pool, event channel and cache.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub cache: Arc<dyn CacheBackend>,
    pub products: ProductService,
    pub cart: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub checkout: CheckoutService,
    pub search: SearchService,
}

impl AppState {
    /// Wires the full service graph from its parts. Gateways and cache are
    /// injected so embedders and tests control the external edges.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        cache: Arc<dyn CacheBackend>,
        card: Arc<dyn CardGateway>,
        wallet: Arc<dyn WalletGateway>,
    ) -> Self {
        let products = ProductService::new(db.clone(), event_sender.clone(), cache.clone());
        let cart = CartService::new(db.clone(), event_sender.clone());
        let coupons = CouponService::new(db.clone(), event_sender.clone(), config.clone());
        let orders = OrderService::new(db.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db.clone(),
            event_sender.clone(),
            config.clone(),
            coupons.clone(),
            orders.clone(),
            card,
            wallet,
        );
        let search = SearchService::new(db.clone(), cache.clone(), config.clone());

        Self {
            db,
            config,
            event_sender,
            cache,
            products,
            cart,
            coupons,
            orders,
            checkout,
            search,
        }
    }
}

/// Connects the database, applies migrations when configured, and wires the
/// default production edges: HTTP payment gateways and the in-process cache.
/// Returns the state plus the event receiver for the embedder's consumer
/// loop (see [`events::process_events`]).
pub async fn bootstrap(
    config: AppConfig,
) -> Result<(AppState, mpsc::Receiver<Event>), errors::ServiceError> {
    let pool = db::establish_connection_from_app_config(&config).await?;
    if config.auto_migrate {
        db::run_migrations(&pool).await?;
    }

    let (event_sender, event_rx) = events::channel(config.event_channel_capacity);
    let card = StripeGateway::new(&config.card)?;
    let wallet = HttpWalletGateway::new(&config.wallet)?;

    let state = AppState::new(
        Arc::new(pool),
        Arc::new(config),
        Arc::new(event_sender),
        Arc::new(InMemoryCache::new()),
        Arc::new(card),
        Arc::new(wallet),
    );

    Ok((state, event_rx))
}
