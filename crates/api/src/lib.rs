//! HTTP API server for the storefront core.
//!
//! Exposes the order lifecycle, payment confirmation webhook, cart, and
//! promotion endpoints over axum, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{delete, get, post};
use checkout::{
    CartService, CartTotalsCache, OrderLifecycle, PaymentOrchestrator, PromotionService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/process", post(routes::orders::process::<S>))
        .route("/orders/{id}/ship", post(routes::orders::ship::<S>))
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S>))
        .route("/payments/confirm", post(routes::payments::confirm::<S>))
        .route("/coupons/validate", post(routes::promotions::validate::<S>))
        .route("/coupons/apply", post(routes::promotions::apply::<S>))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart", post(routes::cart::add::<S>))
        .route("/cart/{id}", delete(routes::cart::remove::<S>))
        .route("/promotions", get(routes::promotions::list::<S>))
        .route("/promotions", post(routes::promotions::create::<S>))
        .route("/promotions/{id}", get(routes::promotions::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over the given store.
pub fn create_default_state<S: CommerceStore + Clone + 'static>(
    store: S,
    cart_cache_ttl: Duration,
) -> Arc<AppState<S>> {
    let cache = CartTotalsCache::new(cart_cache_ttl);

    Arc::new(AppState {
        lifecycle: OrderLifecycle::new(store.clone()),
        orchestrator: PaymentOrchestrator::new(store.clone()),
        promotions: PromotionService::new(store.clone(), cache.clone()),
        cart: CartService::new(store, cache),
    })
}
