//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{LineId, UserId};
use domain::{
    BankType, CartLine, Money, NewPromotion, Order, OrderLine, OrderStatus, Product, Promotion,
    PromotionKind,
};
use sqlx::PgPool;
use store::{CheckoutPlan, CommerceStore, PostgresStore, PromotionFilter, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!("../../../migrations/0001_init.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_status_log, orders, cart_lines, promotions, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn make_product(stock: u32) -> Product {
    Product::new("Widget", Money::from_units(1000), stock, Utc::now()).unwrap()
}

fn make_coupon(code: &str, max_uses: Option<u32>) -> Promotion {
    let now = Utc::now();
    Promotion::new(
        NewPromotion {
            title: "Coupon".to_string(),
            kind: PromotionKind::Coupon,
            discount_percent: 10,
            code: Some(code.to_string()),
            product_ids: vec![],
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::days(1),
            max_uses,
        },
        now,
    )
    .unwrap()
}

fn make_order(user_id: UserId, product: &Product, quantity: u32) -> Order {
    let line = OrderLine {
        line_id: LineId::new(),
        product_id: product.id,
        title: product.title.clone(),
        quantity,
        base_unit_price: product.price,
        unit_price: product.price,
    };
    Order::new(user_id, vec![line], None, Utc::now()).unwrap()
}

fn plan(order_id: common::OrderId) -> CheckoutPlan {
    CheckoutPlan {
        order_id,
        bank_type: BankType::Zarinpal,
        tracking_code: "TRK-PG".to_string(),
        now: Utc::now(),
    }
}

#[tokio::test]
#[serial_test::serial]
async fn product_roundtrip() {
    let store = get_test_store().await;
    let product = make_product(7);
    let id = product.id;

    store.insert_product(product.clone()).await.unwrap();
    let loaded = store.get_product(id).await.unwrap().unwrap();

    assert_eq!(loaded.title, product.title);
    assert_eq!(loaded.price, product.price);
    assert_eq!(loaded.stock, 7);
    assert!(loaded.is_active);
}

#[tokio::test]
#[serial_test::serial]
async fn promotion_roundtrip_and_code_lookup() {
    let store = get_test_store().await;
    let coupon = make_coupon("SAVE10", Some(3));
    let id = coupon.id;

    store.insert_promotion(coupon).await.unwrap();

    let loaded = store.get_promotion(id).await.unwrap().unwrap();
    assert_eq!(loaded.kind, PromotionKind::Coupon);
    assert_eq!(loaded.max_uses, Some(3));

    let by_code = store.find_coupon("SAVE10").await.unwrap().unwrap();
    assert_eq!(by_code.id, id);
    assert!(store.find_coupon("NOPE").await.unwrap().is_none());
}

#[tokio::test]
#[serial_test::serial]
async fn duplicate_code_maps_to_typed_error() {
    let store = get_test_store().await;
    store
        .insert_promotion(make_coupon("TWICE", None))
        .await
        .unwrap();
    let result = store.insert_promotion(make_coupon("TWICE", None)).await;
    assert!(matches!(result, Err(StoreError::DuplicateCode)));
}

#[tokio::test]
#[serial_test::serial]
async fn promotion_filters() {
    let store = get_test_store().await;
    let mut inactive = make_coupon("OLD", None);
    inactive.is_active = false;
    store.insert_promotion(inactive).await.unwrap();
    store.insert_promotion(make_coupon("NEW", None)).await.unwrap();

    let active_only = store
        .list_promotions(PromotionFilter {
            is_active: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].code.as_deref(), Some("NEW"));

    let all = store.list_promotions(PromotionFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
#[serial_test::serial]
async fn order_roundtrip_preserves_line_snapshot() {
    let store = get_test_store().await;
    let product = make_product(5);
    store.insert_product(product.clone()).await.unwrap();

    let order = make_order(UserId::new(), &product, 2);
    let id = order.id;
    store.insert_order(order.clone()).await.unwrap();

    let loaded = store.get_order(id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(loaded.lines, order.lines);
    assert_eq!(loaded.order_number, order.order_number);
}

#[tokio::test]
#[serial_test::serial]
async fn apply_checkout_commits_and_is_visible() {
    let store = get_test_store().await;
    let user = UserId::new();
    let product = make_product(5);
    let product_id = product.id;
    store.insert_product(product.clone()).await.unwrap();

    let coupon = make_coupon("PGSAVE", Some(1));
    let coupon_id = coupon.id;
    store.insert_promotion(coupon).await.unwrap();

    let line = CartLine::new(user, &product, 3, Utc::now()).unwrap();
    let line_id = line.id;
    store.insert_cart_line(line).await.unwrap();

    let mut order = make_order(user, &product, 3);
    order.lines[0].line_id = line_id;
    order.coupon_id = Some(coupon_id);
    let order_id = order.id;
    store.insert_order(order).await.unwrap();

    let updated = store.apply_checkout(plan(order_id)).await.unwrap();
    assert_eq!(updated.status, OrderStatus::Paid);

    assert_eq!(store.get_product(product_id).await.unwrap().unwrap().stock, 2);
    assert!(!store.get_cart_line(line_id).await.unwrap().unwrap().is_active);
    assert_eq!(
        store.get_promotion(coupon_id).await.unwrap().unwrap().used_count,
        1
    );

    let logs = store.status_logs_for_order(order_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].new_status, OrderStatus::Paid);
}

#[tokio::test]
#[serial_test::serial]
async fn apply_checkout_rolls_back_on_insufficient_stock() {
    let store = get_test_store().await;
    let product = make_product(2);
    let product_id = product.id;
    store.insert_product(product.clone()).await.unwrap();

    let order = make_order(UserId::new(), &product, 3);
    let order_id = order.id;
    store.insert_order(order).await.unwrap();

    let result = store.apply_checkout(plan(order_id)).await;
    assert!(matches!(result, Err(StoreError::Domain(_))));

    // The transaction never committed anything.
    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(store.get_product(product_id).await.unwrap().unwrap().stock, 2);
    assert!(store.status_logs_for_order(order_id).await.unwrap().is_empty());
}

#[tokio::test]
#[serial_test::serial]
async fn apply_transition_appends_audit_entry() {
    let store = get_test_store().await;
    let product = make_product(5);
    store.insert_product(product.clone()).await.unwrap();

    let order = make_order(UserId::new(), &product, 1);
    let order_id = order.id;
    store.insert_order(order).await.unwrap();

    let actor = UserId::new();
    let updated = store
        .apply_transition(
            order_id,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            Some(actor),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Cancelled);

    let logs = store.status_logs_for_order(order_id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].actor, Some(actor));

    let stale = store
        .apply_transition(
            order_id,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            None,
            Utc::now(),
        )
        .await;
    assert!(matches!(stale, Err(StoreError::StatusConflict { .. })));
}

#[tokio::test]
#[serial_test::serial]
async fn concurrent_checkouts_one_wins() {
    let store = get_test_store().await;
    let product = make_product(5);
    let product_id = product.id;
    store.insert_product(product.clone()).await.unwrap();

    let first = make_order(UserId::new(), &product, 3);
    let second = make_order(UserId::new(), &product, 3);
    let first_id = first.id;
    let second_id = second.id;
    store.insert_order(first).await.unwrap();
    store.insert_order(second).await.unwrap();

    let store_a = store.clone();
    let store_b = store.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { store_a.apply_checkout(plan(first_id)).await }),
        tokio::spawn(async move { store_b.apply_checkout(plan(second_id)).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert_eq!(store.get_product(product_id).await.unwrap().unwrap().stock, 2);
}
