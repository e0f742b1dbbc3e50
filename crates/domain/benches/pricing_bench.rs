use chrono::{Duration, Utc};
use common::ProductId;
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Money, NewPromotion, PricedLine, Product, Promotion, PromotionKind, pricing};

fn make_product(price: i64) -> Product {
    Product::new("Bench Widget", Money::from_units(price), 100, Utc::now()).unwrap()
}

fn make_product_promotion(percent: u8, product_ids: Vec<ProductId>) -> Promotion {
    let now = Utc::now();
    Promotion::new(
        NewPromotion {
            title: format!("bench {percent}%"),
            kind: PromotionKind::Product,
            discount_percent: percent,
            code: None,
            product_ids,
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::days(1),
            max_uses: None,
        },
        now,
    )
    .unwrap()
}

fn bench_effective_unit_price(c: &mut Criterion) {
    let product = make_product(12_000);
    let promotions: Vec<Promotion> = (1..=20)
        .map(|i| make_product_promotion(i as u8, vec![product.id]))
        .collect();
    let now = Utc::now();

    c.bench_function("pricing/effective_unit_price_20_promotions", |b| {
        b.iter(|| pricing::effective_unit_price(&product, &promotions, now));
    });
}

fn bench_cart_totals(c: &mut Criterion) {
    let now = Utc::now();
    let lines: Vec<PricedLine> = (1..=50)
        .map(|i| PricedLine::new(Money::from_units(i * 100), (i % 5 + 1) as u32))
        .collect();
    let coupon = Promotion::new(
        NewPromotion {
            title: "bench coupon".to_string(),
            kind: PromotionKind::Coupon,
            discount_percent: 15,
            code: Some("BENCH15".to_string()),
            product_ids: vec![],
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::days(1),
            max_uses: None,
        },
        now,
    )
    .unwrap();

    c.bench_function("pricing/cart_totals_50_lines", |b| {
        b.iter(|| pricing::cart_totals(&lines, Some(&coupon), now));
    });
}

criterion_group!(benches, bench_effective_unit_price, bench_cart_totals);
criterion_main!(benches);
