//! Payment confirmation orchestration.

use chrono::{DateTime, Utc};
use domain::{DomainError, Order, OrderStatus, PricedLine, pricing};
use store::{CheckoutPlan, CommerceStore, RetryPolicy, StoreError, with_retries};

use crate::error::CheckoutError;
use crate::gateway::PaymentConfirmation;

/// Reacts to gateway confirmations with the single atomic checkout unit:
/// transition to `PAID`, stock decrement, cart deactivation, and coupon
/// redemption. Either all of it commits or none of it does.
///
/// The whole unit runs inside one store transaction; everything this
/// service checks beforehand is advisory and re-validated under the lock.
pub struct PaymentOrchestrator<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: CommerceStore> PaymentOrchestrator<S> {
    /// Creates a new orchestrator with the default retry policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the transient-error retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handles a payment confirmation.
    ///
    /// Idempotent: confirming an order that is already `PAID` returns it
    /// as-is, with no further stock, cart, coupon, or audit effects. A
    /// declined confirmation leaves the order `PENDING`.
    #[tracing::instrument(skip(self, confirmation), fields(order_id = %confirmation.order_id))]
    pub async fn confirm_payment(
        &self,
        confirmation: PaymentConfirmation,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        metrics::counter!("checkout_confirmations_total").increment(1);
        let started = std::time::Instant::now();

        let order = self
            .store
            .get_order(confirmation.order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(confirmation.order_id))?;

        if order.status == OrderStatus::Paid {
            tracing::info!("order already paid, confirmation is a no-op");
            return Ok(order);
        }
        if order.status != OrderStatus::Pending {
            return Err(DomainError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Paid,
            }
            .into());
        }
        if !confirmation.success {
            tracing::warn!("gateway reported a failed payment");
            metrics::counter!("checkout_failures_total", "reason" => "declined").increment(1);
            return Err(CheckoutError::PaymentDeclined(confirmation.order_id));
        }

        self.check_settled_amount(&order, &confirmation, now).await;

        let plan = CheckoutPlan {
            order_id: confirmation.order_id,
            bank_type: confirmation.bank_type,
            tracking_code: confirmation.tracking_code.clone(),
            now,
        };

        let store = &self.store;
        let result = with_retries(self.retry, "apply_checkout", || {
            store.apply_checkout(plan.clone())
        })
        .await;

        let updated = match result {
            Ok(updated) => updated,
            // Lost a race against another confirmation of the same order:
            // that one did the work, so this call degenerates to a no-op.
            Err(StoreError::StatusConflict {
                actual: OrderStatus::Paid,
                ..
            }) => {
                tracing::info!("order was paid concurrently, confirmation is a no-op");
                return self.get_paid_order(confirmation.order_id).await;
            }
            Err(StoreError::StatusConflict { actual, .. }) => {
                metrics::counter!("checkout_failures_total", "reason" => "status").increment(1);
                return Err(DomainError::InvalidTransition {
                    from: actual,
                    to: OrderStatus::Paid,
                }
                .into());
            }
            Err(err) => {
                metrics::counter!("checkout_failures_total", "reason" => "store").increment(1);
                return Err(err.into());
            }
        };

        if updated.coupon_id.is_some() {
            metrics::counter!("promotion_redemptions_total").increment(1);
        }
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(order_number = %updated.order_number, "payment confirmed");

        Ok(updated)
    }

    /// Warns when the settled amount differs from the amount due. The
    /// confirmation is still honored; reconciliation is a back-office
    /// concern.
    async fn check_settled_amount(
        &self,
        order: &Order,
        confirmation: &PaymentConfirmation,
        now: DateTime<Utc>,
    ) {
        let coupon = match order.coupon_id {
            Some(coupon_id) => self.store.get_promotion(coupon_id).await.ok().flatten(),
            None => None,
        };
        let priced: Vec<PricedLine> = order
            .lines
            .iter()
            .map(|l| PricedLine::new(l.unit_price, l.quantity))
            .collect();
        let totals = pricing::cart_totals(&priced, coupon.as_ref(), now);

        if confirmation.amount != totals.final_total {
            tracing::warn!(
                settled = %confirmation.amount,
                due = %totals.final_total,
                "settled amount differs from amount due"
            );
        }
    }

    async fn get_paid_order(&self, order_id: common::OrderId) -> Result<Order, CheckoutError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }
}
