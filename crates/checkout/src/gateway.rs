//! Payment gateway confirmation events.

use common::OrderId;
use domain::{BankType, Money};
use serde::{Deserialize, Serialize};

/// Asynchronous confirmation delivered by the payment gateway adapter.
///
/// The core never initiates outbound payment calls; it only reacts to
/// these events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    pub bank_type: BankType,
    pub tracking_code: String,
    /// Amount the gateway reports as settled.
    pub amount: Money,
    pub success: bool,
}
