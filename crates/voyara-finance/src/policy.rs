use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementPolicy {
    pub currency: String,
    pub default_payment_method: String,
    pub payment_timeout: Duration,
}

impl Default for SettlementPolicy {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            default_payment_method: "bank_transfer".to_string(),
            payment_timeout: Duration::from_secs(30),
        }
    }
}
