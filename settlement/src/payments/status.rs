//! Payout status shown to wallets while a settlement is running.

use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutState {
    #[default]
    Off,
    Processing,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutStatus {
    pub unverified: PayoutState,
    pub uphold: PayoutState,
    pub gemini: PayoutState,
    pub bitflyer: PayoutState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout_date: Option<NaiveDate>,
}

/// Latest payout status. Writers replace the whole value.
#[derive(Debug, Default)]
pub struct PayoutStatusCache {
    current: RwLock<PayoutStatus>,
}

impl PayoutStatusCache {
    pub fn get(&self) -> PayoutStatus {
        self.current.read().clone()
    }

    pub fn replace(&self, status: PayoutStatus) -> PayoutStatus {
        std::mem::replace(&mut *self.current.write(), status)
    }
}
