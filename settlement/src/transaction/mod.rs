//! # Transaction Module
//!
//! Data model shared by the offline signing pipeline and the payments
//! service:
//!
//! ```text
//! types.rs  : custodians, wallet types, wallet keys, lifecycle status
//! payout.rs : antifraud input records and validated payouts
//! record.rs : ledger transactions, payment details, authorizations
//! ```

pub mod payout;
pub mod record;
pub mod types;

pub use payout::{AntifraudRecord, Payout, ProviderInfo};
pub use record::{Authorization, PaymentDetails, Transaction};
pub use types::{Custodian, TransactionStatus, ValidationError, WalletKey, WalletType};
