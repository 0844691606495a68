//! # Payments Service
//!
//! The online path: prepare ledger records, collect authorizer signatures,
//! and submit to the custodian once enough distinct authorizers signed.
//!
//! ```text
//! prepare ──► prepared ──authorize×N──► authorized ──submit──► submitted
//!                 │                          │                    │
//!                 └──────────────────────────┴────────► failed ◄──┘
//! ```

pub mod service;
pub mod status;

pub use service::{AuthorizeOutcome, PaymentsService, SealedWalletSecret, ServiceInfo};
pub use status::{PayoutState, PayoutStatus, PayoutStatusCache};
