// Copyright (c) 2026 Settlement Engineering. MIT License.
// See LICENSE for details.

//! # Settlement Core Library
//!
//! Rewards payouts leave through four custodians, and every one of them
//! wants the money described differently. This crate turns antifraud-approved
//! payout lists into custodian-ready signed artifacts, and keeps the ledger
//! that gates online submissions behind multi-key authorization.
//!
//! ## Architecture
//!
//! - **config**: constants, the authorized key set, service settings.
//! - **crypto**: Ed25519, HMAC-SHA384, AES-256-GCM, X25519 exchange, hashing.
//! - **transaction**: payout records, ledger records, lifecycle status.
//! - **storage**: sled-backed ledger with idempotent inserts and retries.
//! - **vault**: encrypted secret store addressed by wallet key.
//! - **authorization**: per-document signatures and HTTP message signatures.
//! - **custodian**: one artifact generator per custodian, plus the rate and
//!   submission seams.
//! - **partition**: the offline signing run, from input files to artifacts.
//! - **payments**: the online prepare / authorize / submit service.
//! - **error**: crate-level error categories.
//!
//! ## Ground Rules
//!
//! 1. Amounts are decimals. Nothing that touches money is a float.
//! 2. A run writes every artifact or none of them.
//! 3. Secret bytes never reach a log line or an output file.

pub mod authorization;
pub mod config;
pub mod crypto;
pub mod custodian;
pub mod error;
pub mod partition;
pub mod payments;
pub mod storage;
pub mod transaction;
pub mod vault;

pub use error::SettlementError;
