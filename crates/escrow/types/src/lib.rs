//! Escrow Domain Types
//!
//! This crate defines the domain types for the reputation-weighted escrow:
//! a client locks a payment for a worker, and the lock opens after a
//! duration derived from the worker's track record and current exposure.
//!
//! # Key Concepts
//!
//! - **Worker profile**: job count, append-only dispute history, and the
//!   amount currently at risk across open contracts.
//! - **Contract**: one locked payment moving through
//!   `Locked → PendingRelease → Released`, with a dispute side-branch that
//!   an authority resolves to `Released` or `Refunded`.
//! - **Reputation breakdown**: a derived view (score, tier, trust color,
//!   unlock duration) that is recomputed on every read.
//! - **Ledger records**: unspent outputs held at the escrow deposit address,
//!   identified by their ledger id.
//!
//! # Architecture
//!
//! This is a pure types crate with no runtime dependencies. IDs use the
//! newtype pattern and implement `Display`, `generate()`, and `new()`.

#![deny(unsafe_code)]

mod contract;
mod errors;
mod events;
mod ids;
mod ledger;
mod reputation;
mod worker;

pub use contract::*;
pub use errors::*;
pub use events::*;
pub use ids::*;
pub use ledger::*;
pub use reputation::*;
pub use worker::*;
