//! Core primitives for the bookledger stack.
//!
//! The crate exposes a single stateful unit, the [`Ledger`], plus the small
//! building blocks it is made of:
//!
//! * [`key`] — fixed-width book keys derived from display names.
//! * [`book`] — the per-title record and its append-only borrower log.
//! * [`events`] — events, commit receipts and the observer hook.
//! * [`ledger`] — the registry and the borrow/return state machine.
//! * [`snapshot`] — serializable views of the ledger with a SHA-256 state root.
//!
//! Every mutating call validates fully before touching state, so a failed
//! call leaves the ledger exactly as it found it.

pub mod book;
pub mod events;
pub mod key;
pub mod ledger;
pub mod snapshot;

mod error;

pub use book::{Book, Identity};
pub use error::{LedgerError, Result};
pub use events::{LedgerEvent, LedgerObserver, Receipt, TracingObserver};
pub use key::{BookKey, KEY_WIDTH};
pub use ledger::{Ledger, LedgerConfig};
pub use snapshot::LedgerSnapshot;
