use std::fmt;

use serde::{Deserialize, Serialize};

use crate::book::{Copies, Identity};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    AddBook {
        name: String,
        copies: Copies,
    },
    BorrowBook {
        holder: Identity,
        name: String,
    },
    ReturnBook {
        holder: Identity,
        name: String,
    },
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEvent::AddBook { name, copies } => write!(f, "AddBook({name:?}, {copies})"),
            LedgerEvent::BorrowBook { holder, name } => {
                write!(f, "BorrowBook({holder}, {name:?})")
            }
            LedgerEvent::ReturnBook { holder, name } => {
                write!(f, "ReturnBook({holder}, {name:?})")
            }
        }
    }
}

/// Proof that a mutating call committed.
///
/// `height` counts committed calls; the first successful call yields 1.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub height: u64,
    pub event: LedgerEvent,
}

/// Hook for external subscribers. Called once per committed call, after the
/// state change is in place; never called for rejected calls.
pub trait LedgerObserver {
    fn on_event(&self, receipt: &Receipt);
}

/// Emits every committed event as a `tracing` record.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl LedgerObserver for TracingObserver {
    fn on_event(&self, receipt: &Receipt) {
        tracing::info!(height = receipt.height, event = %receipt.event, "ledger event");
    }
}
