use std::fmt;

use bookledger_core::{Book, BookKey, Identity, Ledger, LedgerError, Receipt};
use serde::{Deserialize, Serialize};

/// A JSON call script: an optional owner and the calls to replay in order.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Script {
    #[serde(default)]
    pub owner: Option<Identity>,
    pub calls: Vec<Call>,
}

/// One ledger call. A missing `caller` means the ledger owner.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    Add {
        #[serde(default)]
        caller: Option<Identity>,
        name: String,
        copies: u64,
    },
    Borrow {
        #[serde(default)]
        caller: Option<Identity>,
        name: String,
    },
    Return {
        #[serde(default)]
        caller: Option<Identity>,
        name: String,
    },
    Get {
        name: String,
    },
    Count,
    KeyAt {
        index: usize,
    },
    IsBorrowed {
        holder: Identity,
        name: String,
    },
    Normalize {
        name: String,
    },
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::Add { name, copies, .. } => write!(f, "add({name:?}, {copies})"),
            Call::Borrow { name, .. } => write!(f, "borrow({name:?})"),
            Call::Return { name, .. } => write!(f, "return({name:?})"),
            Call::Get { name } => write!(f, "get({name:?})"),
            Call::Count => write!(f, "count()"),
            Call::KeyAt { index } => write!(f, "key_at({index})"),
            Call::IsBorrowed { holder, name } => write!(f, "is_borrowed({holder}, {name:?})"),
            Call::Normalize { name } => write!(f, "normalize({name:?})"),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Committed { receipt: Receipt },
    Book { book: Book },
    Count { count: usize },
    Key { key: BookKey },
    Flag { borrowed: bool },
    Failed { kind: String, message: String },
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

impl From<LedgerError> for Outcome {
    fn from(err: LedgerError) -> Self {
        Outcome::Failed {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Committed { receipt } => {
                write!(f, "committed at height {}: {}", receipt.height, receipt.event)
            }
            Outcome::Book { book } => write!(
                f,
                "{:?} copies={} borrowers=[{}]",
                book.name,
                book.copies,
                book.borrowers.join(", ")
            ),
            Outcome::Count { count } => write!(f, "{count}"),
            Outcome::Key { key } => write!(f, "{key}"),
            Outcome::Flag { borrowed } => write!(f, "{borrowed}"),
            Outcome::Failed { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

/// A replayed call paired with what it produced, as printed by `run --json`.
#[derive(Debug, Serialize)]
pub struct Step<'a> {
    pub index: usize,
    pub call: &'a Call,
    pub outcome: &'a Outcome,
}

pub fn steps<'a>(calls: &'a [Call], outcomes: &'a [Outcome]) -> Vec<Step<'a>> {
    calls
        .iter()
        .zip(outcomes)
        .enumerate()
        .map(|(idx, (call, outcome))| Step {
            index: idx + 1,
            call,
            outcome,
        })
        .collect()
}

/// Applies one call to the ledger. Ledger errors become `Outcome::Failed`.
pub fn execute(ledger: &mut Ledger, call: &Call) -> Outcome {
    let owner = ledger.owner().clone();
    let caller_or_owner = |caller: &Option<Identity>| caller.clone().unwrap_or_else(|| owner.clone());
    let result = match call {
        Call::Add {
            caller,
            name,
            copies,
        } => ledger
            .add_book(&caller_or_owner(caller), name, *copies)
            .map(|receipt| Outcome::Committed { receipt }),
        Call::Borrow { caller, name } => ledger
            .borrow_book(&caller_or_owner(caller), name)
            .map(|receipt| Outcome::Committed { receipt }),
        Call::Return { caller, name } => ledger
            .return_book(&caller_or_owner(caller), name)
            .map(|receipt| Outcome::Committed { receipt }),
        Call::Get { name } => ledger.get_book(name).map(|book| Outcome::Book {
            book: book.clone(),
        }),
        Call::Count => Ok(Outcome::Count {
            count: ledger.number_of_books(),
        }),
        Call::KeyAt { index } => ledger.book_key_at(*index).map(|key| Outcome::Key { key }),
        Call::IsBorrowed { holder, name } => Ledger::normalize(name).map(|key| Outcome::Flag {
            borrowed: ledger.is_borrowed(holder, &key),
        }),
        Call::Normalize { name } => Ledger::normalize(name).map(|key| Outcome::Key { key }),
    };
    result.unwrap_or_else(Outcome::from)
}

/// Replays `calls` in order. With `fail_fast` the run stops after the first
/// failed call; the failing outcome is still included.
pub fn run(ledger: &mut Ledger, calls: &[Call], fail_fast: bool) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(calls.len());
    for call in calls {
        let outcome = execute(ledger, call);
        let failed = outcome.is_failure();
        outcomes.push(outcome);
        if failed && fail_fast {
            break;
        }
    }
    outcomes
}
