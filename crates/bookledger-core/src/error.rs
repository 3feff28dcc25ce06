use thiserror::Error;

use crate::key::KEY_WIDTH;

/// Result alias used throughout the ledger.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Canonical error type returned by every ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Name is empty, contains a NUL byte, or encodes to more than the key width.
    #[error("invalid book name {name:?}: must be 1..={} bytes of UTF-8 without NUL", KEY_WIDTH)]
    InvalidName { name: String },

    /// `add_book` called with zero copies.
    #[error("invalid number of copies {copies}: must be at least 1")]
    InvalidCopies { copies: u64 },

    #[error("book {name:?} is already registered")]
    BookAlreadyExists { name: String },

    #[error("book {name:?} is not registered")]
    BookNotFound { name: String },

    #[error("no copies of {name:?} left to borrow")]
    BookUnavailable { name: String },

    #[error("{holder} already holds a copy of {name:?}")]
    AlreadyBorrowed { holder: String, name: String },

    #[error("{holder} has no outstanding loan of {name:?}")]
    NotBorrower { holder: String, name: String },

    /// Privileged call made by someone other than the ledger owner.
    #[error("caller {caller} is not the owner")]
    NotOwner { caller: String },

    #[error("index {index} out of range for {len} registered books")]
    IndexOutOfRange { index: usize, len: usize },
}

impl LedgerError {
    /// Access-control failures are reported apart from business-rule failures.
    pub fn is_access_control(&self) -> bool {
        matches!(self, LedgerError::NotOwner { .. })
    }

    /// Stable short name of the variant, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::InvalidName { .. } => "InvalidName",
            LedgerError::InvalidCopies { .. } => "InvalidCopies",
            LedgerError::BookAlreadyExists { .. } => "BookAlreadyExists",
            LedgerError::BookNotFound { .. } => "BookNotFound",
            LedgerError::BookUnavailable { .. } => "BookUnavailable",
            LedgerError::AlreadyBorrowed { .. } => "AlreadyBorrowed",
            LedgerError::NotBorrower { .. } => "NotBorrower",
            LedgerError::NotOwner { .. } => "NotOwner",
            LedgerError::IndexOutOfRange { .. } => "IndexOutOfRange",
        }
    }
}
