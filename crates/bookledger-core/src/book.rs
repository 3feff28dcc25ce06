use serde::{Deserialize, Serialize};

use crate::key::BookKey;

/// Caller identity, e.g. a `0x`-prefixed account address.
pub type Identity = String;
pub type Copies = u64;

/// A registered title.
///
/// `borrowers` is a permanent audit trail of everyone who ever borrowed the
/// book, in borrow order. It is not the set of current holders: returning a
/// copy does not remove the entry, and a holder who borrows twice appears
/// twice.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Book {
    pub key: BookKey,
    pub name: String,
    pub copies: Copies,
    pub borrowers: Vec<Identity>,
}

impl Book {
    pub(crate) fn new(key: BookKey, name: &str, copies: Copies) -> Self {
        Self {
            key,
            name: name.to_string(),
            copies,
            borrowers: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.copies > 0
    }

    pub(crate) fn lend_to(&mut self, holder: &Identity) {
        debug_assert!(self.copies > 0);
        self.copies -= 1;
        self.borrowers.push(holder.clone());
    }

    pub(crate) fn take_back(&mut self) {
        self.copies += 1;
    }
}
