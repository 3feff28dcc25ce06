use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    book::{Book, Identity},
    events::LedgerEvent,
    key::{self, BookKey},
    ledger::Ledger,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenLoan {
    pub holder: Identity,
    pub key: BookKey,
}

/// Point-in-time copy of the whole ledger, in registry order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub height: u64,
    pub owner: Identity,
    pub books: Vec<Book>,
    pub open_loans: Vec<OpenLoan>,
    pub events: Vec<LedgerEvent>,
    #[serde(with = "key::hex32")]
    pub state_root: [u8; 32],
}

impl Ledger {
    pub fn snapshot(&self) -> LedgerSnapshot {
        let books: Vec<Book> = self.books().cloned().collect();
        let open_loans: Vec<OpenLoan> = self
            .open_loans()
            .map(|(holder, key)| OpenLoan {
                holder: holder.clone(),
                key: *key,
            })
            .collect();
        LedgerSnapshot {
            height: self.height(),
            owner: self.owner().clone(),
            state_root: compute_state_root(self.owner(), &books, &open_loans),
            books,
            open_loans,
            events: self.events().to_vec(),
        }
    }
}

fn compute_state_root(owner: &Identity, books: &[Book], loans: &[OpenLoan]) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    let mut hasher = Sha256::new();
    hasher.update(b"owner");
    hasher.update(owner.as_bytes());
    leaves.push(hasher.finalize().into());
    for book in books {
        let mut hasher = Sha256::new();
        hasher.update(b"book");
        hasher.update(book.key.as_bytes());
        hasher.update(book.copies.to_le_bytes());
        for holder in &book.borrowers {
            hasher.update((holder.len() as u64).to_le_bytes());
            hasher.update(holder.as_bytes());
        }
        leaves.push(hasher.finalize().into());
    }
    for loan in loans {
        let mut hasher = Sha256::new();
        hasher.update(b"loan");
        hasher.update(loan.key.as_bytes());
        hasher.update(loan.holder.as_bytes());
        leaves.push(hasher.finalize().into());
    }
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"bookledger-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
