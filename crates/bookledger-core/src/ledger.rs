use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    book::{Book, Copies, Identity},
    error::{LedgerError, Result},
    events::{LedgerEvent, LedgerObserver, Receipt},
    key::BookKey,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// The only identity allowed to add stock.
    pub owner: Identity,
}

/// Book registry plus per-holder loan flags.
///
/// Calls are serialized through `&mut self`. Every check of a mutating call
/// runs before the first write, so a rejected call changes nothing: no
/// state, no event, no height bump.
pub struct Ledger {
    owner: Identity,
    books: BTreeMap<BookKey, Book>,
    book_keys: Vec<BookKey>,
    loans: BTreeMap<Identity, BTreeMap<BookKey, bool>>,
    events: Vec<LedgerEvent>,
    height: u64,
    observers: Vec<Box<dyn LedgerObserver>>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("owner", &self.owner)
            .field("books", &self.books)
            .field("book_keys", &self.book_keys)
            .field("loans", &self.loans)
            .field("events", &self.events)
            .field("height", &self.height)
            .field("observers_count", &self.observers.len())
            .finish()
    }
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            owner: config.owner,
            books: BTreeMap::new(),
            book_keys: Vec::new(),
            loans: BTreeMap::new(),
            events: Vec::new(),
            height: 0,
            observers: Vec::new(),
        }
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    /// Number of committed mutating calls.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn subscribe(&mut self, observer: Box<dyn LedgerObserver>) {
        self.observers.push(observer);
    }

    /// Standalone key derivation, identical to what every operation uses.
    pub fn normalize(name: &str) -> Result<BookKey> {
        BookKey::normalize(name)
    }

    /// Registers `copies` copies of a new title. Owner only.
    pub fn add_book(&mut self, caller: &Identity, name: &str, copies: Copies) -> Result<Receipt> {
        let key = self
            .check_add(caller, name, copies)
            .inspect_err(|err| reject("add_book", caller, err))?;

        self.books.insert(key, Book::new(key, name, copies));
        self.book_keys.push(key);
        tracing::info!(%caller, name, copies, "book added");
        Ok(self.commit(LedgerEvent::AddBook {
            name: name.to_string(),
            copies,
        }))
    }

    fn check_add(&self, caller: &Identity, name: &str, copies: Copies) -> Result<BookKey> {
        if *caller != self.owner {
            return Err(LedgerError::NotOwner {
                caller: caller.clone(),
            });
        }
        let key = BookKey::normalize(name)?;
        if copies == 0 {
            return Err(LedgerError::InvalidCopies { copies });
        }
        if self.books.contains_key(&key) {
            return Err(LedgerError::BookAlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(key)
    }

    /// Lends one copy of `name` to `caller`.
    pub fn borrow_book(&mut self, caller: &Identity, name: &str) -> Result<Receipt> {
        let key = self
            .check_borrow(caller, name)
            .inspect_err(|err| reject("borrow_book", caller, err))?;

        self.book_mut(&key, name)?.lend_to(caller);
        self.set_loan(caller, key, true);
        tracing::info!(%caller, name, "book borrowed");
        Ok(self.commit(LedgerEvent::BorrowBook {
            holder: caller.clone(),
            name: name.to_string(),
        }))
    }

    fn check_borrow(&self, caller: &Identity, name: &str) -> Result<BookKey> {
        let book = self.lookup(name)?;
        if !book.is_available() {
            return Err(LedgerError::BookUnavailable {
                name: name.to_string(),
            });
        }
        if self.is_borrowed(caller, &book.key) {
            return Err(LedgerError::AlreadyBorrowed {
                holder: caller.clone(),
                name: name.to_string(),
            });
        }
        Ok(book.key)
    }

    /// Takes back the copy `caller` currently holds.
    pub fn return_book(&mut self, caller: &Identity, name: &str) -> Result<Receipt> {
        let key = self
            .check_return(caller, name)
            .inspect_err(|err| reject("return_book", caller, err))?;

        self.book_mut(&key, name)?.take_back();
        self.set_loan(caller, key, false);
        tracing::info!(%caller, name, "book returned");
        Ok(self.commit(LedgerEvent::ReturnBook {
            holder: caller.clone(),
            name: name.to_string(),
        }))
    }

    fn check_return(&self, caller: &Identity, name: &str) -> Result<BookKey> {
        let book = self.lookup(name)?;
        if !self.is_borrowed(caller, &book.key) {
            return Err(LedgerError::NotBorrower {
                holder: caller.clone(),
                name: name.to_string(),
            });
        }
        Ok(book.key)
    }

    pub fn get_book(&self, name: &str) -> Result<&Book> {
        self.lookup(name)
    }

    pub fn get_book_by_key(&self, key: &BookKey) -> Option<&Book> {
        self.books.get(key)
    }

    pub fn number_of_books(&self) -> usize {
        self.book_keys.len()
    }

    pub fn book_key_at(&self, index: usize) -> Result<BookKey> {
        self.book_keys
            .get(index)
            .copied()
            .ok_or(LedgerError::IndexOutOfRange {
                index,
                len: self.book_keys.len(),
            })
    }

    pub fn is_borrowed(&self, holder: &str, key: &BookKey) -> bool {
        self.loans
            .get(holder)
            .and_then(|held| held.get(key))
            .copied()
            .unwrap_or(false)
    }

    /// All books in registration order.
    pub fn books(&self) -> impl Iterator<Item = &Book> + '_ {
        self.book_keys.iter().filter_map(|key| self.books.get(key))
    }

    pub fn available_books(&self) -> Vec<&Book> {
        self.books().filter(|book| book.is_available()).collect()
    }

    /// Holders with an open loan of `key`.
    pub fn outstanding_loans(&self, key: &BookKey) -> usize {
        self.loans
            .values()
            .filter(|held| held.get(key).copied().unwrap_or(false))
            .count()
    }

    /// Every `(holder, key)` pair whose flag is currently set.
    pub fn open_loans(&self) -> impl Iterator<Item = (&Identity, &BookKey)> + '_ {
        self.loans.iter().flat_map(|(holder, held)| {
            held.iter()
                .filter(|(_, borrowed)| **borrowed)
                .map(move |(key, _)| (holder, key))
        })
    }

    fn lookup(&self, name: &str) -> Result<&Book> {
        let key = BookKey::normalize(name)?;
        self.books.get(&key).ok_or_else(|| LedgerError::BookNotFound {
            name: name.to_string(),
        })
    }

    fn book_mut(&mut self, key: &BookKey, name: &str) -> Result<&mut Book> {
        self.books
            .get_mut(key)
            .ok_or_else(|| LedgerError::BookNotFound {
                name: name.to_string(),
            })
    }

    fn set_loan(&mut self, holder: &Identity, key: BookKey, borrowed: bool) {
        self.loans
            .entry(holder.clone())
            .or_default()
            .insert(key, borrowed);
    }

    fn commit(&mut self, event: LedgerEvent) -> Receipt {
        self.height += 1;
        self.events.push(event.clone());
        let receipt = Receipt {
            height: self.height,
            event,
        };
        for observer in &self.observers {
            observer.on_event(&receipt);
        }
        receipt
    }
}

fn reject(op: &'static str, caller: &Identity, err: &LedgerError) {
    tracing::debug!(op, %caller, kind = err.kind(), error = %err, "call rejected");
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    const OWNER: &str = "0xowner";
    const ALICE: &str = "0xalice";
    const BOB: &str = "0xbob";

    fn ledger() -> Ledger {
        Ledger::new(LedgerConfig {
            owner: OWNER.into(),
        })
    }

    fn id(s: &str) -> Identity {
        s.to_string()
    }

    #[derive(Default)]
    struct Recorder(Rc<RefCell<Vec<Receipt>>>);

    impl LedgerObserver for Recorder {
        fn on_event(&self, receipt: &Receipt) {
            self.0.borrow_mut().push(receipt.clone());
        }
    }

    #[test]
    fn add_book_registers_title() {
        let mut ledger = ledger();
        let before = ledger.number_of_books();
        let receipt = ledger.add_book(&id(OWNER), "Mastering Ethereum", 2).unwrap();
        assert_eq!(ledger.number_of_books(), before + 1);
        assert_eq!(receipt.height, 1);
        assert_eq!(
            receipt.event,
            LedgerEvent::AddBook {
                name: "Mastering Ethereum".into(),
                copies: 2
            }
        );

        let book = ledger.get_book("Mastering Ethereum").unwrap();
        assert_eq!(book.name, "Mastering Ethereum");
        assert_eq!(book.copies, 2);
        assert!(book.borrowers.is_empty());
        let key = ledger.book_key_at(0).unwrap();
        assert_eq!(key, BookKey::normalize("Mastering Ethereum").unwrap());
        assert_eq!(ledger.get_book_by_key(&key), Some(book));
        assert_eq!(ledger.get_book_by_key(&BookKey::normalize("Dune").unwrap()), None);
    }

    #[test]
    fn add_book_rejects_duplicates() {
        let mut ledger = ledger();
        ledger.add_book(&id(OWNER), "Mastering Ethereum", 2).unwrap();
        assert_matches!(
            ledger.add_book(&id(OWNER), "Mastering Ethereum", 1),
            Err(LedgerError::BookAlreadyExists { .. })
        );
        assert_eq!(ledger.number_of_books(), 1);
        assert_eq!(ledger.get_book("Mastering Ethereum").unwrap().copies, 2);
    }

    #[test]
    fn add_book_validates_name_and_copies() {
        let mut ledger = ledger();
        assert_matches!(
            ledger.add_book(&id(OWNER), "", 2),
            Err(LedgerError::InvalidName { .. })
        );
        assert_matches!(
            ledger.add_book(&id(OWNER), &"a".repeat(33), 2),
            Err(LedgerError::InvalidName { .. })
        );
        assert_matches!(
            ledger.add_book(&id(OWNER), "Mastering Ethereum", 0),
            Err(LedgerError::InvalidCopies { copies: 0 })
        );
        // Name is checked before copies.
        assert_matches!(
            ledger.add_book(&id(OWNER), "", 0),
            Err(LedgerError::InvalidName { .. })
        );
        assert_eq!(ledger.number_of_books(), 0);
        assert_eq!(ledger.height(), 0);
    }

    #[test]
    fn add_book_checks_run_in_order() {
        let mut ledger = ledger();
        ledger.add_book(&id(OWNER), "Mastering Ethereum", 2).unwrap();

        // Ownership is checked before the name.
        assert_matches!(
            ledger.add_book(&id(ALICE), "", 0),
            Err(LedgerError::NotOwner { .. })
        );
        assert_matches!(
            ledger.add_book(&id(ALICE), "Mastering Ethereum", 1),
            Err(LedgerError::NotOwner { .. })
        );
        // Copies are checked before duplicates.
        assert_matches!(
            ledger.add_book(&id(OWNER), "Mastering Ethereum", 0),
            Err(LedgerError::InvalidCopies { copies: 0 })
        );
        assert_matches!(
            ledger.add_book(&id(OWNER), "Mastering Ethereum", 3),
            Err(LedgerError::BookAlreadyExists { .. })
        );
        assert_eq!(ledger.height(), 1);
        assert_eq!(ledger.get_book("Mastering Ethereum").unwrap().copies, 2);
    }

    #[test]
    fn add_book_by_non_owner_changes_nothing() {
        let mut ledger = ledger();
        let seen = Rc::new(RefCell::new(Vec::new()));
        ledger.subscribe(Box::new(Recorder(seen.clone())));

        let err = ledger
            .add_book(&id(ALICE), "Mastering Ethereum", 0)
            .unwrap_err();
        assert_matches!(err, LedgerError::NotOwner { ref caller } if caller == ALICE);
        assert!(err.is_access_control());
        assert_eq!(ledger.number_of_books(), 0);
        assert!(ledger.events().is_empty());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn borrow_then_return_round_trip() {
        let mut ledger = ledger();
        let alice = id(ALICE);
        ledger.add_book(&id(OWNER), "Mastering Ethereum", 2).unwrap();
        let key = Ledger::normalize("Mastering Ethereum").unwrap();
        assert!(!ledger.is_borrowed(&alice, &key));

        ledger.borrow_book(&alice, "Mastering Ethereum").unwrap();
        let book = ledger.get_book("Mastering Ethereum").unwrap();
        assert_eq!(book.copies, 1);
        assert_eq!(book.borrowers, vec![alice.clone()]);
        assert!(ledger.is_borrowed(&alice, &key));

        let receipt = ledger.return_book(&alice, "Mastering Ethereum").unwrap();
        assert_eq!(receipt.height, 3);
        let book = ledger.get_book("Mastering Ethereum").unwrap();
        assert_eq!(book.copies, 2);
        assert!(!ledger.is_borrowed(&alice, &key));
        // The log keeps past borrowers.
        assert_eq!(book.borrowers, vec![alice]);
    }

    #[test]
    fn double_borrow_is_rejected() {
        let mut ledger = ledger();
        let alice = id(ALICE);
        ledger.add_book(&id(OWNER), "Mastering Ethereum", 2).unwrap();
        ledger.borrow_book(&alice, "Mastering Ethereum").unwrap();
        assert_matches!(
            ledger.borrow_book(&alice, "Mastering Ethereum"),
            Err(LedgerError::AlreadyBorrowed { .. })
        );
        let book = ledger.get_book("Mastering Ethereum").unwrap();
        assert_eq!(book.copies, 1);
        assert_eq!(book.borrowers.len(), 1);
    }

    #[test]
    fn last_copy_goes_to_first_borrower() {
        let mut ledger = ledger();
        ledger.add_book(&id(OWNER), "Think and Grow Rich", 1).unwrap();
        ledger.borrow_book(&id(ALICE), "Think and Grow Rich").unwrap();
        let height = ledger.height();

        assert_matches!(
            ledger.borrow_book(&id(BOB), "Think and Grow Rich"),
            Err(LedgerError::BookUnavailable { .. })
        );
        let key = Ledger::normalize("Think and Grow Rich").unwrap();
        assert!(!ledger.is_borrowed(BOB, &key));
        assert_eq!(ledger.get_book("Think and Grow Rich").unwrap().copies, 0);
        assert_eq!(ledger.height(), height);
        assert!(ledger.available_books().is_empty());
    }

    #[test]
    fn unavailable_wins_over_already_borrowed() {
        let mut ledger = ledger();
        ledger.add_book(&id(OWNER), "Think and Grow Rich", 1).unwrap();
        ledger.borrow_book(&id(ALICE), "Think and Grow Rich").unwrap();
        assert_matches!(
            ledger.borrow_book(&id(ALICE), "Think and Grow Rich"),
            Err(LedgerError::BookUnavailable { .. })
        );
    }

    #[test]
    fn return_without_loan_is_rejected() {
        let mut ledger = ledger();
        ledger.add_book(&id(OWNER), "Mastering Ethereum", 2).unwrap();
        assert_matches!(
            ledger.return_book(&id(BOB), "Mastering Ethereum"),
            Err(LedgerError::NotBorrower { .. })
        );

        ledger.borrow_book(&id(ALICE), "Mastering Ethereum").unwrap();
        ledger.return_book(&id(ALICE), "Mastering Ethereum").unwrap();
        assert_matches!(
            ledger.return_book(&id(ALICE), "Mastering Ethereum"),
            Err(LedgerError::NotBorrower { .. })
        );
        assert_eq!(ledger.get_book("Mastering Ethereum").unwrap().copies, 2);
    }

    #[test]
    fn holder_can_borrow_again_after_returning() {
        let mut ledger = ledger();
        let alice = id(ALICE);
        ledger.add_book(&id(OWNER), "Art of War", 5).unwrap();
        ledger.borrow_book(&alice, "Art of War").unwrap();
        ledger.return_book(&alice, "Art of War").unwrap();
        ledger.borrow_book(&alice, "Art of War").unwrap();
        let book = ledger.get_book("Art of War").unwrap();
        assert_eq!(book.copies, 4);
        assert_eq!(book.borrowers, vec![alice.clone(), alice]);
    }

    #[test]
    fn name_errors_apply_to_every_operation() {
        let mut ledger = ledger();
        let long = "Our Last Invention Our Last Invention";
        for name in ["", long] {
            assert_matches!(
                ledger.borrow_book(&id(ALICE), name),
                Err(LedgerError::InvalidName { .. })
            );
            assert_matches!(
                ledger.return_book(&id(ALICE), name),
                Err(LedgerError::InvalidName { .. })
            );
            assert_matches!(ledger.get_book(name), Err(LedgerError::InvalidName { .. }));
        }
    }

    #[test]
    fn unknown_books_are_not_found() {
        let mut ledger = ledger();
        assert_matches!(
            ledger.get_book("Dune"),
            Err(LedgerError::BookNotFound { .. })
        );
        assert_matches!(
            ledger.borrow_book(&id(ALICE), "Dune"),
            Err(LedgerError::BookNotFound { .. })
        );
        assert_matches!(
            ledger.return_book(&id(ALICE), "Dune"),
            Err(LedgerError::BookNotFound { .. })
        );
    }

    #[test]
    fn enumeration_follows_insertion_order() {
        let mut ledger = ledger();
        let owner = id(OWNER);
        for (name, copies) in [("Zen", 1), ("Art of War", 5), ("Mastering Ethereum", 2)] {
            ledger.add_book(&owner, name, copies).unwrap();
        }
        let names: Vec<String> = (0..ledger.number_of_books())
            .map(|i| ledger.book_key_at(i).unwrap().to_name().unwrap())
            .collect();
        assert_eq!(names, ["Zen", "Art of War", "Mastering Ethereum"]);
        assert_eq!(
            ledger.books().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            names
        );
        assert_matches!(
            ledger.book_key_at(3),
            Err(LedgerError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn observers_see_each_committed_event_once() {
        let mut ledger = ledger();
        let seen = Rc::new(RefCell::new(Vec::new()));
        ledger.subscribe(Box::new(Recorder(seen.clone())));

        ledger.add_book(&id(OWNER), "The lean startup", 1).unwrap();
        ledger.borrow_book(&id(ALICE), "The lean startup").unwrap();
        let _ = ledger.borrow_book(&id(BOB), "The lean startup");
        ledger.return_book(&id(ALICE), "The lean startup").unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[1].event,
            LedgerEvent::BorrowBook {
                holder: ALICE.into(),
                name: "The lean startup".into()
            }
        );
        assert_eq!(
            seen[2].event,
            LedgerEvent::ReturnBook {
                holder: ALICE.into(),
                name: "The lean startup".into()
            }
        );
        assert_eq!(
            seen.iter().map(|r| r.height).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(ledger.events().len(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Borrow(usize, usize),
        Return(usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, 0..3usize).prop_map(|(h, b)| Op::Borrow(h, b)),
            (0..4usize, 0..3usize).prop_map(|(h, b)| Op::Return(h, b)),
        ]
    }

    proptest! {
        #[test]
        fn copies_plus_open_loans_equals_stock(
            stock in proptest::collection::vec(1u64..4, 3),
            ops in proptest::collection::vec(op(), 0..64),
        ) {
            let titles = ["Dune", "Emma", "Ulysses"];
            let holders = ["0x1", "0x2", "0x3", "0x4"];
            let mut ledger = ledger();
            for (title, copies) in titles.iter().zip(&stock) {
                ledger.add_book(&id(OWNER), title, *copies).unwrap();
            }
            for op in ops {
                let before = ledger.height();
                let result = match op {
                    Op::Borrow(h, b) => ledger.borrow_book(&id(holders[h]), titles[b]),
                    Op::Return(h, b) => ledger.return_book(&id(holders[h]), titles[b]),
                };
                prop_assert_eq!(ledger.height(), before + u64::from(result.is_ok()));
            }
            for (title, copies) in titles.iter().zip(&stock) {
                let book = ledger.get_book(title).unwrap();
                let open = ledger.outstanding_loans(&book.key) as u64;
                prop_assert_eq!(book.copies + open, *copies);
                prop_assert!(book.copies <= *copies);
            }
        }
    }
}
