use anyhow::{Context, Result};
use bookledger_core::{Book, Identity, Ledger, LedgerConfig, Receipt, TracingObserver};
use rand::{rngs::OsRng, RngCore};

/// A fresh `0x`-prefixed 20-byte account identity.
pub fn random_identity() -> Identity {
    let mut bytes = [0u8; 20];
    OsRng.fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

/// Creates a ledger owned by `owner` (a random identity if none is given)
/// with committed events routed to the log.
pub fn bootstrap(owner: Option<Identity>) -> Ledger {
    let owner = owner.unwrap_or_else(random_identity);
    let mut ledger = Ledger::new(LedgerConfig { owner });
    ledger.subscribe(Box::new(TracingObserver));
    tracing::info!(owner = %ledger.owner(), "ledger deployed");
    ledger
}

fn confirmed(receipt: &Receipt) {
    tracing::debug!(height = receipt.height, event = %receipt.event, "confirmed");
}

fn plural(count: u64) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// The demo flow: add a book, list what is available, borrow it, check the
/// loan flag, return it, report availability. `holder` borrows and returns;
/// it defaults to the owner.
pub fn run_book_interactions(
    ledger: &mut Ledger,
    book_name: &str,
    book_copies: u64,
    holder: Option<Identity>,
) -> Result<()> {
    let owner = ledger.owner().clone();
    let holder = holder.unwrap_or_else(|| owner.clone());

    let receipt = ledger
        .add_book(&owner, book_name, book_copies)
        .with_context(|| format!("adding {book_name:?}"))?;
    confirmed(&receipt);
    println!(
        "1. Added {book_copies} unit{} of the {book_name} book to the library.",
        plural(book_copies)
    );

    let available = all_books(ledger)?
        .into_iter()
        .filter(Book::is_available)
        .collect::<Vec<_>>();
    println!(
        "2. List of the available books in the library: {}",
        serde_json::to_string_pretty(&available)?
    );

    let receipt = ledger
        .borrow_book(&holder, book_name)
        .with_context(|| format!("borrowing {book_name:?}"))?;
    confirmed(&receipt);
    println!("3. Borrowed the {book_name} book.");

    let key = Ledger::normalize(book_name)?;
    println!(
        "4. Is the {book_name} borrowed: {}",
        ledger.is_borrowed(&holder, &key)
    );

    let receipt = ledger
        .return_book(&holder, book_name)
        .with_context(|| format!("returning {book_name:?}"))?;
    confirmed(&receipt);
    println!("5. The borrowed {book_name} book is now returned.");

    let copies = ledger.get_book(book_name)?.copies;
    if copies > 0 {
        println!(
            "6. The {book_name} book is available. The library has {copies} unit{} in stock.",
            plural(copies)
        );
    } else {
        println!("6. The {book_name} book is not available.");
    }
    Ok(())
}

/// Pages through the registry by index, the way an outside caller that
/// knows no names has to.
pub fn all_books(ledger: &Ledger) -> Result<Vec<Book>> {
    let mut books = Vec::with_capacity(ledger.number_of_books());
    for index in 0..ledger.number_of_books() {
        let key = ledger.book_key_at(index)?;
        let book = ledger
            .get_book_by_key(&key)
            .with_context(|| format!("registry key {key} has no book"))?;
        books.push(book.clone());
    }
    Ok(books)
}
