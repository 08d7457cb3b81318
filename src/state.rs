use crate::orderbook::{shared_book, SharedBook};

/// Shared application state: the order book behind its reader-writer lock
/// and the instrument code this server trades.
#[derive(Clone)]
pub struct AppState {
    pub book: SharedBook,
    pub market: String,
}

impl AppState {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            book: shared_book(),
            market: market.into(),
        }
    }
}
