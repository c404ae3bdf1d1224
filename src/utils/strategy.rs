//! Ordered fallback extraction

use tracing::debug;

/// A named way of extracting `T` from a context
pub type Strategy<C, T> = (&'static str, fn(&C) -> Option<T>);

/// Try each strategy in order and return the first success
pub fn first_success<C, T>(what: &str, context: &C, strategies: &[Strategy<C, T>]) -> Option<T> {
    for (name, strategy) in strategies {
        if let Some(value) = strategy(context) {
            debug!("{} found via {}", what, name);
            return Some(value);
        }
        debug!("{} not found via {}", what, name);
    }
    None
}
