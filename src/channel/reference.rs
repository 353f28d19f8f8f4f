//! Message refs
//!
//! Every request frame carries a ref the server echoes in its reply. One
//! counter is shared by all sessions of a client, so refs keep increasing
//! across reconnects until the counter wraps.

use std::sync::atomic::{AtomicI64, Ordering};

/// Wrap-safe, monotonically increasing ref generator.
#[derive(Debug, Default)]
pub struct RefCounter {
    last: AtomicI64,
}

impl RefCounter {
    /// A fresh counter. The first ref is `"1"`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter whose last issued value was `last`.
    pub fn starting_at(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    /// Next ref, string encoded.
    pub fn next_ref(&self) -> String {
        self.next_value().to_string()
    }

    /// Next ref value. Wraps to zero instead of overflowing.
    pub fn next_value(&self) -> i64 {
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(successor(last)));
        // The closure never declines, so both arms carry the previous value.
        match previous {
            Ok(last) | Err(last) => successor(last),
        }
    }
}

fn successor(last: i64) -> i64 {
    last.checked_add(1).unwrap_or(0)
}
