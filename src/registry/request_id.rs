//! Monotonic request id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates request ids of the form `"<name>-<n>"`.
///
/// One counter is shared by methods and subscriptions, starts at 1 and never
/// repeats for the lifetime of a session.
///
/// # Examples
///
/// ```
/// use ddpwire::registry::RequestIdAllocator;
///
/// let ids = RequestIdAllocator::default();
/// assert_eq!(ids.next_id("todos"), "todos-1");
/// assert_eq!(ids.next_id("echo"), "echo-2");
/// ```
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl RequestIdAllocator {
    /// Allocate the next id for `name`.
    pub fn next_id(&self, name: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{name}-{n}")
    }

    /// Number of ids issued so far.
    #[must_use]
    pub fn issued(&self) -> u64 { self.next.load(Ordering::Relaxed) - 1 }
}
