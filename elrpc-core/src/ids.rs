use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier tying a call frame to its reply. Non-zero, unique for the
/// lifetime of the process, shared by every peer in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(u64);

impl Uid {
    pub fn new(value: u64) -> Self {
        Uid(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Uid {
    fn from(value: u64) -> Self {
        Uid::new(value)
    }
}

/// Monotonic uid source. The first allocated uid is 1; zero is never
/// handed out.
pub struct UidAllocator {
    next: AtomicU64,
}

impl UidAllocator {
    pub const fn new() -> Self {
        UidAllocator {
            next: AtomicU64::new(1),
        }
    }

    pub fn allocate(&self) -> Uid {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        Uid::new(id)
    }

    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for UidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_UIDS: UidAllocator = UidAllocator::new();

/// Allocate a uid from the process-wide counter.
pub fn next_uid() -> Uid {
    GLOBAL_UIDS.allocate()
}
