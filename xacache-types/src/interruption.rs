//! Per-thread interruption flag of the host runtime.
//!
//! Host calls that may block (for example fetching a cache that is still
//! delivering its start event) check this flag and return early instead of
//! waiting when it is set. The flag belongs to the calling thread only.

use std::cell::Cell;

thread_local! {
    static INTERRUPTED: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is flagged as interrupted.
pub fn is_interrupted() -> bool {
    INTERRUPTED.with(Cell::get)
}

/// Flags the current thread as interrupted.
pub fn interrupt() {
    INTERRUPTED.with(|flag| flag.set(true));
}

/// Clears the flag, returning its previous value.
pub fn clear_interrupted() -> bool {
    INTERRUPTED.with(|flag| flag.replace(false))
}

/// Sets the flag to `interrupted`.
pub fn set_interrupted(interrupted: bool) {
    INTERRUPTED.with(|flag| flag.set(interrupted));
}
