//! Scoped interruption used to unblock a reentrant host call.

use std::marker::PhantomData;
use xacache_types::interruption;

/// Marks the current thread as interrupted for as long as the scope lives.
///
/// Dropping the scope restores whatever the flag was on entry, on every exit
/// path including unwinding. The scope is tied to the thread it was entered
/// on and cannot be sent elsewhere.
#[must_use = "the thread is only interrupted while the scope is alive"]
pub struct InterruptScope {
    was_interrupted: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl InterruptScope {
    /// Records the current flag and sets it.
    pub fn enter() -> Self {
        let was_interrupted = interruption::clear_interrupted();
        interruption::interrupt();
        Self {
            was_interrupted,
            _thread_bound: PhantomData,
        }
    }

    /// The flag value that will be restored on drop.
    pub const fn was_interrupted(&self) -> bool {
        self.was_interrupted
    }
}

impl Drop for InterruptScope {
    fn drop(&mut self) {
        interruption::set_interrupted(self.was_interrupted);
    }
}
