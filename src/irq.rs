use core::sync::atomic::{AtomicU8, Ordering};

const FREE: u8 = 0;
const HELD: u8 = 1;
const DISABLED: u8 = 2;

/// Mutual exclusion between an in-flight bus-interrupt dispatch and a caller
/// disabling interrupts.
///
/// The lock is a tri-state: free, held while the interrupt callback is
/// running the upper-layer handler, or disabled while interrupts are being
/// torn down. All state lives in a single atomic, so one `IrqLock` can be
/// shared by reference between the request path and the platform's interrupt
/// callback (a `static` works for callbacks that need `'static`).
///
/// Valid transitions are free → held → free (dispatch) and free → disabled
/// → free (explicit disable); `wait_and_disable` never passes through an
/// intermediate free state once a dispatch has finished.
pub struct IrqLock {
    state: AtomicU8,
}

impl IrqLock {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(FREE),
        }
    }

    /// Runs the upper-layer interrupt handler under the held state.
    ///
    /// Does nothing while interrupts are disabled. The caller must not hold
    /// any bus-session lock across `isr`; the handler is expected to issue
    /// its own bus commands.
    pub fn dispatch<F: FnOnce()>(&self, isr: F) {
        if self
            .state
            .compare_exchange(FREE, HELD, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        isr();

        // This store is the wake for a waiter in `wait_and_disable`.
        self.state.store(FREE, Ordering::Release);
    }

    /// Blocks until no dispatch is in flight, then moves straight from free
    /// to disabled so no new dispatch can start in between.
    pub fn wait_and_disable(&self) {
        loop {
            match self
                .state
                .compare_exchange(FREE, DISABLED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(HELD) => core::hint::spin_loop(),
                // Already disabled
                Err(_) => return,
            }
        }
    }

    /// Returns the lock to free; new dispatches may start immediately.
    pub fn reset(&self) {
        self.state.store(FREE, Ordering::Release);
    }

    pub fn is_disabled(&self) -> bool {
        self.state.load(Ordering::Acquire) == DISABLED
    }
}

impl Default for IrqLock {
    fn default() -> Self {
        Self::new()
    }
}
