// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! This module defines the timeout watchdog of the solver: a timer thread
//! armed once per `solve()` call. When the deadline passes before the call
//! completes, the watchdog trips the shared abort flag the search loop polls;
//! when the call completes first, dropping the watchdog cancels the timer.
//! A watchdog that fires after its cancellation has no effect (the abort flag
//! is reset at the start of every call).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// The flag a watchdog trips and the search loop polls. The flag is owned by
/// the solver and shared with at most one live watchdog thread at a time.
pub type AbortFlag = Arc<Mutex<bool>>;

/// One armed timer. Dropping it cancels the timer on whatever exit path the
/// enclosing `solve()` call takes.
pub struct Watchdog {
    cancel: Sender<()>
}

impl Watchdog {
    /// Arms a watchdog that trips `flag` once `deadline` from now has passed,
    /// unless it is cancelled first.
    pub fn arm(deadline: Duration, flag: AbortFlag) -> Watchdog {
        let (cancel, expiry) = bounded::<()>(1);
        thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = expiry.recv_timeout(deadline) {
                *flag.lock() = true;
            }
            // cancelled (message or disconnect): fall through without a signal
        });
        Watchdog { cancel }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // best effort: the timer thread may already have fired and exited
        let _ = self.cancel.send(());
    }
}

// ############################################################################
// #### TESTS #################################################################
// ############################################################################

#[cfg(test)]
mod test_watchdog {
    use super::*;
    use std::time::Duration;

    #[test]
    fn the_flag_is_tripped_after_the_deadline() {
        let flag: AbortFlag = Arc::new(Mutex::new(false));
        let dog = Watchdog::arm(Duration::from_millis(10), Arc::clone(&flag));
        thread::sleep(Duration::from_millis(100));
        assert!(*flag.lock());
        drop(dog);
    }
    #[test]
    fn a_cancelled_watchdog_never_trips_the_flag() {
        let flag: AbortFlag = Arc::new(Mutex::new(false));
        let dog = Watchdog::arm(Duration::from_secs(3600), Arc::clone(&flag));
        drop(dog);
        thread::sleep(Duration::from_millis(20));
        assert!(!*flag.lock());
    }
}
