// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Wait-event reporting for file I/O
//!
//! Each backend wraps its blocking calls in a [`WaitEventGuard`] so that
//! telemetry can attribute time to data file reads and writes. State is kept
//! per thread, matching the one-session-per-thread model.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitEvent {
    DataFileRead,
    DataFileWrite,
    DataFileSync,
    DfsConnect,
}

impl WaitEvent {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            WaitEvent::DataFileRead => "DataFileRead",
            WaitEvent::DataFileWrite => "DataFileWrite",
            WaitEvent::DataFileSync => "DataFileSync",
            WaitEvent::DfsConnect => "DfsConnect",
        }
    }
}

/// Accumulated time spent in one wait event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitStats {
    pub count: u64,
    pub total: Duration,
}

thread_local! {
    static CURRENT: Cell<Option<WaitEvent>> = const { Cell::new(None) };
    static STATS: RefCell<HashMap<WaitEvent, WaitStats>> = RefCell::new(HashMap::new());
}

/// Marks the current thread as waiting on `event` until dropped
pub struct WaitEventGuard {
    event: WaitEvent,
    previous: Option<WaitEvent>,
    start: Instant,
}

#[must_use]
pub fn report_wait_start(event: WaitEvent) -> WaitEventGuard {
    let previous = CURRENT.with(|current| current.replace(Some(event)));
    WaitEventGuard {
        event,
        previous,
        start: Instant::now(),
    }
}

impl Drop for WaitEventGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        CURRENT.with(|current| current.set(self.previous));
        STATS.with(|stats| {
            let mut stats = stats.borrow_mut();
            let entry = stats.entry(self.event).or_default();
            entry.count += 1;
            entry.total += elapsed;
        });
    }
}

/// The event this thread is waiting on right now
#[must_use]
pub fn current_wait_event() -> Option<WaitEvent> {
    CURRENT.with(Cell::get)
}

#[must_use]
pub fn wait_event_stats(event: WaitEvent) -> WaitStats {
    STATS.with(|stats| stats.borrow().get(&event).copied().unwrap_or_default())
}

pub fn reset_wait_event_stats() {
    STATS.with(|stats| stats.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_sets_and_restores_current_event() {
        reset_wait_event_stats();
        assert_eq!(current_wait_event(), None);
        {
            let _read = report_wait_start(WaitEvent::DataFileRead);
            assert_eq!(current_wait_event(), Some(WaitEvent::DataFileRead));
            {
                let _connect = report_wait_start(WaitEvent::DfsConnect);
                assert_eq!(current_wait_event(), Some(WaitEvent::DfsConnect));
            }
            assert_eq!(current_wait_event(), Some(WaitEvent::DataFileRead));
        }
        assert_eq!(current_wait_event(), None);
        assert_eq!(wait_event_stats(WaitEvent::DataFileRead).count, 1);
        assert_eq!(wait_event_stats(WaitEvent::DfsConnect).count, 1);
        assert_eq!(wait_event_stats(WaitEvent::DataFileWrite).count, 0);
    }
}
