// src/ingest/window.rs
use crate::ingest::types::Window;

/// Chooses the next polling window. Pure: all state is passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowScheduler {
    pub initial_lookback_secs: u64,
    pub overlap_margin_secs: u64,
}

impl WindowScheduler {
    pub fn new(initial_lookback_secs: u64, overlap_margin_secs: u64) -> Self {
        Self {
            initial_lookback_secs,
            overlap_margin_secs,
        }
    }

    /// First call (`previous_end == None`) looks back `initial_lookback_secs`.
    /// Later calls restart `overlap_margin_secs` before the previous end, so
    /// every transaction lands in at least two consecutive windows.
    ///
    /// `end` never moves backwards, even if the clock does.
    pub fn next_window(&self, previous_end: Option<u64>, now: u64) -> Window {
        match previous_end {
            None => Window::new(now.saturating_sub(self.initial_lookback_secs), now),
            Some(prev) => {
                let end = now.max(prev);
                Window::new(prev.saturating_sub(self.overlap_margin_secs), end)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_window_uses_initial_lookback() {
        let s = WindowScheduler::new(1000, 40);
        assert_eq!(s.next_window(None, 5_000), Window { start: 4_000, end: 5_000 });
    }

    #[test]
    fn later_windows_overlap_previous_end() {
        let s = WindowScheduler::new(1000, 40);
        let w1 = s.next_window(None, 5_000);
        let w2 = s.next_window(Some(w1.end), 5_020);
        assert_eq!(w2, Window { start: 4_960, end: 5_020 });
        assert!(w2.start <= w1.end);
    }

    #[test]
    fn end_is_monotonic_under_clock_skew() {
        let s = WindowScheduler::new(1000, 40);
        let w = s.next_window(Some(5_000), 4_990);
        assert_eq!(w.end, 5_000);
        assert!(w.start <= w.end);
    }

    #[test]
    fn lookback_saturates_near_epoch() {
        let s = WindowScheduler::new(1000, 40);
        assert_eq!(s.next_window(None, 10), Window { start: 0, end: 10 });
        assert_eq!(s.next_window(Some(10), 30).start, 0);
    }
}
