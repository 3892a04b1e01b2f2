use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) > length
    }
}

/// Fixed-window counter per source key.
///
/// State is process-local and lost on restart.
pub struct WindowLimiter {
    ceiling: u32,
    length: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl WindowLimiter {
    pub fn new(ceiling: u32, length: Duration) -> Self {
        Self {
            ceiling,
            length,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Take one slot for `source`. On rejection returns how long until the
    /// current window expires.
    pub fn try_acquire(&self, source: &str, now: Instant) -> Result<(), Duration> {
        let mut windows = self.windows();
        match windows.get_mut(source) {
            Some(window) if !window.expired(now, self.length) => {
                if window.count >= self.ceiling {
                    let elapsed = now.saturating_duration_since(window.started);
                    return Err(self.length.saturating_sub(elapsed));
                }
                window.count += 1;
            }
            _ => {
                windows.insert(
                    source.to_string(),
                    Window {
                        started: now,
                        count: 1,
                    },
                );
            }
        }
        Ok(())
    }

    /// Give back a slot taken by [`Self::try_acquire`] for a report that was
    /// not counted after all.
    pub fn release(&self, source: &str) {
        let mut windows = self.windows();
        match windows.get_mut(source) {
            Some(window) if window.count > 1 => {
                window.count -= 1;
            }
            Some(_) => {
                windows.remove(source);
            }
            None => {}
        }
    }

    /// Drop expired windows. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut windows = self.windows();
        let before = windows.len();
        windows.retain(|_, window| !window.expired(now, self.length));
        before - windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        match self.windows.lock() {
            Ok(windows) => windows,
            Err(poisoned) => {
                tracing::warn!("rate window lock poisoned; recovering");
                poisoned.into_inner()
            }
        }
    }
}
