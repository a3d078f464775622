//! Rate limiting module to keep one client from flooding the router

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// Counter for one key inside its current window
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: Instant,
}

struct LimiterState {
    enabled: bool,
    windows: HashMap<String, Window>,
}

/// Fixed-window message limiter keyed by client.
/// Bursts across a window boundary are accepted; the window is not sliding.
pub struct RateLimiter {
    state: RwLock<LimiterState>,
    max_messages: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration, enabled: bool) -> Self {
        Self {
            state: RwLock::new(LimiterState { enabled, windows: HashMap::new() }),
            max_messages,
            window,
        }
    }

    /// Count one message from `key` and report whether it may proceed
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.write().await;
        if !state.enabled {
            return true;
        }

        match state.windows.get_mut(key) {
            Some(window) if now <= window.resets_at => {
                if window.count < self.max_messages {
                    window.count += 1;
                    true
                } else {
                    false
                }
            }
            _ => {
                state
                    .windows
                    .insert(key.to_string(), Window { count: 1, resets_at: now + self.window });
                true
            }
        }
    }

    /// Forget the window of `key`
    pub async fn reset(&self, key: &str) {
        self.state.write().await.windows.remove(key);
    }

    /// Messages `key` may still send in its current window
    pub async fn remaining(&self, key: &str) -> u32 {
        let state = self.state.read().await;
        if !state.enabled {
            return self.max_messages;
        }

        match state.windows.get(key) {
            Some(window) if Instant::now() <= window.resets_at => {
                self.max_messages.saturating_sub(window.count)
            }
            _ => self.max_messages,
        }
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.state.write().await.enabled = enabled;
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.enabled
    }

    /// Drop every window that has already expired
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.write().await;
        let before = state.windows.len();
        state.windows.retain(|_, window| window.resets_at >= now);
        before - state.windows.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.state.read().await.windows.len()
    }

    /// Sweep expired windows once per window interval until `shutdown` flips
    pub fn start_cleanup_task(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.window);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let purged = self.cleanup_expired().await;
                        if purged > 0 {
                            debug!("Rate limiter purged {} expired windows", purged);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Rate limiter cleanup task stopped");
        })
    }
}
