use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

// Upper bound on tracked clients. Reaching it forces a sweep, and clients
// that still do not fit are refused.
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    max_clients: usize,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self::with_capacity(limit, window, MAX_TRACKED_CLIENTS)
    }

    pub fn with_capacity(limit: u32, window: Duration, max_clients: usize) -> Self {
        Self {
            limit: limit.max(1),
            window,
            max_clients: max_clients.max(1),
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: &str) -> bool {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock();

        if !windows.contains_key(client) && windows.len() >= self.max_clients {
            let removed = sweep_expired(&mut windows, now);
            debug!("Rate limiter at capacity, swept {removed} windows");
            if windows.len() >= self.max_clients {
                warn!("Rate limiter full, refusing {client}");
                return false;
            }
        }

        match windows.get_mut(client) {
            Some(window) if now <= window.reset_at => {
                if window.count >= self.limit {
                    return false;
                }
                window.count += 1;
                true
            }
            _ => {
                windows.insert(
                    client.to_string(),
                    Window {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    pub fn sweep(&self) -> usize {
        sweep_expired(&mut self.windows.lock(), Instant::now())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }
}

fn sweep_expired(windows: &mut HashMap<String, Window>, now: Instant) -> usize {
    let before = windows.len();
    windows.retain(|_, window| now <= window.reset_at);
    before - windows.len()
}

pub fn spawn_sweep_task(limiter: Arc<RateLimiter>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            if removed > 0 {
                info!(
                    "Rate limiter sweep removed {} windows ({} tracked)",
                    removed,
                    limiter.tracked_clients()
                );
            }
        }
    });
}
