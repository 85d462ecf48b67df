//! Rolling-window auxiliary trackers
//!
//! Each tracker keeps per-key event windows pruned lazily on both read and
//! write. Windows are bounded in length as well as time so a hot key cannot
//! grow without limit.

use dashmap::DashMap;
use nids_common::FlowKey;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Hard cap on events retained per key
const MAX_EVENTS_PER_KEY: usize = 4096;

fn prune_front(window: &mut VecDeque<Instant>, horizon: Duration, now: Instant) {
    while let Some(&front) = window.front() {
        if now.duration_since(front) > horizon {
            window.pop_front();
        } else {
            break;
        }
    }
}

/// Failed-login attempts per source IP (default window: 1 h)
pub struct LoginAttemptTracker {
    window: Duration,
    attempts: DashMap<IpAddr, VecDeque<Instant>>,
}

impl LoginAttemptTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, attempts: DashMap::new() }
    }

    /// Record one failed login for this source
    pub fn record_failed(&self, ip: IpAddr) {
        let now = Instant::now();
        let mut entry = self.attempts.entry(ip).or_default();
        prune_front(&mut entry, self.window, now);
        if entry.len() < MAX_EVENTS_PER_KEY {
            entry.push_back(now);
        }
    }

    /// Failed logins within the window
    pub fn count(&self, ip: IpAddr) -> usize {
        let now = Instant::now();
        match self.attempts.get_mut(&ip) {
            Some(mut entry) => {
                prune_front(&mut entry, self.window, now);
                entry.len()
            }
            None => 0,
        }
    }
}

impl Default for LoginAttemptTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

/// Bytes-per-second per flow (default window: 60 s)
pub struct FlowRateTracker {
    window: Duration,
    flows: DashMap<FlowKey, VecDeque<(Instant, u64)>>,
}

impl FlowRateTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, flows: DashMap::new() }
    }

    /// Record bytes transferred on this flow
    pub fn record(&self, key: FlowKey, bytes: u64) {
        let now = Instant::now();
        let mut entry = self.flows.entry(key).or_default();
        while let Some(&(front, _)) = entry.front() {
            if now.duration_since(front) > self.window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < MAX_EVENTS_PER_KEY {
            entry.push_back((now, bytes));
        }
    }

    /// Bytes per second over the window; 0.0 when elapsed time is zero
    pub fn rate(&self, key: &FlowKey) -> f64 {
        let now = Instant::now();
        match self.flows.get_mut(key) {
            Some(mut entry) => {
                while let Some(&(front, _)) = entry.front() {
                    if now.duration_since(front) > self.window {
                        entry.pop_front();
                    } else {
                        break;
                    }
                }
                let Some(&(first, _)) = entry.front() else {
                    return 0.0;
                };
                let elapsed = now.duration_since(first).as_secs_f64();
                if elapsed <= 0.0 {
                    return 0.0;
                }
                let total: u64 = entry.iter().map(|&(_, b)| b).sum();
                total as f64 / elapsed
            }
            None => 0.0,
        }
    }
}

impl Default for FlowRateTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Access events per second per source IP (default window: 5 min)
pub struct AccessFrequencyTracker {
    window: Duration,
    accesses: DashMap<IpAddr, VecDeque<Instant>>,
}

impl AccessFrequencyTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, accesses: DashMap::new() }
    }

    /// Record one access from this source
    pub fn record(&self, ip: IpAddr) {
        let now = Instant::now();
        let mut entry = self.accesses.entry(ip).or_default();
        prune_front(&mut entry, self.window, now);
        if entry.len() < MAX_EVENTS_PER_KEY {
            entry.push_back(now);
        }
    }

    /// Accesses per second: (n - 1) / span, 0.0 below two events
    pub fn rate(&self, ip: IpAddr) -> f64 {
        let now = Instant::now();
        match self.accesses.get_mut(&ip) {
            Some(mut entry) => {
                prune_front(&mut entry, self.window, now);
                if entry.len() < 2 {
                    return 0.0;
                }
                let (Some(&first), Some(&last)) = (entry.front(), entry.back()) else {
                    return 0.0;
                };
                let span = last.duration_since(first).as_secs_f64();
                if span <= 0.0 {
                    return 0.0;
                }
                (entry.len() - 1) as f64 / span
            }
            None => 0.0,
        }
    }
}

impl Default for AccessFrequencyTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
