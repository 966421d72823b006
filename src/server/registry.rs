//! Live session registry
//!
//! Tracks which destination keys are currently receiving data. Entries are
//! held by a [`SessionGuard`] and disappear when the guard drops.

use crate::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct SessionRegistry {
    live: DashMap<String, Instant>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` live until the returned guard drops
    pub fn register(self: &Arc<Self>, key: impl Into<String>) -> SessionGuard {
        let key = key.into();
        self.live.insert(key.clone(), Instant::now());
        metrics::session_opened();
        SessionGuard {
            registry: Arc::clone(self),
            key,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.live.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.live.contains_key(key)
    }

    /// How long `key` has been live
    pub fn age(&self, key: &str) -> Option<Duration> {
        self.live.get(key).map(|started| started.elapsed())
    }
}

/// Registration of one live session
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    key: String,
}

impl SessionGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.live.remove(&self.key).is_some() {
            metrics::session_closed();
        }
    }
}
