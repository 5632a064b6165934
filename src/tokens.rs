use crate::models::DeviceId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a refresh replaces in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTarget {
    DeviceList,
    Metrics(DeviceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    pub target: RefreshTarget,
    pub seq: u64,
}

/// Latest request token per target. Only the most recently issued token for
/// a target is current; responses carrying an older one are stale.
///
/// Sequence numbers come from one counter shared by all targets, so a number
/// is never handed out twice and a dropped entry cannot bring an old token
/// back to life.
#[derive(Debug, Default)]
pub struct RequestTokens {
    next: AtomicU64,
    latest: DashMap<RefreshTarget, u64>,
}

impl RequestTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, target: RefreshTarget) -> RequestToken {
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        self.latest.insert(target, seq);
        RequestToken { target, seq }
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        self.latest
            .get(&token.target)
            .map(|seq| *seq == token.seq)
            .unwrap_or(false)
    }

    /// Makes every outstanding token for `target` stale and forgets the target.
    pub fn invalidate(&self, target: RefreshTarget) {
        self.latest.remove(&target);
    }

    /// Number of targets with an outstanding token.
    pub fn tracked(&self) -> usize {
        self.latest.len()
    }
}
