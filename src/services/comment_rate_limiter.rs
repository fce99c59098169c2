use crate::config::AppConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Sliding-window limiter on comments per user. Each user's timestamps sit
/// behind one map entry, so prune, check and append for the same user never
/// interleave.
#[derive(Debug, Clone)]
pub struct CommentRateLimiter {
    windows: Arc<DashMap<i32, VecDeque<DateTime<Utc>>>>,
    limit: usize,
    window: Duration,
}

impl CommentRateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            limit,
            window,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.comments_per_window, config.comment_window())
    }

    pub fn try_acquire(&self, user_id: i32) -> bool {
        self.try_acquire_at(user_id, Utc::now())
    }

    /// Records a comment at `now` if fewer than `limit` comments fall inside
    /// the trailing window. Returns whether the comment is allowed.
    pub fn try_acquire_at(&self, user_id: i32, now: DateTime<Utc>) -> bool {
        let window_start = now - self.window;
        let mut timestamps = self.windows.entry(user_id).or_default();

        while timestamps.front().is_some_and(|ts| *ts < window_start) {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.limit {
            tracing::warn!(
                "Comment rate limit hit for user {} ({} in window)",
                user_id,
                timestamps.len()
            );
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Gives back a slot taken by [`try_acquire_at`](Self::try_acquire_at)
    /// at `at`, for a comment that was never stored.
    pub fn release(&self, user_id: i32, at: DateTime<Utc>) {
        if let Some(mut timestamps) = self.windows.get_mut(&user_id)
            && let Some(pos) = timestamps.iter().rposition(|ts| *ts == at)
        {
            timestamps.remove(pos);
        }
    }

    pub fn count_in_window_at(&self, user_id: i32, now: DateTime<Utc>) -> usize {
        let window_start = now - self.window;
        self.windows
            .get(&user_id)
            .map(|ts| ts.iter().filter(|t| **t >= window_start).count())
            .unwrap_or(0)
    }

    /// Drops users whose every timestamp has left the window.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - self.window;
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            while timestamps.front().is_some_and(|ts| *ts < window_start) {
                timestamps.pop_front();
            }
            !timestamps.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.len()
    }
}
