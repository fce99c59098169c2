use crate::config::AppConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    failures: u32,
    first_failure: DateTime<Utc>,
}

/// Failed-login counter per client address. The window opens at the first
/// failure; once it has passed the counter starts from zero again.
#[derive(Debug, Clone)]
pub struct LoginAttemptGuard {
    attempts: Arc<DashMap<String, AttemptRecord>>,
    max_attempts: u32,
    block: Duration,
}

impl LoginAttemptGuard {
    pub fn new(max_attempts: u32, block: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            block,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.max_login_attempts, config.login_block())
    }

    fn expired(&self, record: &AttemptRecord, now: DateTime<Utc>) -> bool {
        now - record.first_failure >= self.block
    }

    pub fn is_blocked(&self, address: &str) -> bool {
        self.is_blocked_at(address, Utc::now())
    }

    pub fn is_blocked_at(&self, address: &str, now: DateTime<Utc>) -> bool {
        self.attempts
            .remove_if(address, |_, record| self.expired(record, now));
        self.attempts
            .get(address)
            .is_some_and(|record| record.failures >= self.max_attempts)
    }

    pub fn login_failed(&self, address: &str) {
        self.login_failed_at(address, Utc::now())
    }

    pub fn login_failed_at(&self, address: &str, now: DateTime<Utc>) {
        let mut record = self
            .attempts
            .entry(address.to_string())
            .or_insert(AttemptRecord {
                failures: 0,
                first_failure: now,
            });

        if self.expired(&record, now) {
            record.failures = 0;
            record.first_failure = now;
        }

        record.failures += 1;
        if record.failures == self.max_attempts {
            tracing::warn!(
                "🔒 Address {} blocked after {} failed logins",
                address,
                record.failures
            );
        }
    }

    pub fn login_succeeded(&self, address: &str) {
        self.attempts.remove(address);
    }

    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.attempts.len();
        self.attempts
            .retain(|_, record| now - record.first_failure < self.block);
        before.saturating_sub(self.attempts.len())
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }
}
