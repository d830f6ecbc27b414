//! One-time passcodes for phone verification.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{AppError, AppResult};

/// Ephemeral key-value storage with expiry.
pub trait OtpStore: Send + Sync {
    fn put(&self, key: &str, code: String, expires_at: DateTime<Utc>);

    /// Remove and return the entry. Codes are single use.
    fn take(&self, key: &str) -> Option<(String, DateTime<Utc>)>;
}

#[derive(Default)]
pub struct MemoryOtpStore {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OtpStore for MemoryOtpStore {
    fn put(&self, key: &str, code: String, expires_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        entries.retain(|_, (_, expiry)| *expiry > now);
        entries.insert(key.to_string(), (code, expires_at));
    }

    fn take(&self, key: &str) -> Option<(String, DateTime<Utc>)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }
}

pub struct OtpService<'a> {
    store: &'a dyn OtpStore,
    ttl: Duration,
}

impl<'a> OtpService<'a> {
    pub fn new(store: &'a dyn OtpStore, ttl_seconds: i64) -> Self {
        Self {
            store,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Generate a six digit code for `key`, replacing any pending one.
    pub fn issue(&self, key: &str) -> String {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.store.put(key, code.clone(), Utc::now() + self.ttl);
        code
    }

    pub fn verify(&self, key: &str, code: &str) -> AppResult<()> {
        self.verify_at(key, code, Utc::now())
    }

    pub fn verify_at(&self, key: &str, code: &str, now: DateTime<Utc>) -> AppResult<()> {
        let (expected, expires_at) = self
            .store
            .take(key)
            .ok_or_else(|| AppError::Unauthorized("No pending verification code".to_string()))?;

        if now >= expires_at {
            return Err(AppError::Unauthorized("Verification code expired".to_string()));
        }
        if expected != code.trim() {
            return Err(AppError::Unauthorized("Invalid verification code".to_string()));
        }
        Ok(())
    }
}
