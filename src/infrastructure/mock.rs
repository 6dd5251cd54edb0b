use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::infrastructure::database::{DatabasePing, StoreError};
use crate::infrastructure::probe::{HttpProbe, ProbeError};

/// Mock database whose ping result is fixed at construction. Counts pings.
#[derive(Clone)]
pub struct MockDatabase {
    healthy: Arc<AtomicBool>,
    pings: Arc<AtomicUsize>,
}

impl MockDatabase {
    pub fn healthy() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            pings: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        let db = Self::healthy();
        db.healthy.store(false, Ordering::SeqCst);
        db
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabasePing for MockDatabase {
    async fn ping(&self) -> Result<(), StoreError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Mock probe that records every call. URLs containing a registered fragment
/// get the canned outcome; everything else succeeds.
#[derive(Clone, Default)]
pub struct MockProbe {
    rules: Arc<Mutex<Vec<(String, Result<(), ProbeError>)>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url_fragment: &str, outcome: Result<(), ProbeError>) -> Self {
        self.rules.lock().unwrap().push((url_fragment.to_string(), outcome));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpProbe for MockProbe {
    async fn get(&self, url: &str, headers: &[(&str, &str)], timeout: Duration) -> Result<(), ProbeError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            timeout,
        });

        let rules = self.rules.lock().unwrap();
        rules
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(Ok(()))
    }
}
