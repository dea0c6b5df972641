//! In-memory report cache with a fixed TTL

use super::{AiReport, AiReportRequest};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    inserted: Instant,
    report: AiReport,
}

#[derive(Debug)]
pub struct ReportCache {
    ttl: Duration,
    entries: HashMap<String, Entry>,
}

impl ReportCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// SHA-256 hex digest of the serialized request
    pub fn key_for(request: &AiReportRequest) -> String {
        let bytes = serde_json::to_vec(request).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    /// Fresh entry for `key`, if any
    pub fn get(&self, key: &str) -> Option<AiReport> {
        self.entries
            .get(key)
            .filter(|e| e.inserted.elapsed() < self.ttl)
            .map(|e| e.report.clone())
    }

    /// Store a report and drop anything expired
    pub fn insert(&mut self, key: String, report: AiReport) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.inserted.elapsed() < ttl);
        self.entries.insert(
            key,
            Entry {
                inserted: Instant::now(),
                report,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
