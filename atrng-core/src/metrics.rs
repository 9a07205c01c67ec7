// SPDX-License-Identifier: MIT
//
// ATRNG Client: Entropy Contribution Library
// Copyright (c) 2025 ATRNG Client Contributors
//
// https://github.com/atdevs/atrng-client

//! Counters for connection, contribution and fetch activity

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared metrics collector
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Connection metrics
    connects_total: AtomicU64,
    connects_failed: AtomicU64,

    // Keepalive metrics
    keepalives_sent: AtomicU64,
    keepalive_bytes: AtomicU64,

    // Discard metrics
    flushes_total: AtomicU64,
    bytes_condensed: AtomicU64,
    batches_dropped: AtomicU64,
    last_flush: RwLock<Option<DateTime<Utc>>>,

    emits_failed: AtomicU64,

    // Fetch metrics
    fetches_total: AtomicU64,
    fetches_failed: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub connects_total: u64,
    pub connects_failed: u64,
    pub keepalives_sent: u64,
    pub keepalive_bytes: u64,
    pub flushes_total: u64,
    pub bytes_condensed: u64,
    pub batches_dropped: u64,
    pub last_flush: Option<DateTime<Utc>>,
    pub emits_failed: u64,
    pub fetches_total: u64,
    pub fetches_failed: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                connects_total: AtomicU64::new(0),
                connects_failed: AtomicU64::new(0),
                keepalives_sent: AtomicU64::new(0),
                keepalive_bytes: AtomicU64::new(0),
                flushes_total: AtomicU64::new(0),
                bytes_condensed: AtomicU64::new(0),
                batches_dropped: AtomicU64::new(0),
                last_flush: RwLock::new(None),
                emits_failed: AtomicU64::new(0),
                fetches_total: AtomicU64::new(0),
                fetches_failed: AtomicU64::new(0),
            }),
        }
    }

    // Connection metrics
    pub fn record_connect(&self) {
        self.inner.connects_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.inner.connects_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Keepalive metrics
    pub fn record_keepalive(&self, bytes: usize) {
        self.inner.keepalives_sent.fetch_add(1, Ordering::Relaxed);
        self.inner.keepalive_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    // Discard metrics
    pub fn record_flush(&self, bytes: usize) {
        self.inner.flushes_total.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes_condensed.fetch_add(bytes as u64, Ordering::Relaxed);
        *self.inner.last_flush.write() = Some(Utc::now());
    }

    pub fn record_batch_dropped(&self) {
        self.inner.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emit_failure(&self) {
        self.inner.emits_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Fetch metrics
    pub fn record_fetch(&self) {
        self.inner.fetches_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.inner.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let inner = &self.inner;

        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            connects_total: load(&inner.connects_total),
            connects_failed: load(&inner.connects_failed),
            keepalives_sent: load(&inner.keepalives_sent),
            keepalive_bytes: load(&inner.keepalive_bytes),
            flushes_total: load(&inner.flushes_total),
            bytes_condensed: load(&inner.bytes_condensed),
            batches_dropped: load(&inner.batches_dropped),
            last_flush: *inner.last_flush.read(),
            emits_failed: load(&inner.emits_failed),
            fetches_total: load(&inner.fetches_total),
            fetches_failed: load(&inner.fetches_failed),
        }
    }
}
