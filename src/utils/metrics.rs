//! Observability and Metrics
//!
//! Thread-safe counters for monitoring transport performance and health.
//! Uses atomic counters; all recording methods are safe to call from any
//! thread, including dispatcher callbacks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Metrics collector for transport operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions established
    pub sessions_total: AtomicU64,
    /// Currently active sessions
    pub sessions_active: AtomicU64,
    /// Version negotiations that found no shared version
    pub negotiation_failures: AtomicU64,
    /// Total packets sent
    pub packets_sent: AtomicU64,
    /// Total packets received
    pub packets_received: AtomicU64,
    /// Total content bytes sent (pre-encryption)
    pub bytes_sent: AtomicU64,
    /// Total content bytes received (post-decryption)
    pub bytes_received: AtomicU64,
    /// Payload encryptions performed
    pub payloads_encrypted: AtomicU64,
    /// Payload decryptions performed
    pub payloads_decrypted: AtomicU64,
    /// Decrypt-side integrity failures
    pub integrity_failures: AtomicU64,
    /// Protocol violations (oversized frames, bad headers)
    pub protocol_errors: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            negotiation_failures: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            payloads_encrypted: AtomicU64::new(0),
            payloads_decrypted: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Process-wide collector shared by sessions that were not handed a
    /// dedicated one.
    pub fn global() -> &'static Metrics {
        static GLOBAL: OnceLock<Metrics> = OnceLock::new();
        GLOBAL.get_or_init(Metrics::new)
    }

    /// Record a new session
    pub fn session_established(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session closed
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a failed version negotiation
    pub fn negotiation_failed(&self) {
        self.negotiation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a packet sent
    pub fn packet_sent(&self, content_bytes: u64) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(content_bytes, Ordering::Relaxed);
    }

    /// Record a packet received
    pub fn packet_received(&self, content_bytes: u64) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(content_bytes, Ordering::Relaxed);
    }

    /// Record a payload encryption
    pub fn payload_encrypted(&self) {
        self.payloads_encrypted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload decryption
    pub fn payload_decrypted(&self) {
        self.payloads_decrypted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decrypt-side integrity failure
    pub fn integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol violation
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Seconds since this collector was created
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
