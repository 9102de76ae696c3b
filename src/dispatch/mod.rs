//! Failure-tolerant dispatch of a single task to a single specialist.
//!
//! Guarantees: unknown capabilities fail fast and are never retried; each
//! attempt runs under a hard timeout that cancels the in-flight call; the
//! retry loop is strictly sequential; identical requests within the cache
//! validity window collapse into one in-flight call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::capability::{CapabilityRegistry, SpecialistReply, TaskRequest};
use crate::config::DispatchConfig;
use crate::error::{HelmsmanError, Result};

struct CacheEntry {
    reply: SpecialistReply,
    stored_at: Instant,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    cache_hits: AtomicU64,
    timeouts: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time dispatcher counters for operators.
#[derive(Debug, Clone, Copy)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub cache_hits: u64,
    pub timeouts: u64,
    pub failures: u64,
}

pub struct Dispatcher {
    registry: CapabilityRegistry,
    config: DispatchConfig,
    cache: DashMap<String, CacheEntry>,
    /// Per-fingerprint locks so concurrent identical requests collapse into
    /// one specialist call; the losers observe the winner's cached result.
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    semaphore: Arc<Semaphore>,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(registry: CapabilityRegistry, config: DispatchConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            registry,
            config,
            cache: DashMap::new(),
            in_flight: DashMap::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters: DispatchCounters::default(),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Dispatch with the configured timeout and attempt bound.
    pub async fn dispatch(&self, specialist: &str, task: &TaskRequest) -> Result<SpecialistReply> {
        self.dispatch_with(
            specialist,
            task,
            Duration::from_millis(self.config.timeout_ms),
            self.config.max_attempts,
        )
        .await
    }

    /// Dispatch one task to one specialist. `attempts` is the total number
    /// of tries, the first included.
    pub async fn dispatch_with(
        &self,
        specialist: &str,
        task: &TaskRequest,
        timeout: Duration,
        attempts: u32,
    ) -> Result<SpecialistReply> {
        let Some(worker) = self.registry.get(specialist) else {
            return Err(HelmsmanError::UnknownCapability(specialist.to_string()));
        };

        let fp = fingerprint(specialist, task);

        if let Some(reply) = self.cached(&fp) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(capability = %specialist, step_id = %task.step_id, "Dispatch served from cache");
            return Ok(reply);
        }

        let lock = self
            .in_flight
            .entry(fp.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent identical dispatch may have completed while we
        // waited for the lock.
        if let Some(reply) = self.cached(&fp) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(reply);
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("dispatch semaphore closed");

        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(timeout, worker.process(task)).await;

            let error = match outcome {
                // Timeout drops (cancels) the in-flight call and counts as
                // one failed attempt.
                Err(_) => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    HelmsmanError::DispatchTimeout {
                        specialist: specialist.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }
                }
                Ok(Err(e)) => e,
                Ok(Ok(reply)) if !reply.is_success() => HelmsmanError::Specialist(
                    reply.error.unwrap_or_else(|| "unspecified error".to_string()),
                ),
                Ok(Ok(reply)) => {
                    self.cache.insert(
                        fp.clone(),
                        CacheEntry {
                            reply: reply.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                    self.in_flight.remove(&fp);
                    debug!(
                        capability = %specialist,
                        step_id = %task.step_id,
                        attempt,
                        "Dispatch succeeded"
                    );
                    return Ok(reply);
                }
            };

            warn!(
                capability = %specialist,
                step_id = %task.step_id,
                attempt,
                max_attempts = attempts,
                error = %error,
                "Dispatch attempt failed"
            );

            if !error.is_retryable() {
                self.in_flight.remove(&fp);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                return Err(error);
            }
            last_error = Some(error);
        }

        self.in_flight.remove(&fp);
        self.counters.failures.fetch_add(1, Ordering::Relaxed);

        Err(HelmsmanError::DispatchFailed {
            specialist: specialist.to_string(),
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    fn cached(&self, fp: &str) -> Option<SpecialistReply> {
        let ttl = Duration::from_millis(self.config.cache_ttl_ms);
        // The read guard must drop before the stale entry is removed.
        let stale = match self.cache.get(fp) {
            Some(entry) if entry.stored_at.elapsed() < ttl => {
                return Some(entry.reply.clone());
            }
            Some(_) => true,
            None => false,
        };
        if stale {
            self.cache.remove(fp);
        }
        None
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

/// Cache key derived from the specialist name and task content. Context is
/// included so the same details with different inputs never collide.
pub fn fingerprint(specialist: &str, task: &TaskRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(specialist.as_bytes());
    hasher.update(b"\n");
    hasher.update(task.details.as_bytes());
    if !task.context.is_empty() {
        hasher.update(b"\n");
        hasher.update(
            serde_json::to_vec(&task.context).unwrap_or_default(),
        );
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stable() {
        let task = TaskRequest::new("s1", "summarize the report");
        assert_eq!(fingerprint("search", &task), fingerprint("search", &task));
    }

    #[test]
    fn test_fingerprint_varies_by_specialist_and_content() {
        let task = TaskRequest::new("s1", "summarize the report");
        let other = TaskRequest::new("s1", "summarize the memo");

        assert_ne!(fingerprint("search", &task), fingerprint("write", &task));
        assert_ne!(fingerprint("search", &task), fingerprint("search", &other));
    }

    #[test]
    fn test_fingerprint_includes_context() {
        let plain = TaskRequest::new("s1", "translate");
        let contextual =
            TaskRequest::new("s1", "translate").with_context("lang", "fr".into());
        assert_ne!(
            fingerprint("translate", &plain),
            fingerprint("translate", &contextual)
        );
    }
}
