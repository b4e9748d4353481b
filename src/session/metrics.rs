//! Lock-free activity counters exposed through [`Session::metrics`](super::Session::metrics).

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for session activity.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	authentications: AtomicU64,
	refresh_attempts: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_failures: AtomicU64,
	persist_failures: AtomicU64,
}
impl SessionMetrics {
	/// Returns the number of successful password sign-ins.
	pub fn authentications(&self) -> u64 {
		self.authentications.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests sent to the token endpoint.
	///
	/// Callers that reuse a pair installed by a concurrent refresh are not counted.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests that produced a new pair.
	pub fn refresh_successes(&self) -> u64 {
		self.refresh_successes.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh requests that failed.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of backend writes/deletes that failed or timed out.
	pub fn persist_failures(&self) -> u64 {
		self.persist_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_authentication(&self) {
		self.authentications.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_success(&self) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_persist_failure(&self) {
		self.persist_failures.fetch_add(1, Ordering::Relaxed);
	}
}
