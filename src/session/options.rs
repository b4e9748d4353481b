//! Timing knobs for token refresh, endpoint requests, and backend calls.

// self
use crate::_prelude::*;

/// Timing knobs shared by every session operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
	/// Tokens closer than this to expiry are refreshed before being handed out.
	pub safety_margin: Duration,
	/// Deadline for each token endpoint request.
	pub request_timeout: Duration,
	/// Deadline for each individual backend read, write, or delete.
	pub persist_timeout: Duration,
}
impl SessionOptions {
	/// Default refresh safety margin.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(60);
	/// Default token endpoint deadline.
	pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);
	/// Default per-backend deadline.
	pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::seconds(2);

	/// Overrides the safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = clamp(margin);

		self
	}

	/// Overrides the request timeout; negative values clamp to zero.
	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = clamp(timeout);

		self
	}

	/// Overrides the per-backend timeout; negative values clamp to zero.
	pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
		self.persist_timeout = clamp(timeout);

		self
	}
}
impl Default for SessionOptions {
	fn default() -> Self {
		Self {
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
			persist_timeout: Self::DEFAULT_PERSIST_TIMEOUT,
		}
	}
}

fn clamp(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}
