// self
use crate::{
	_prelude::*,
	auth::ProfileId,
	obs::{FlowKind, StoreOp},
	store::StoreError,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by session flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("wealthsimple_session.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `warn` event for a backend failure the session chose to tolerate.
pub fn warn_store_failure(backend: &str, op: StoreOp, profile: &ProfileId, error: &StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(
			backend,
			op = op.as_str(),
			profile = profile.as_ref(),
			error = %error,
			"Secret store operation failed; continuing."
		);
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (backend, op, profile, error);
	}
}

/// Emits a `debug` event describing a state transition.
pub fn debug_transition(profile: &ProfileId, from: &'static str, to: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(profile = profile.as_ref(), from, to, "Session state changed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (profile, from, to);
	}
}

/// Emits a `debug` event when an API call is retried after the bearer token was rejected.
pub fn debug_unauthorized_retry(operation: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(operation, "API rejected the bearer token; refreshing once and retrying.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = operation;
	}
}
