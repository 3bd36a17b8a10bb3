use lock_protocol::wire::WireError;
use thiserror::Error;

/// Errors the coordinator can surface. Duplicates, stale xids, and undeliverable RPCs
/// are handled silently inside the state machine and never reach this type; everything
/// here is either a metrics-registration failure at startup or a corrupted replication
/// snapshot, both of which a caller should treat as fatal.
#[derive(Error, Debug)]
pub enum CoordinatorError {
	#[error("metrics registration failed: {0}")]
	Metrics(#[from] prometheus::Error),

	#[error("state transfer truncated: {0}")]
	Truncated(&'static str),

	#[error("state transfer contained a corrupt string length prefix: {0}")]
	BadStringLength(u32),

	#[error("state transfer contained an unknown local_state discriminant: {0}")]
	BadLocalState(i32),
}

impl From<WireError> for CoordinatorError {
	fn from(err: WireError) -> Self {
		match err {
			WireError::Truncated(what) => CoordinatorError::Truncated(what),
			WireError::BadStringLength(len) => CoordinatorError::BadStringLength(len),
		}
	}
}
