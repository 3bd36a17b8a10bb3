use thiserror::Error;

/// Cache-level errors. Transient RPC failure and stale messages are handled inside the
/// state machine itself (see `Cache::revoke_handler`/`retry_handler`) and never surface
/// here; this type exists for the few cases a caller must react to directly.
#[derive(Error, Debug)]
pub enum CacheError {
	#[error("the cache mutex was poisoned by a panicking holder")]
	Poisoned,

	#[error(transparent)]
	Transport(#[from] lock_transport::TransportError),
}
