use lock_protocol::ClientId;
use thiserror::Error;

/// Transport-agnostic error type. The lock protocol itself tolerates transient RPC
/// failure (see the coordinator's sender thread), so this type only ever surfaces at
/// the directory-lookup boundary, not on the protocol's happy path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
	#[error("no route to client {0}")]
	UnknownClient(ClientId),
}

pub type Result<T> = std::result::Result<T, TransportError>;
