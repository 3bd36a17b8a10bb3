//! The seams the coordinator and the cache are written against instead of a concrete
//! network stack. The real RPC substrate (at-least-once delivery, a correlation id on
//! every call) is out of scope for this core; these traits are the whole of what it
//! needs to provide.

use lock_protocol::{ClientId, LockId, Status, Xid};
use std::sync::Arc;

/// The server-side RPC surface, called by clients.
pub trait ServerRpc: Send + Sync {
	/// Always returns `Status::Retry`; the real grant arrives later as a `ClientRpc::retry` call.
	fn acquire(&self, lid: LockId, client: ClientId, xid: Xid) -> Status;
	fn release(&self, lid: LockId, client: ClientId, xid: Xid) -> Status;
}

/// The client-side RPC surface, called by the server coordinator.
pub trait ClientRpc: Send + Sync {
	fn revoke(&self, lid: LockId, xid: Xid) -> Status;
	fn retry(&self, lid: LockId, xid: Xid, wait: bool) -> Status;
}

/// Queried by the coordinator's sender thread before every outbound transmission;
/// a replica that is not primary must stay silent.
pub trait AmIPrimary: Send + Sync {
	fn am_i_primary(&self) -> bool;
}

/// Resolves a `client_id` (an RPC bind address) to a callable handle. The coordinator
/// only ever learns addresses from inbound `acquire`/`release` calls; it never dials
/// out to an address it cannot look up here.
pub trait ClientDirectory: Send + Sync {
	fn client(&self, id: &ClientId) -> Option<Arc<dyn ClientRpc>>;
}

/// Optional hook invoked by the cache just before it sends a `RELEASE`, so a caller can
/// flush state that depends on still holding the lock.
pub trait LockReleaseUser: Send + Sync {
	fn do_release(&self, lid: LockId);
}
