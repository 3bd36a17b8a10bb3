use lock_protocol::Xid;

/// Per-lock client-side state. Unlike the coordinator, this table needs a transient
/// in-flight state (`Acquiring`) and a post-revoke wind-down state (`Releasing`) that
/// the server side never sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
	/// Unknown to this client; nothing cached, nothing in flight.
	None,
	/// Held by this client, but no local thread currently owns it.
	Free,
	/// Held by this client and owned by exactly one local thread.
	Locked,
	/// An ACQUIRE is in flight, or the lock is being awaited locally.
	Acquiring,
	/// A revoke was received; will send RELEASE once the current local holder finishes.
	Releasing,
}

/// One lock's worth of client cache bookkeeping, guarded by the cache's single mutex.
#[derive(Debug, Clone)]
pub struct ClientLockEntry {
	pub local_state: LocalState,
	/// Set when a REVOKE arrives while `Locked` or `Acquiring`; drained on next release.
	pub revoked_pending: bool,
	/// Number of local threads blocked on this lock via `Cache::acquire`.
	pub waiting: u32,
	/// Last xid used for this lock on this client.
	pub xid: Xid,
}

impl ClientLockEntry {
	pub(crate) fn new() -> Self {
		Self {
			local_state: LocalState::None,
			revoked_pending: false,
			waiting: 0,
			xid: Xid::new(0),
		}
	}
}

impl Default for ClientLockEntry {
	fn default() -> Self {
		Self::new()
	}
}
