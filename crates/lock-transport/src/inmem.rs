//! A single-process transport used by the demo binary and by every test in the
//! coordinator and cache crates. It does no serialization: `Arc<dyn ClientRpc>` handles
//! are registered directly, and calls are plain function calls across threads. What it
//! does model is the two facts the protocol actually depends on: that a client is
//! reached by an address the server was told about, not by magic, and that a
//! non-primary replica must never answer an RPC.

use crate::error::{Result, TransportError};
use crate::traits::{AmIPrimary, ClientDirectory, ClientRpc};
use dashmap::DashMap;
use lock_protocol::ClientId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An in-memory client directory plus primary/backup flag.
///
/// Cloning is cheap; all clones share the same registry and flag.
#[derive(Clone, Default)]
pub struct InMemTransport {
	clients: Arc<DashMap<ClientId, Arc<dyn ClientRpc>>>,
	primary: Arc<AtomicBool>,
}

impl InMemTransport {
	/// Creates a transport that starts out primary, the common case for a single
	/// standalone coordinator.
	#[must_use]
	pub fn new() -> Self {
		Self {
			clients: Arc::new(DashMap::new()),
			primary: Arc::new(AtomicBool::new(true)),
		}
	}

	/// Registers (or replaces) the callable handle for `client`. Called once a client
	/// has issued at least one `acquire`/`release`, so the coordinator has an address to
	/// reach it at.
	pub fn register_client(&self, client: ClientId, handle: Arc<dyn ClientRpc>) {
		tracing::debug!(%client, "registering client route");
		self.clients.insert(client, handle);
	}

	pub fn unregister_client(&self, client: &ClientId) {
		tracing::debug!(%client, "removing client route");
		self.clients.remove(client);
	}

	/// Flips the primary flag. Used by tests that exercise the "stay silent unless
	/// primary" rule on the coordinator's sender thread.
	pub fn set_primary(&self, primary: bool) {
		self.primary.store(primary, Ordering::SeqCst);
	}

	pub fn client_count(&self) -> usize {
		self.clients.len()
	}
}

impl ClientDirectory for InMemTransport {
	fn client(&self, id: &ClientId) -> Option<Arc<dyn ClientRpc>> {
		self.clients.get(id).map(|entry| Arc::clone(entry.value()))
	}
}

impl AmIPrimary for InMemTransport {
	fn am_i_primary(&self) -> bool {
		self.primary.load(Ordering::SeqCst)
	}
}

/// Looks up `id` in `directory` and maps a miss to `TransportError::UnknownClient`, the
/// one error case a directory-backed transport can actually produce.
///
/// # Errors
/// Returns [`TransportError::UnknownClient`] if `directory` has no route for `id`.
pub fn resolve(directory: &dyn ClientDirectory, id: &ClientId) -> Result<Arc<dyn ClientRpc>> {
	directory.client(id).ok_or_else(|| TransportError::UnknownClient(id.clone()))
}
