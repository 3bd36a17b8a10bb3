//! The server-side half of the lock service: a per-lock state machine, a waiter queue,
//! and the outgoing sender thread that turns state-machine decisions into REVOKE/RETRY
//! RPCs without ever making a network call under the coordinator mutex.

pub mod error;
pub mod metrics;
pub mod state;
pub mod wire_state;

use error::CoordinatorError;
use lock_protocol::{ClientId, LockId, ServerNotice, Status, Xid};
use lock_queue::{RpcQueue, RpcQueueConsumer};
use lock_transport::{resolve, AmIPrimary, ClientDirectory, ServerRpc};
use metrics::CoordinatorMetrics;
use prometheus::Registry;
use state::{LocalState, LockEntry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// The replicated lock coordinator. One mutex guards the whole table; outbound RPCs are
/// handed to [`RpcQueue`] and dispatched by a separate sender thread (see
/// [`run_sender_thread`]), so the mutex is never held across a call into the transport.
pub struct Coordinator {
	table: Mutex<HashMap<LockId, LockEntry>>,
	queue: RpcQueue<ServerNotice>,
	metrics: CoordinatorMetrics,
}

impl Coordinator {
	/// Builds a fresh, empty coordinator and registers its metrics on `registry`.
	/// Returns the coordinator plus the consumer half of its outbound queue, which the
	/// caller hands to [`run_sender_thread`].
	///
	/// # Errors
	/// Returns [`CoordinatorError::Metrics`] if metrics registration fails, e.g. because
	/// `registry` already has a collector registered under one of these names.
	pub fn new(registry: &Registry) -> Result<(Arc<Self>, RpcQueueConsumer<ServerNotice>), CoordinatorError> {
		let metrics = CoordinatorMetrics::register(registry)?;
		let (queue, consumer) = RpcQueue::new();
		let coordinator = Arc::new(Self {
			table: Mutex::new(HashMap::new()),
			queue,
			metrics,
		});
		Ok((coordinator, consumer))
	}

	/// Always returns `Status::Retry`; the true grant is delivered asynchronously as a
	/// RETRY RPC once the sender thread drains the queue.
	pub fn acquire(&self, lid: LockId, client_id: ClientId, xid: Xid) -> Status {
		let mut table = self.table.lock().unwrap();
		let entry = table.entry(lid).or_insert_with(LockEntry::free);
		self.metrics.record_acquire();

		let mut outgoing = None;
		match entry.state {
			LocalState::Free => {
				entry.owner = client_id.clone();
				entry.owner_xid = xid;
				entry.state = LocalState::Locked;
				outgoing = Some(ServerNotice::Retry { lid, client: client_id, xid, wait: false });
			}
			LocalState::Locked if entry.owner == client_id => {
				tracing::debug!(%lid, client = %client_id, "duplicate acquire by current owner, ignoring");
			}
			LocalState::Locked => {
				let owner = entry.owner.clone();
				let owner_xid = entry.owner_xid;
				entry.waiting.push_back(client_id.clone());
				entry.xid_map.insert(client_id, xid);
				entry.state = LocalState::Acq;
				outgoing = Some(ServerNotice::Revoke { lid, client: owner, xid: owner_xid });
			}
			LocalState::Acq if entry.owner == client_id => {
				tracing::debug!(%lid, client = %client_id, "duplicate acquire by current owner, ignoring");
			}
			LocalState::Acq => {
				if !entry.waiting.contains(&client_id) {
					entry.waiting.push_back(client_id.clone());
				}
				entry.xid_map.insert(client_id, xid);
				outgoing = Some(ServerNotice::Revoke {
					lid,
					client: entry.owner.clone(),
					xid: entry.owner_xid,
				});
			}
		}
		let table_size = table.len();
		drop(table);
		self.metrics.set_table_size(table_size);

		if let Some(notice) = outgoing {
			if matches!(notice, ServerNotice::Revoke { .. }) {
				self.metrics.record_revoke_sent();
			}
			self.enqueue(notice);
		}

		Status::Retry
	}

	/// Releases `lid` on behalf of `client_id`, provided `xid` still matches what the
	/// coordinator has on file; stale or misattributed releases are silently accepted as
	/// `OK` with no state change.
	pub fn release(&self, lid: LockId, client_id: ClientId, xid: Xid) -> Status {
		let mut table = self.table.lock().unwrap();
		let Some(entry) = table.get_mut(&lid) else {
			return Status::Ok;
		};

		if entry.owner != client_id || entry.owner_xid != xid {
			tracing::debug!(%lid, client = %client_id, "stale or misattributed release, ignoring");
			return Status::Ok;
		}
		self.metrics.record_release();

		let outgoing = if entry.waiting.is_empty() {
			entry.state = LocalState::Free;
			entry.owner = ClientId::empty();
			entry.owner_xid = Xid::new(0);
			None
		} else {
			let winner = entry.waiting.pop_front().expect("checked non-empty above");
			let winner_xid = entry.xid_map.remove(&winner).unwrap_or(Xid::new(0));
			entry.owner = winner.clone();
			entry.owner_xid = winner_xid;
			let more_waiters = !entry.waiting.is_empty();
			entry.state = if more_waiters { LocalState::Acq } else { LocalState::Locked };
			Some(ServerNotice::Retry {
				lid,
				client: winner,
				xid: winner_xid,
				wait: more_waiters,
			})
		};

		let table_size = table.len();
		drop(table);
		self.metrics.set_table_size(table_size);

		if let Some(notice) = outgoing {
			self.enqueue(notice);
		}

		Status::Ok
	}

	/// Operational counter only; never consulted by the protocol itself. Mirrors the
	/// original `nacquire`: the number of acquires granted or queued that have not yet
	/// been legitimately released, not a running total of RPCs handled. The lock
	/// identifier is accepted for interface parity with the original stat RPC but the
	/// aggregate is process-wide, not per-lock.
	#[must_use]
	pub fn stat(&self, _lid: LockId) -> u64 {
		#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
		{
			self.metrics.outstanding_acquires() as u64
		}
	}

	/// Serialises the whole lock table for handoff to a replica.
	#[must_use]
	pub fn marshal_state(&self) -> Vec<u8> {
		let table = self.table.lock().unwrap();
		wire_state::marshal(&table)
	}

	/// Replaces the whole lock table with the contents of `blob`. A decode failure
	/// leaves the existing table untouched.
	///
	/// # Errors
	/// Returns [`CoordinatorError::Truncated`] if `blob` is short, or
	/// [`CoordinatorError::BadLocalState`] if it encodes an unknown `local_state`.
	pub fn unmarshal_state(&self, blob: &[u8]) -> Result<(), CoordinatorError> {
		let restored = wire_state::unmarshal(blob)?;
		let mut table = self.table.lock().unwrap();
		*table = restored;
		Ok(())
	}

	fn enqueue(&self, notice: ServerNotice) {
		if let Err(err) = self.queue.enqueue(notice) {
			tracing::warn!(%err, "outbound sender thread is gone; dropping message");
		}
	}
}

impl ServerRpc for Coordinator {
	fn acquire(&self, lid: LockId, client: ClientId, xid: Xid) -> Status {
		Coordinator::acquire(self, lid, client, xid)
	}

	fn release(&self, lid: LockId, client: ClientId, xid: Xid) -> Status {
		Coordinator::release(self, lid, client, xid)
	}
}

/// Drains `consumer` for as long as producers remain, dispatching each message to its
/// target client unless `primary.am_i_primary()` says this replica should stay silent.
/// Runs on its own thread so the coordinator mutex is never held across the call.
pub fn run_sender_thread(consumer: RpcQueueConsumer<ServerNotice>, directory: Arc<dyn ClientDirectory>, primary: Arc<dyn AmIPrimary>) -> JoinHandle<()> {
	thread::spawn(move || {
		while let Some(notice) = consumer.dequeue() {
			if !primary.am_i_primary() {
				tracing::trace!("not primary, dropping outbound message");
				continue;
			}

			let target = notice.target().clone();
			match resolve(directory.as_ref(), &target) {
				Ok(client) => {
					let status = match notice {
						ServerNotice::Revoke { lid, xid, .. } => client.revoke(lid, xid),
						ServerNotice::Retry { lid, xid, wait, .. } => client.retry(lid, xid, wait),
					};
					if !status.is_ok() {
						tracing::warn!(client = %target, ?status, "client rejected outbound message");
					}
				}
				Err(err) => tracing::warn!(%err, "dropping message to unroutable client"),
			}
		}
	})
}
