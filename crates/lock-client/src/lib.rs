//! The client-side half of the lock service: a per-lock cache that lets a process reuse
//! a granted lock across local acquire/release cycles without round-tripping to the
//! coordinator, while still answering REVOKE/RETRY promptly.

pub mod error;
pub mod state;

use error::CacheError;
use lock_protocol::{ClientId, ClientRequest, LockId, Status, Xid};
use lock_queue::{RpcQueue, RpcQueueConsumer};
use lock_transport::{ClientRpc, LockReleaseUser, ServerRpc};
use state::{ClientLockEntry, LocalState};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};

/// The client-side lock cache. One mutex guards every lock's bookkeeping; one condition
/// variable, shared across all locks, wakes every blocked `acquire` on any state change
/// (each waiter re-checks its own lock's state on wake, so unrelated wakeups are cheap
/// no-ops rather than a correctness issue).
pub struct Cache {
	client_id: ClientId,
	table: Mutex<HashMap<LockId, ClientLockEntry>>,
	condvar: Condvar,
	queue: RpcQueue<ClientRequest>,
	server: Arc<dyn ServerRpc>,
	release_user: Option<Arc<dyn LockReleaseUser>>,
}

impl Cache {
	/// Builds a cache bound to `client_id`, talking to `server`. Returns the cache plus
	/// the consumer half of its outbound queue, which the caller hands to
	/// [`Cache::run_sender_thread`].
	#[must_use]
	pub fn new(client_id: ClientId, server: Arc<dyn ServerRpc>) -> (Arc<Self>, RpcQueueConsumer<ClientRequest>) {
		Self::with_release_user(client_id, server, None)
	}

	/// As [`Cache::new`], but installs a [`LockReleaseUser`] callback invoked
	/// synchronously just before every outbound RELEASE.
	#[must_use]
	pub fn with_release_user(client_id: ClientId, server: Arc<dyn ServerRpc>, release_user: Option<Arc<dyn LockReleaseUser>>) -> (Arc<Self>, RpcQueueConsumer<ClientRequest>) {
		let (queue, consumer) = RpcQueue::new();
		let cache = Arc::new(Self {
			client_id,
			table: Mutex::new(HashMap::new()),
			condvar: Condvar::new(),
			queue,
			server,
			release_user,
		});
		(cache, consumer)
	}

	/// Blocks the calling thread until `lid` is held locally.
	///
	/// # Panics
	/// Panics if the cache mutex has been poisoned by a prior panicking holder.
	pub fn acquire(&self, lid: LockId) {
		let mut table = self.table.lock().unwrap();
		let mut counted_as_waiting = false;

		let already_free = {
			let entry = table.entry(lid).or_insert_with(ClientLockEntry::new);
			match entry.local_state {
				LocalState::Free => {
					entry.local_state = LocalState::Locked;
					true
				}
				LocalState::None => {
					self.begin_acquire(entry, lid);
					false
				}
				LocalState::Acquiring | LocalState::Locked | LocalState::Releasing => {
					entry.waiting += 1;
					counted_as_waiting = true;
					false
				}
			}
		};
		if already_free {
			tracing::debug!(%lid, client = %self.client_id, "local cache hit, granted immediately");
			return;
		}

		loop {
			table = self.condvar.wait(table).unwrap();
			let entry = table.entry(lid).or_insert_with(ClientLockEntry::new);
			match entry.local_state {
				LocalState::Free => {
					entry.local_state = LocalState::Locked;
					if counted_as_waiting {
						entry.waiting = entry.waiting.saturating_sub(1);
					}
					tracing::debug!(%lid, client = %self.client_id, "acquire granted after wait");
					return;
				}
				LocalState::None => {
					self.begin_acquire(entry, lid);
				}
				LocalState::Acquiring | LocalState::Locked | LocalState::Releasing => {}
			}
		}
	}

	/// Transitions `entry` from `None` to `Acquiring`, mints a fresh xid for this lock,
	/// and queues the ACQUIRE RPC. Called both by the first acquirer and, later, by
	/// whichever local waiter wakes first once the lock cycles back to `None`.
	fn begin_acquire(&self, entry: &mut ClientLockEntry, lid: LockId) {
		entry.local_state = LocalState::Acquiring;
		entry.xid = Xid::new(entry.xid.as_u64() + 1);
		self.enqueue(ClientRequest::Acquire {
			lid,
			client: self.client_id.clone(),
			xid: entry.xid,
		});
	}

	/// Releases `lid`, previously granted by [`Cache::acquire`].
	///
	/// If the lock was revoked while held, sends RELEASE to the coordinator and the
	/// entry moves on towards `None`; otherwise the lock becomes `Free` for immediate
	/// local reuse and any local waiter is woken with no RPC at all.
	///
	/// # Panics
	/// Panics if `lid` was never acquired by this cache, or if the cache mutex is
	/// poisoned.
	pub fn release(&self, lid: LockId) {
		let mut table = self.table.lock().unwrap();
		let entry = table.get_mut(&lid).expect("release called on a lock this cache never acquired");
		debug_assert_eq!(entry.local_state, LocalState::Locked, "release called while not holding the lock");

		if entry.revoked_pending {
			entry.local_state = LocalState::Releasing;
			entry.revoked_pending = false;
			let xid = entry.xid;
			drop(table);

			if let Some(user) = &self.release_user {
				user.do_release(lid);
			}
			self.enqueue(ClientRequest::Release {
				lid,
				client: self.client_id.clone(),
				xid,
			});
		} else {
			entry.local_state = LocalState::Free;
			let has_waiters = entry.waiting > 0;
			drop(table);
			if has_waiters {
				self.condvar.notify_all();
			}
		}
	}

	/// Handles an incoming REVOKE. Marks the entry for release on the holder's next
	/// local release, or releases immediately if nobody is using it right now.
	pub fn revoke_handler(&self, lid: LockId, xid: Xid) -> Status {
		let mut table = self.table.lock().unwrap();
		let entry = table.entry(lid).or_insert_with(ClientLockEntry::new);

		match entry.local_state {
			LocalState::Locked | LocalState::Acquiring => {
				if xid == entry.xid {
					entry.revoked_pending = true;
				} else {
					tracing::debug!(%lid, "dropping revoke for a stale xid");
				}
				Status::Ok
			}
			LocalState::Free => {
				if xid != entry.xid {
					tracing::debug!(%lid, "dropping revoke for a stale xid");
					return Status::Ok;
				}
				entry.local_state = LocalState::None;
				let release_xid = entry.xid;
				drop(table);

				if let Some(user) = &self.release_user {
					user.do_release(lid);
				}
				self.enqueue(ClientRequest::Release {
					lid,
					client: self.client_id.clone(),
					xid: release_xid,
				});
				Status::Ok
			}
			LocalState::None | LocalState::Releasing => Status::Ok,
		}
	}

	/// Handles an incoming RETRY: the coordinator has granted (or queued) this client's
	/// outstanding ACQUIRE.
	///
	/// The cache mutex is held continuously from `begin_acquire` through the acquiring
	/// thread's first `condvar.wait`, so a RETRY for the xid currently on file always
	/// finds `entry.local_state == Acquiring`: there is no window for it to arrive
	/// "early". A RETRY that finds anything else with a matching xid is a duplicate of
	/// one already acted on (the coordinator's outbound queue guarantees at-least-once,
	/// not exactly-once, delivery) and is a pure no-op here.
	pub fn retry_handler(&self, lid: LockId, xid: Xid, wait: bool) -> Status {
		let mut table = self.table.lock().unwrap();
		let entry = table.entry(lid).or_insert_with(ClientLockEntry::new);

		if xid != entry.xid {
			tracing::debug!(%lid, "dropping retry for a stale xid");
			return Status::Ok;
		}

		if wait {
			entry.revoked_pending = true;
		}

		if entry.local_state == LocalState::Acquiring {
			entry.local_state = LocalState::Free;
			drop(table);
			self.condvar.notify_all();
		} else {
			tracing::trace!(%lid, state = ?entry.local_state, "dropping duplicate retry for an already-settled xid");
		}

		Status::Ok
	}

	fn enqueue(&self, request: ClientRequest) {
		if let Err(err) = self.queue.enqueue(request) {
			tracing::warn!(%err, "outbound sender thread is gone; dropping request");
		}
	}

	/// Drains `consumer`, issuing each queued ACQUIRE/RELEASE against `self.server`.
	/// ACQUIRE replies are ignored (always `RETRY`; the real grant arrives later as a
	/// `retry_handler` call); a successful RELEASE completion moves the entry to `None`
	/// and wakes any local waiter so it can re-acquire from the server.
	///
	/// Holds only a [`Weak`] reference to the cache between messages: the outbound
	/// queue's sender lives inside the cache itself, so a strong reference held across
	/// the blocking `dequeue` would keep that sender alive forever and the thread could
	/// never observe the last producer going away.
	#[must_use]
	pub fn run_sender_thread(self: Arc<Self>, consumer: RpcQueueConsumer<ClientRequest>) -> JoinHandle<()> {
		let weak = Arc::downgrade(&self);
		drop(self);
		thread::spawn(move || {
			while let Some(request) = consumer.dequeue() {
				let Some(cache) = weak.upgrade() else { break };
				match request {
					ClientRequest::Acquire { lid, client, xid } => {
						let _status = cache.server.acquire(lid, client, xid);
					}
					ClientRequest::Release { lid, client, xid } => {
						let status = cache.server.release(lid, client, xid);
						if status.is_ok() {
							let mut table = cache.table.lock().unwrap();
							if let Some(entry) = table.get_mut(&lid) {
								entry.local_state = LocalState::None;
							}
							drop(table);
							cache.condvar.notify_all();
						} else {
							tracing::warn!(%lid, client = %client, ?status, "release RPC rejected");
						}
					}
				}
			}
		})
	}

	/// Current xid recorded for `lid`, mostly useful from tests driving the state
	/// machine directly.
	#[must_use]
	pub fn current_xid(&self, lid: LockId) -> Option<Xid> {
		self.table.lock().unwrap().get(&lid).map(|entry| entry.xid)
	}

	/// Poisoned-mutex-tolerant accessor, for callers that want a `Result` instead of a
	/// panic on a poisoned cache.
	///
	/// # Errors
	/// Returns [`CacheError::Poisoned`] if a prior holder panicked while holding the
	/// cache mutex.
	pub fn try_local_state(&self, lid: LockId) -> Result<Option<LocalState>, CacheError> {
		let table = self.table.lock().map_err(|_| CacheError::Poisoned)?;
		Ok(table.get(&lid).map(|entry| entry.local_state))
	}
}

impl ClientRpc for Cache {
	fn revoke(&self, lid: LockId, xid: Xid) -> Status {
		self.revoke_handler(lid, xid)
	}

	fn retry(&self, lid: LockId, xid: Xid, wait: bool) -> Status {
		self.retry_handler(lid, xid, wait)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex as StdMutex;
	use std::time::Duration;

	#[derive(Default)]
	struct RecordingServer {
		acquires: StdMutex<Vec<(LockId, ClientId, Xid)>>,
		releases: StdMutex<Vec<(LockId, ClientId, Xid)>>,
	}

	impl ServerRpc for RecordingServer {
		fn acquire(&self, lid: LockId, client: ClientId, xid: Xid) -> Status {
			self.acquires.lock().unwrap().push((lid, client, xid));
			Status::Retry
		}

		fn release(&self, lid: LockId, client: ClientId, xid: Xid) -> Status {
			self.releases.lock().unwrap().push((lid, client, xid));
			Status::Ok
		}
	}

	fn new_cache() -> (Arc<Cache>, RpcQueueConsumer<ClientRequest>, Arc<RecordingServer>) {
		let server = Arc::new(RecordingServer::default());
		let (cache, consumer) = Cache::new(ClientId::new("client-a"), server.clone());
		(cache, consumer, server)
	}

	fn insert(cache: &Cache, lid: LockId, entry: ClientLockEntry) {
		cache.table.lock().unwrap().insert(lid, entry);
	}

	#[derive(Default)]
	struct RecordingReleaseUser {
		calls: StdMutex<Vec<LockId>>,
	}

	impl LockReleaseUser for RecordingReleaseUser {
		fn do_release(&self, lid: LockId) {
			self.calls.lock().unwrap().push(lid);
		}
	}

	#[test]
	fn release_user_is_invoked_before_the_release_rpc_is_sent() {
		let server = Arc::new(RecordingServer::default());
		let release_user = Arc::new(RecordingReleaseUser::default());
		let (cache, _consumer) = Cache::with_release_user(ClientId::new("client-a"), server, Some(release_user.clone()));
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Locked,
				revoked_pending: true,
				waiting: 0,
				xid: Xid::new(4),
			},
		);

		cache.release(lid);

		assert_eq!(release_user.calls.lock().unwrap().as_slice(), &[lid]);
	}

	#[test]
	fn release_user_is_invoked_on_an_immediate_revoke_release_too() {
		let server = Arc::new(RecordingServer::default());
		let release_user = Arc::new(RecordingReleaseUser::default());
		let (cache, _consumer) = Cache::with_release_user(ClientId::new("client-a"), server, Some(release_user.clone()));
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Free,
				revoked_pending: false,
				waiting: 0,
				xid: Xid::new(2),
			},
		);

		cache.revoke_handler(lid, Xid::new(2));

		assert_eq!(release_user.calls.lock().unwrap().as_slice(), &[lid]);
	}

	#[test]
	fn first_acquire_on_a_fresh_lock_sends_acquire_and_blocks() {
		let (cache, consumer, _server) = new_cache();
		let lid = LockId::new(1);

		let cache_for_thread = cache.clone();
		let handle = thread::spawn(move || cache_for_thread.acquire(lid));

		let request = consumer.dequeue().unwrap();
		assert_eq!(request, ClientRequest::Acquire { lid, client: ClientId::new("client-a"), xid: Xid::new(1) });

		cache.retry_handler(lid, Xid::new(1), false);
		handle.join().unwrap();

		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Locked));
	}

	#[test]
	fn release_without_revoke_frees_the_lock_for_local_reuse() {
		let (cache, _consumer, server) = new_cache();
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Locked,
				revoked_pending: false,
				waiting: 0,
				xid: Xid::new(1),
			},
		);

		cache.release(lid);

		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Free));
		assert!(server.releases.lock().unwrap().is_empty());
	}

	#[test]
	fn release_after_revoke_sends_release_and_clears_to_none() {
		let (cache, consumer, server) = new_cache();
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Locked,
				revoked_pending: true,
				waiting: 0,
				xid: Xid::new(4),
			},
		);

		let sender = cache.clone().run_sender_thread(consumer);
		cache.release(lid);

		for _ in 0..200 {
			if cache.try_local_state(lid).unwrap() == Some(LocalState::None) {
				break;
			}
			thread::sleep(Duration::from_millis(5));
		}

		assert_eq!(server.releases.lock().unwrap().as_slice(), &[(lid, ClientId::new("client-a"), Xid::new(4))]);
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::None));

		drop(cache);
		sender.join().unwrap();
	}

	#[test]
	fn revoke_while_free_sends_release_immediately() {
		let (cache, consumer, server) = new_cache();
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Free,
				revoked_pending: false,
				waiting: 0,
				xid: Xid::new(2),
			},
		);

		let status = cache.revoke_handler(lid, Xid::new(2));
		assert_eq!(status, Status::Ok);

		let request = consumer.dequeue().unwrap();
		assert_eq!(request, ClientRequest::Release { lid, client: ClientId::new("client-a"), xid: Xid::new(2) });
		assert!(server.releases.lock().unwrap().is_empty());
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::None));
	}

	#[test]
	fn stale_revoke_while_free_is_ignored() {
		let (cache, consumer, _server) = new_cache();
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Free,
				revoked_pending: false,
				waiting: 0,
				xid: Xid::new(2),
			},
		);

		let status = cache.revoke_handler(lid, Xid::new(1));
		assert_eq!(status, Status::Ok);

		assert_eq!(consumer.try_dequeue(), None, "a revoke for an xid this client has moved past must not send RELEASE");
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Free), "the currently-valid, unrevoked lock must stay cached");
	}

	#[test]
	fn revoke_while_locked_only_sets_the_pending_flag() {
		let (cache, _consumer, _server) = new_cache();
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Locked,
				revoked_pending: false,
				waiting: 0,
				xid: Xid::new(3),
			},
		);

		cache.revoke_handler(lid, Xid::new(3));

		let table = cache.table.lock().unwrap();
		let entry = &table[&lid];
		assert_eq!(entry.local_state, LocalState::Locked);
		assert!(entry.revoked_pending);
	}

	#[test]
	fn revoke_while_acquiring_is_drained_only_after_the_lock_is_used_once() {
		let (cache, consumer, server) = new_cache();
		let lid = LockId::new(1);

		let cache_for_thread = cache.clone();
		let handle = thread::spawn(move || cache_for_thread.acquire(lid));
		consumer.dequeue().unwrap();
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Acquiring));

		let status = cache.revoke_handler(lid, Xid::new(1));
		assert_eq!(status, Status::Ok);
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Acquiring), "a revoke while acquiring must not short-circuit the grant");
		assert!(cache.table.lock().unwrap()[&lid].revoked_pending);

		cache.retry_handler(lid, Xid::new(1), false);
		handle.join().unwrap();
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Locked), "caller must observe the lock as held before release drains the revoke");

		let sender = cache.clone().run_sender_thread(consumer);
		cache.release(lid);

		for _ in 0..200 {
			if cache.try_local_state(lid).unwrap() == Some(LocalState::None) {
				break;
			}
			thread::sleep(Duration::from_millis(5));
		}

		assert_eq!(server.releases.lock().unwrap().as_slice(), &[(lid, ClientId::new("client-a"), Xid::new(1))]);
		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::None));

		drop(cache);
		sender.join().unwrap();
	}

	#[test]
	fn stale_revoke_xid_is_ignored() {
		let (cache, _consumer, _server) = new_cache();
		let lid = LockId::new(1);
		insert(
			&cache,
			lid,
			ClientLockEntry {
				local_state: LocalState::Locked,
				revoked_pending: false,
				waiting: 0,
				xid: Xid::new(5),
			},
		);

		cache.revoke_handler(lid, Xid::new(1));

		assert!(!cache.table.lock().unwrap()[&lid].revoked_pending);
	}

	#[test]
	fn retry_wait_flag_presets_revoked_pending() {
		let (cache, consumer, _server) = new_cache();
		let lid = LockId::new(1);

		let cache_for_thread = cache.clone();
		let handle = thread::spawn(move || cache_for_thread.acquire(lid));
		consumer.dequeue().unwrap();

		cache.retry_handler(lid, Xid::new(1), true);
		handle.join().unwrap();

		assert!(cache.table.lock().unwrap()[&lid].revoked_pending);
	}

	#[test]
	fn second_local_waiter_is_granted_without_a_new_rpc() {
		let (cache, consumer, server) = new_cache();
		let lid = LockId::new(1);

		let first = cache.clone();
		let h1 = thread::spawn(move || first.acquire(lid));
		let request = consumer.dequeue().unwrap();
		assert_eq!(request, ClientRequest::Acquire { lid, client: ClientId::new("client-a"), xid: Xid::new(1) });
		cache.retry_handler(lid, Xid::new(1), false);
		h1.join().unwrap();

		let second = cache.clone();
		let h2 = thread::spawn(move || second.acquire(lid));
		thread::sleep(Duration::from_millis(20));

		cache.release(lid);
		h2.join().unwrap();

		assert_eq!(cache.try_local_state(lid).unwrap(), Some(LocalState::Locked));
		assert_eq!(server.acquires.lock().unwrap().len(), 1);
	}
}
