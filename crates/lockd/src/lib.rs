//! Demo harness for the lock service: wires a [`Coordinator`] and one or more
//! [`Cache`]s together over [`InMemTransport`] and drives one of a handful of canned
//! scenarios so the protocol's end-to-end behaviour (local reuse, revoke, the
//! RETRY/RETRY_WAIT handoff) can be watched happen outside of the crates' own unit tests.
//!
//! Nothing here is part of the protocol core; it is ordinary application code built on
//! top of the `lock-*` crates, in the same spirit as any other binary in this workspace.

pub mod cli;

use cli::Cli;
use lock_client::Cache;
use lock_protocol::{ClientId, LockId};
use lock_server::Coordinator;
use lock_transport::{AmIPrimary, ClientDirectory, ClientRpc, InMemTransport, ServerRpc};
use prometheus::Registry;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_subscriber::{filter::EnvFilter, fmt::format::JsonFields, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// A running client: its cache, identity, and the background thread dispatching its
/// outbound ACQUIRE/RELEASE RPCs.
struct DemoClient {
	id: ClientId,
	cache: Arc<Cache>,
	sender: JoinHandle<()>,
}

impl DemoClient {
	fn spawn(id: ClientId, server: Arc<dyn ServerRpc>, transport: &InMemTransport) -> Self {
		let (cache, consumer) = Cache::new(id.clone(), server);
		transport.register_client(id.clone(), cache.clone() as Arc<dyn ClientRpc>);
		let sender = cache.clone().run_sender_thread(consumer);
		Self { id, cache, sender }
	}

	fn acquire_in_background(&self, lid: LockId) -> JoinHandle<()> {
		let cache = self.cache.clone();
		let id = self.id.clone();
		thread::spawn(move || {
			cache.acquire(lid);
			tracing::info!(client = %id, %lid, "acquired");
		})
	}
}

/// Runs `cli.scenario` to completion, logging each transition as it happens. Returns once
/// the scenario's clients have released everything and the background sender threads have
/// drained and shut down.
///
/// # Errors
/// Returns an error if the coordinator's metrics cannot be registered.
pub fn run(cli: &Cli) -> anyhow::Result<()> {
	let registry = Registry::new();
	let (coordinator, server_consumer) = Coordinator::new(&registry)?;
	let transport = Arc::new(InMemTransport::new());

	let directory: Arc<dyn ClientDirectory> = transport.clone();
	let primary: Arc<dyn AmIPrimary> = transport.clone();
	let server_sender = lock_server::run_sender_thread(server_consumer, directory, primary);

	let server_rpc: Arc<dyn ServerRpc> = coordinator.clone();
	let lid = LockId::new(7);

	let clients = match cli.scenario {
		cli::Scenario::LocalReuse => run_local_reuse(&cli.client_prefix, server_rpc, &transport, lid),
		cli::Scenario::Contention => run_contention(&cli.client_prefix, server_rpc, &transport, lid),
		cli::Scenario::RetryWait => run_retry_wait(&cli.client_prefix, server_rpc, &transport, lid),
	};

	for client in clients {
		transport.unregister_client(&client.id);
		drop(client.cache);
		client.sender.join().expect("client sender thread panicked");
	}

	let outstanding_acquires = coordinator.stat(lid);
	drop(coordinator);
	server_sender.join().expect("server sender thread panicked");

	tracing::info!(outstanding_acquires, "scenario complete");
	Ok(())
}

fn client_id(prefix: &str, suffix: &str) -> ClientId {
	ClientId::new(format!("{prefix}-{suffix}"))
}

/// One client acquires, releases, and re-acquires. The second `acquire` is a local cache
/// hit: no ACQUIRE RPC is sent for it.
fn run_local_reuse(prefix: &str, server: Arc<dyn ServerRpc>, transport: &InMemTransport, lid: LockId) -> Vec<DemoClient> {
	let a = DemoClient::spawn(client_id(prefix, "a"), server, transport);

	a.cache.acquire(lid);
	tracing::info!(client = %a.id, %lid, "acquired (miss, sent ACQUIRE)");
	a.cache.release(lid);
	tracing::info!(client = %a.id, %lid, "released, no waiters, stays cached as FREE");

	a.cache.acquire(lid);
	tracing::info!(client = %a.id, %lid, "acquired again (local hit, no RPC)");
	a.cache.release(lid);

	vec![a]
}

/// Two clients contend for the same lock. `b`'s acquire revokes `a`, who hands the lock
/// off via RELEASE once it releases.
fn run_contention(prefix: &str, server: Arc<dyn ServerRpc>, transport: &InMemTransport, lid: LockId) -> Vec<DemoClient> {
	let a = DemoClient::spawn(client_id(prefix, "a"), server.clone(), transport);
	let b = DemoClient::spawn(client_id(prefix, "b"), server, transport);

	a.cache.acquire(lid);
	tracing::info!(client = %a.id, %lid, "holds the lock");

	let b_join = b.acquire_in_background(lid);
	thread::sleep(Duration::from_millis(50));

	a.cache.release(lid);
	tracing::info!(client = %a.id, %lid, "released (revoked), handing off to waiter");
	b_join.join().expect("client b's acquire thread panicked");

	b.cache.release(lid);
	vec![a, b]
}

/// Three clients queue up for the same lock. The middle waiter receives RETRY_WAIT and
/// releases immediately, handing the lock straight on to the third waiter.
fn run_retry_wait(prefix: &str, server: Arc<dyn ServerRpc>, transport: &InMemTransport, lid: LockId) -> Vec<DemoClient> {
	let a = DemoClient::spawn(client_id(prefix, "a"), server.clone(), transport);
	let b = DemoClient::spawn(client_id(prefix, "b"), server.clone(), transport);
	let c = DemoClient::spawn(client_id(prefix, "c"), server, transport);

	a.cache.acquire(lid);
	tracing::info!(client = %a.id, %lid, "holds the lock");

	let b_join = b.acquire_in_background(lid);
	thread::sleep(Duration::from_millis(50));
	let c_join = c.acquire_in_background(lid);
	thread::sleep(Duration::from_millis(50));

	a.cache.release(lid);
	tracing::info!(client = %a.id, %lid, "released, server hands off with RETRY_WAIT");
	b_join.join().expect("client b's acquire thread panicked");

	b.cache.release(lid);
	tracing::info!(client = %b.id, %lid, "released immediately per RETRY_WAIT, handing off to c");
	c_join.join().expect("client c's acquire thread panicked");

	c.cache.release(lid);
	vec![a, b, c]
}

/// Installs a `tracing-subscriber` registry honouring `cli.log_filter` and
/// `cli.log_json`. Mirrors the workspace's usual json-or-pretty layering rather than
/// hand-rolling a formatter.
pub fn init_tracing(cli: &Cli) {
	let filter = EnvFilter::new(cli.log_filter.clone());

	tracing_subscriber::registry()
		.with(if cli.log_json {
			Box::new(
				tracing_subscriber::fmt::layer()
					.fmt_fields(JsonFields::default())
					.event_format(tracing_subscriber::fmt::format().json().flatten_event(true).with_span_list(false))
					.with_filter(filter),
			) as Box<dyn Layer<_> + Send + Sync>
		} else {
			Box::new(
				tracing_subscriber::fmt::layer()
					.event_format(tracing_subscriber::fmt::format().pretty())
					.with_filter(filter),
			)
		})
		.init();
}
