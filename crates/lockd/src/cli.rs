use clap::{Parser, ValueEnum};

/// Command-line / environment configuration for the `lockd` demo binary.
///
/// This binary does not speak to a real network; it wires a [`lock_server::Coordinator`]
/// and one or more [`lock_client::Cache`] instances together over the in-memory transport
/// and drives one of a handful of canned scenarios so the protocol's behaviour (local
/// reuse, revoke, the RETRY/RETRY_WAIT handoff) can be observed end to end.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
	/// Which canned scenario to run.
	#[arg(long, env = "LOCKD_SCENARIO", value_enum, default_value = "contention")]
	pub scenario: Scenario,

	/// RPC bind address prefix used to mint client identities (`<prefix>-a`, `<prefix>-b`, ...).
	#[arg(long, env = "LOCKD_CLIENT_PREFIX", default_value = "127.0.0.1:9000")]
	pub client_prefix: String,

	/// `tracing-subscriber` `EnvFilter` directive, e.g. "info" or "lockd=debug,lock_server=trace".
	#[arg(long, env = "LOCKD_LOG", default_value = "info")]
	pub log_filter: String,

	/// Emit structured JSON log lines instead of the default human-readable format.
	#[arg(long, env = "LOCKD_LOG_JSON")]
	pub log_json: bool,
}

/// A canned demonstration of one shape of the protocol's behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
	/// One client acquires, releases, and re-acquires: the second acquire is a pure
	/// local cache hit and issues no RPC at all.
	LocalReuse,
	/// Two clients contend for the same lock: the second acquire revokes the first
	/// holder, who hands the lock off via RELEASE/RETRY once it releases.
	Contention,
	/// Three clients queue up for the same lock: the middle waiter is told RETRY_WAIT
	/// and releases immediately so the third waiter can be granted in turn.
	RetryWait,
}
