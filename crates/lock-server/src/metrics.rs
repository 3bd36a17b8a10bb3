use crate::error::CoordinatorError;
use prometheus::{Counter, Gauge, Registry};

/// Operational counters. Never consulted by the protocol state machine itself —
/// observability only, per the coordinator's own rule that metrics never participate in
/// protocol decisions.
///
/// `outstanding_acquires` mirrors the original `nacquire`: incremented on every `acquire`
/// call (even duplicates and queued waiters, matching the upstream server) and decremented
/// only on a legitimate `release` (owner and xid both match), so `stat()` reports how many
/// acquires are currently unresolved rather than a count that only ever grows.
/// `acquires_total` is kept alongside it as the separate monotonic "handled so far" count.
#[derive(Clone)]
pub struct CoordinatorMetrics {
	acquires_total: Counter,
	revokes_sent_total: Counter,
	outstanding_acquires: Gauge,
	lock_table_size: Gauge,
}

impl CoordinatorMetrics {
	/// # Errors
	/// Returns [`CoordinatorError::Metrics`] if any counter or gauge is already
	/// registered on `registry` under the same name.
	pub fn register(registry: &Registry) -> Result<Self, CoordinatorError> {
		let acquires_total = Counter::new("lock_coordinator_acquires_total", "Total ACQUIRE RPCs handled")?;
		let revokes_sent_total = Counter::new("lock_coordinator_revokes_sent_total", "Total REVOKE messages enqueued")?;
		let outstanding_acquires = Gauge::new("lock_coordinator_outstanding_acquires", "Acquires granted or queued but not yet legitimately released")?;
		let lock_table_size = Gauge::new("lock_coordinator_table_size", "Number of locks known to the coordinator")?;

		registry.register(Box::new(acquires_total.clone()))?;
		registry.register(Box::new(revokes_sent_total.clone()))?;
		registry.register(Box::new(outstanding_acquires.clone()))?;
		registry.register(Box::new(lock_table_size.clone()))?;

		Ok(Self {
			acquires_total,
			revokes_sent_total,
			outstanding_acquires,
			lock_table_size,
		})
	}

	/// Called unconditionally at the top of every `acquire`, duplicates included, matching
	/// the upstream server's unconditional `nacquire++`.
	pub(crate) fn record_acquire(&self) {
		self.acquires_total.inc();
		self.outstanding_acquires.inc();
	}

	/// Called only once a `release` has passed the owner/xid check, matching the upstream
	/// server's `nacquire--`, which sits after that same check.
	pub(crate) fn record_release(&self) {
		self.outstanding_acquires.dec();
	}

	pub(crate) fn record_revoke_sent(&self) {
		self.revokes_sent_total.inc();
	}

	pub(crate) fn set_table_size(&self, size: usize) {
		#[allow(clippy::cast_precision_loss)]
		self.lock_table_size.set(size as f64);
	}

	#[must_use]
	pub fn acquires_total(&self) -> f64 {
		self.acquires_total.get()
	}

	#[must_use]
	pub fn outstanding_acquires(&self) -> f64 {
		self.outstanding_acquires.get()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn registering_twice_on_the_same_registry_fails() {
		let registry = Registry::new();
		CoordinatorMetrics::register(&registry).unwrap();
		assert!(CoordinatorMetrics::register(&registry).is_err());
	}

	#[test]
	fn fresh_metrics_start_at_zero() {
		let registry = Registry::new();
		let metrics = CoordinatorMetrics::register(&registry).unwrap();
		assert_eq!(metrics.acquires_total(), 0.0);
		assert_eq!(metrics.outstanding_acquires(), 0.0);
	}

	#[test]
	fn outstanding_acquires_tracks_acquire_and_release_but_acquires_total_only_grows() {
		let registry = Registry::new();
		let metrics = CoordinatorMetrics::register(&registry).unwrap();

		metrics.record_acquire();
		metrics.record_acquire();
		assert_eq!(metrics.outstanding_acquires(), 2.0);
		assert_eq!(metrics.acquires_total(), 2.0);

		metrics.record_release();
		assert_eq!(metrics.outstanding_acquires(), 1.0);
		assert_eq!(metrics.acquires_total(), 2.0);
	}
}
