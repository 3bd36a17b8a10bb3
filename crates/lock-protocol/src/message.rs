use crate::ids::{ClientId, LockId, Xid};

/// A client-to-server call. Both variants carry the full `(lockid, client_id, xid)`
/// triple the coordinator needs to discriminate duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
	Acquire { lid: LockId, client: ClientId, xid: Xid },
	Release { lid: LockId, client: ClientId, xid: Xid },
}

impl ClientRequest {
	#[must_use]
	pub fn lid(&self) -> LockId {
		match self {
			ClientRequest::Acquire { lid, .. } | ClientRequest::Release { lid, .. } => *lid,
		}
	}
}

/// A server-to-client call, queued by the coordinator and dispatched by its sender
/// thread. `Retry { wait: true }` is the RETRY_WAIT variant: the grantee should use the
/// lock once and release it promptly because another waiter is already queued behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerNotice {
	Revoke { lid: LockId, client: ClientId, xid: Xid },
	Retry { lid: LockId, client: ClientId, xid: Xid, wait: bool },
}

impl ServerNotice {
	#[must_use]
	pub fn lid(&self) -> LockId {
		match self {
			ServerNotice::Revoke { lid, .. } | ServerNotice::Retry { lid, .. } => *lid,
		}
	}

	#[must_use]
	pub fn target(&self) -> &ClientId {
		match self {
			ServerNotice::Revoke { client, .. } | ServerNotice::Retry { client, .. } => client,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn server_notice_exposes_its_target_lock_and_client() {
		let n = ServerNotice::Retry {
			lid: LockId::new(7),
			client: ClientId::new("10.0.0.1:9000"),
			xid: Xid(3),
			wait: true,
		};
		assert_eq!(n.lid(), LockId::new(7));
		assert_eq!(n.target().as_str(), "10.0.0.1:9000");
	}
}
