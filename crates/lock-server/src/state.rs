use lock_protocol::{ClientId, Xid};
use std::collections::{HashMap, VecDeque};

/// Per-lock server state. Unlike the client cache, the coordinator's enum only carries
/// the three values this table actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum LocalState {
	Free = 0,
	Locked = 1,
	Acq = 2,
}

impl LocalState {
	pub(crate) fn from_i32(value: i32) -> Option<Self> {
		match value {
			0 => Some(Self::Free),
			1 => Some(Self::Locked),
			2 => Some(Self::Acq),
			_ => None,
		}
	}
}

/// One lock's worth of coordinator bookkeeping.
#[derive(Debug, Clone)]
pub struct LockEntry {
	pub state: LocalState,
	pub owner: ClientId,
	pub owner_xid: Xid,
	pub waiting: VecDeque<ClientId>,
	pub xid_map: HashMap<ClientId, Xid>,
}

impl LockEntry {
	/// A brand new entry: nobody holds it yet.
	pub(crate) fn free() -> Self {
		Self {
			state: LocalState::Free,
			owner: ClientId::empty(),
			owner_xid: Xid::new(0),
			waiting: VecDeque::new(),
			xid_map: HashMap::new(),
		}
	}
}
