//! Serialisation of the whole lock table, for handoff to a replicated backup.

use crate::error::CoordinatorError;
use crate::state::{LocalState, LockEntry};
use lock_protocol::wire::{Reader, Writer};
use lock_protocol::{ClientId, LockId, Xid};
use std::collections::{HashMap, VecDeque};

/// Serialises `table` in the order given by the iterator. The caller holds the
/// coordinator mutex for the duration of this call.
pub fn marshal(table: &HashMap<LockId, LockEntry>) -> Vec<u8> {
	let mut w = Writer::new();
	w.write_u32(table.len() as u32);
	for (lid, entry) in table {
		w.write_u64(lid.as_u64());
		w.write_u64(entry.owner_xid.as_u64());
		w.write_i32(entry.state as i32);
		w.write_str(entry.owner.as_str());
		w.write_u32(entry.waiting.len() as u32);
		for client in &entry.waiting {
			w.write_str(client.as_str());
		}
		w.write_u32(entry.xid_map.len() as u32);
		for (client, xid) in &entry.xid_map {
			w.write_str(client.as_str());
			w.write_u64(xid.as_u64());
		}
	}
	w.into_bytes()
}

/// Deserialises a blob produced by [`marshal`]. Rebuilds the table from scratch; the
/// caller is expected to swap it in under the coordinator mutex.
///
/// # Errors
/// Returns [`CoordinatorError::Truncated`] if `blob` is short,
/// [`CoordinatorError::BadStringLength`] if a string's length prefix overruns the
/// remaining buffer, or [`CoordinatorError::BadLocalState`] if it encodes an unknown
/// `local_state`.
pub fn unmarshal(blob: &[u8]) -> Result<HashMap<LockId, LockEntry>, CoordinatorError> {
	let mut r = Reader::new(blob);
	let count = r.read_u32()?;
	let mut table = HashMap::with_capacity(count as usize);

	for _ in 0..count {
		let lid = LockId::new(r.read_u64()?);
		let owner_xid = Xid::new(r.read_u64()?);
		let state_raw = r.read_i32()?;
		let state = LocalState::from_i32(state_raw).ok_or(CoordinatorError::BadLocalState(state_raw))?;
		let owner = ClientId::new(r.read_str()?);

		let waiting_count = r.read_u32()?;
		let mut waiting = VecDeque::with_capacity(waiting_count as usize);
		for _ in 0..waiting_count {
			waiting.push_back(ClientId::new(r.read_str()?));
		}

		let xid_map_count = r.read_u32()?;
		let mut xid_map = HashMap::with_capacity(xid_map_count as usize);
		for _ in 0..xid_map_count {
			let client = ClientId::new(r.read_str()?);
			let xid = Xid::new(r.read_u64()?);
			xid_map.insert(client, xid);
		}

		table.insert(
			lid,
			LockEntry {
				state,
				owner,
				owner_xid,
				waiting,
				xid_map,
			},
		);
	}

	Ok(table)
}
