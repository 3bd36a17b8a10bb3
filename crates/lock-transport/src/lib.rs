//! RPC seams between the coordinator and the cache, plus the in-memory transport used
//! by tests and the demo binary. Everything here is synchronous: a call either returns a
//! `Status` or it is simulated as lost, there is no async runtime involved.

mod error;
mod inmem;
mod traits;

pub use error::{Result, TransportError};
pub use inmem::{resolve, InMemTransport};
pub use traits::{AmIPrimary, ClientDirectory, ClientRpc, LockReleaseUser, ServerRpc};
