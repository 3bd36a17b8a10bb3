//! Wire-level types shared by the lock coordinator and the lock cache: identifiers,
//! the RPC message shapes, status codes, and the little-endian encoding helpers used
//! by the coordinator's state-transfer format.

pub mod ids;
pub mod message;
pub mod status;
pub mod wire;

pub use ids::{ClientId, LockId, Xid, XidGenerator};
pub use message::{ClientRequest, ServerNotice};
pub use status::Status;
