/// Status codes returned by both the client-to-server and the server-to-client RPCs.
/// Both directions share one namespace since the layout is identical either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
	Ok = 0,
	Retry = 1,
	RpcErr = 2,
	NoEnt = 3,
	IoErr = 4,
}

impl Status {
	#[must_use]
	pub fn is_ok(self) -> bool {
		matches!(self, Status::Ok)
	}
}
