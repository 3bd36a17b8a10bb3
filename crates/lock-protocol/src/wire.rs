//! Length-prefixed, little-endian wire helpers used by the coordinator's state-transfer
//! format (see the server crate's `marshal_state`/`unmarshal_state`). Kept here, next to
//! the message types, so any future wire-level protocol addition has one obvious home.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
	#[error("unexpected end of buffer while decoding {0}")]
	Truncated(&'static str),
	#[error("string length prefix {0} exceeds remaining buffer")]
	BadStringLength(u32),
}

/// Growable little-endian byte writer.
#[derive(Debug, Default)]
pub struct Writer {
	buf: Vec<u8>,
}

impl Writer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn write_u32(&mut self, v: u32) {
		self.buf.extend_from_slice(&v.to_le_bytes());
	}

	pub fn write_u64(&mut self, v: u64) {
		self.buf.extend_from_slice(&v.to_le_bytes());
	}

	pub fn write_i32(&mut self, v: i32) {
		self.buf.extend_from_slice(&v.to_le_bytes());
	}

	pub fn write_str(&mut self, s: &str) {
		#[allow(clippy::cast_possible_truncation)]
		self.write_u32(s.len() as u32);
		self.buf.extend_from_slice(s.as_bytes());
	}

	#[must_use]
	pub fn into_bytes(self) -> Vec<u8> {
		self.buf
	}
}

/// Cursor-based little-endian byte reader over a borrowed buffer.
pub struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	#[must_use]
	pub fn new(buf: &'a [u8]) -> Self {
		Self { buf, pos: 0 }
	}

	/// # Errors
	/// Returns [`WireError::Truncated`] if fewer than 4 bytes remain.
	pub fn read_u32(&mut self) -> Result<u32, WireError> {
		let bytes = self.take(4, "u32")?;
		Ok(u32::from_le_bytes(bytes.try_into().expect("length checked above")))
	}

	/// # Errors
	/// Returns [`WireError::Truncated`] if fewer than 8 bytes remain.
	pub fn read_u64(&mut self) -> Result<u64, WireError> {
		let bytes = self.take(8, "u64")?;
		Ok(u64::from_le_bytes(bytes.try_into().expect("length checked above")))
	}

	/// # Errors
	/// Returns [`WireError::Truncated`] if fewer than 4 bytes remain.
	pub fn read_i32(&mut self) -> Result<i32, WireError> {
		let bytes = self.take(4, "i32")?;
		Ok(i32::from_le_bytes(bytes.try_into().expect("length checked above")))
	}

	/// # Errors
	/// Returns [`WireError::Truncated`] if the length prefix cannot be read, or
	/// [`WireError::BadStringLength`] if it exceeds the remaining buffer.
	pub fn read_str(&mut self) -> Result<String, WireError> {
		let len = self.read_u32()?;
		let bytes = self.take(len as usize, "string body").map_err(|_| WireError::BadStringLength(len))?;
		Ok(String::from_utf8_lossy(bytes).into_owned())
	}

	fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WireError> {
		if self.buf.len() < self.pos + n {
			return Err(WireError::Truncated(what));
		}
		let slice = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}
}
