//! Filename grammar: encode/decode the ordering keys embedded in a
//! message's name, and define the sort that yields dispatch order.
//!
//! Waiting:  `P.N.ddmqH`
//! Leased:   `E.P.N.ddmqH`
//!
//! `P` (priority), `N` (sequence) and `E` (expiry) are fixed-width,
//! zero-padded decimal so that lexicographic order equals numeric order
//! (the source's unpadded decimal does not have this property across
//! widely varying magnitudes).

use crate::error::DdmqError;

const WIDTH: usize = 10;
const MARKER: &str = "ddmq";

fn encode(n: u64) -> String {
	format!("{:0width$}", n, width = WIDTH)
}

fn decode_field(s: &str) -> Option<u64> {
	if s.len() != WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	s.parse().ok()
}

fn decode_id(s: &str) -> Option<String> {
	if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
		return None;
	}
	Some(s.to_string())
}

/// Parsed fields of a waiting-message filename: `P.N.ddmqH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingName {
	pub priority: u64,
	pub seq: u64,
	pub id: String,
}

impl WaitingName {
	pub fn format(priority: u64, seq: u64, id: &str) -> String {
		format!("{}.{}.{}{}", encode(priority), encode(seq), MARKER, id)
	}

	pub fn to_filename(&self) -> String {
		Self::format(self.priority, self.seq, &self.id)
	}

	pub fn parse(name: &str) -> Result<WaitingName, DdmqError> {
		let fail = || DdmqError::MalformedName { name: name.to_string() };

		let mut parts = name.splitn(3, '.');
		let p = parts.next().ok_or_else(fail)?;
		let n = parts.next().ok_or_else(fail)?;
		let rest = parts.next().ok_or_else(fail)?;

		let priority = decode_field(p).ok_or_else(fail)?;
		let seq = decode_field(n).ok_or_else(fail)?;
		let id = rest.strip_prefix(MARKER).and_then(decode_id).ok_or_else(fail)?;

		Ok(WaitingName { priority, seq, id })
	}

	/// Build the leased form of this filename given an expiry.
	pub fn into_leased(self, expiry: u64) -> LeasedName {
		LeasedName { expiry, priority: self.priority, seq: self.seq, id: self.id }
	}
}

/// Parsed fields of a leased-message filename: `E.P.N.ddmqH`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedName {
	pub expiry: u64,
	pub priority: u64,
	pub seq: u64,
	pub id: String,
}

impl LeasedName {
	pub fn format(expiry: u64, priority: u64, seq: u64, id: &str) -> String {
		format!("{}.{}.{}.{}{}", encode(expiry), encode(priority), encode(seq), MARKER, id)
	}

	pub fn to_filename(&self) -> String {
		Self::format(self.expiry, self.priority, self.seq, &self.id)
	}

	pub fn parse(name: &str) -> Result<LeasedName, DdmqError> {
		let fail = || DdmqError::MalformedName { name: name.to_string() };

		let mut parts = name.splitn(4, '.');
		let e = parts.next().ok_or_else(fail)?;
		let p = parts.next().ok_or_else(fail)?;
		let n = parts.next().ok_or_else(fail)?;
		let rest = parts.next().ok_or_else(fail)?;

		let expiry = decode_field(e).ok_or_else(fail)?;
		let priority = decode_field(p).ok_or_else(fail)?;
		let seq = decode_field(n).ok_or_else(fail)?;
		let id = rest.strip_prefix(MARKER).and_then(decode_id).ok_or_else(fail)?;

		Ok(LeasedName { expiry, priority, seq, id })
	}
}

/// Glob used throughout the broker to pick out message files in a
/// directory listing, matching the source's `fnmatch('*.ddmq*')`: a dot
/// directly followed by the marker, so `ddmq.yaml` itself doesn't match.
pub fn is_message_filename(name: &str) -> bool {
	name.contains(&format!(".{}", MARKER))
}


// vim: ts=4
