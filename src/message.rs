//! Message record & codec (one file = one message)

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Whether an expired message should be requeued, and at what priority.
///
/// The wire format is a plain JSON bool-or-int (`false`, `true`, or an
/// integer priority override); this enum is the typed Rust-side view of
/// that polymorphism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
	/// Do not requeue on expiry; delete instead.
	Off,
	/// Requeue on expiry using the queue's effective `requeue_prio`.
	On,
	/// Requeue on expiry, overriding priority to the given value.
	OnWithPriority(i64),
}

impl Requeue {
	pub fn is_truthy(&self) -> bool {
		!matches!(self, Requeue::Off)
	}

	/// Explicit priority override carried by this requeue setting, if any.
	pub fn priority_override(&self) -> Option<i64> {
		match self {
			Requeue::OnWithPriority(p) => Some(*p),
			_ => None,
		}
	}
}

impl Serialize for Requeue {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Requeue::Off => serializer.serialize_bool(false),
			Requeue::On => serializer.serialize_bool(true),
			Requeue::OnWithPriority(p) => serializer.serialize_i64(*p),
		}
	}
}

impl<'de> Deserialize<'de> for Requeue {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct RequeueVisitor;

		impl<'de> Visitor<'de> for RequeueVisitor {
			type Value = Requeue;

			fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str("a bool or an integer priority")
			}

			fn visit_bool<E: de::Error>(self, v: bool) -> Result<Requeue, E> {
				Ok(if v { Requeue::On } else { Requeue::Off })
			}

			fn visit_i64<E: de::Error>(self, v: i64) -> Result<Requeue, E> {
				Ok(Requeue::OnWithPriority(v))
			}

			fn visit_u64<E: de::Error>(self, v: u64) -> Result<Requeue, E> {
				Ok(Requeue::OnWithPriority(v as i64))
			}
		}

		deserializer.deserialize_any(RequeueVisitor)
	}
}

impl Default for Requeue {
	fn default() -> Self {
		Requeue::Off
	}
}

/// A single message: payload plus the metadata needed to route, lease and
/// requeue it. Serializes to exactly the fields below; unknown fields on
/// the way in are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub message: String,
	pub queue: String,
	pub priority: i64,
	pub queue_number: u64,
	pub id: String,
	pub filename: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<u64>,
	#[serde(default)]
	pub requeue: Requeue,
	#[serde(default)]
	pub requeue_counter: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub requeue_limit: Option<u64>,
}

impl Message {
	/// Serialize to the JSON text form stored in a message file.
	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	/// Parse the JSON text form read from a message file.
	pub fn from_json(text: &str) -> serde_json::Result<Message> {
		serde_json::from_str(text)
	}

	/// Has this lineage exhausted its requeue budget?
	pub fn requeue_limit_reached(&self) -> bool {
		match self.requeue_limit {
			Some(limit) => self.requeue_counter >= limit,
			None => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> Message {
		Message {
			message: "hello".to_string(),
			queue: "q".to_string(),
			priority: 999,
			queue_number: 1,
			id: "89723438b9d0403c91943f4ffaf8ba35".to_string(),
			filename: "0000000999.0000000001.ddmq89723438b9d0403c91943f4ffaf8ba35".to_string(),
			timeout: None,
			requeue: Requeue::Off,
			requeue_counter: 0,
			requeue_limit: None,
		}
	}

	#[test]
	fn round_trip() {
		let msg = sample();
		let json = msg.to_json().unwrap();
		let back = Message::from_json(&json).unwrap();
		assert_eq!(msg, back);
	}

	#[test]
	fn ignores_unknown_fields() {
		let mut msg = sample();
		msg.timeout = Some(30);
		let mut value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
		value["extra_field_from_the_future"] = serde_json::Value::Bool(true);
		let back: Message = serde_json::from_value(value).unwrap();
		assert_eq!(back, msg);
	}

	#[test]
	fn requeue_bool_wire_format() {
		let mut msg = sample();
		msg.requeue = Requeue::On;
		let json = msg.to_json().unwrap();
		assert!(json.contains("\"requeue\":true"));

		msg.requeue = Requeue::Off;
		let json = msg.to_json().unwrap();
		assert!(json.contains("\"requeue\":false"));
	}

	#[test]
	fn requeue_int_wire_format() {
		let mut msg = sample();
		msg.requeue = Requeue::OnWithPriority(5);
		let json = msg.to_json().unwrap();
		assert!(json.contains("\"requeue\":5"));
		let back = Message::from_json(&json).unwrap();
		assert_eq!(back.requeue, Requeue::OnWithPriority(5));
	}

	#[test]
	fn requeue_limit_reached() {
		let mut msg = sample();
		msg.requeue_limit = Some(2);
		msg.requeue_counter = 1;
		assert!(!msg.requeue_limit_reached());
		msg.requeue_counter = 2;
		assert!(msg.requeue_limit_reached());
	}

	#[test]
	fn requeue_limit_unset_never_reached() {
		let mut msg = sample();
		msg.requeue_counter = 1_000_000;
		assert!(!msg.requeue_limit_reached());
	}
}

// vim: ts=4
