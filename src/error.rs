//! Error types for ddmq operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Unified error type for broker operations
///
/// Race-induced `NotFound` during consume/ack/nack/clean is deliberately
/// *not* represented here: those call sites log a warning and continue
/// instead of failing the whole operation.
#[derive(Debug)]
pub enum DdmqError {
	/// Root directory does not exist
	RootMissing { path: PathBuf },

	/// Root directory exists but has no root config file
	RootUninitiated { path: PathBuf },

	/// Queue directory absent and `create` was not requested
	QueueMissing { queue: String },

	/// Queue name fails the admin-surface name pattern
	InvalidName { name: String },

	/// Negative priority supplied at publish time
	InvalidPriority { priority: i64 },

	/// A filename in a queue/work directory does not match the grammar
	MalformedName { name: String },

	/// JSON message body failed to parse
	Codec { source: serde_json::Error },

	/// YAML config body failed to parse or serialize
	Config { source: serde_yaml::Error },

	/// Any other filesystem error not covered above
	Io { source: io::Error },
}

impl fmt::Display for DdmqError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DdmqError::RootMissing { path } => {
				write!(f, "root directory missing: {}", path.display())
			}
			DdmqError::RootUninitiated { path } => {
				write!(f, "root directory uninitiated: {}", path.display())
			}
			DdmqError::QueueMissing { queue } => write!(f, "queue missing: {}", queue),
			DdmqError::InvalidName { name } => write!(f, "invalid queue name: {}", name),
			DdmqError::InvalidPriority { priority } => {
				write!(f, "invalid priority {}: must be >= 0", priority)
			}
			DdmqError::MalformedName { name } => {
				write!(f, "filename does not match the ddmq grammar: {}", name)
			}
			DdmqError::Codec { source } => write!(f, "message codec error: {}", source),
			DdmqError::Config { source } => write!(f, "config error: {}", source),
			DdmqError::Io { source } => write!(f, "I/O error: {}", source),
		}
	}
}

impl Error for DdmqError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			DdmqError::Codec { source } => Some(source),
			DdmqError::Config { source } => Some(source),
			DdmqError::Io { source } => Some(source),
			_ => None,
		}
	}
}

impl From<io::Error> for DdmqError {
	fn from(e: io::Error) -> Self {
		DdmqError::Io { source: e }
	}
}

impl From<serde_json::Error> for DdmqError {
	fn from(e: serde_json::Error) -> Self {
		DdmqError::Codec { source: e }
	}
}

impl From<serde_yaml::Error> for DdmqError {
	fn from(e: serde_yaml::Error) -> Self {
		DdmqError::Config { source: e }
	}
}

pub type Result<T> = std::result::Result<T, DdmqError>;

// vim: ts=4
