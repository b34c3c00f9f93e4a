//! # ddmq - dead-drop message queue
//!
//! A serverless, file-backed message broker. Producers and consumers
//! coordinate exclusively through a shared directory tree; there is no
//! long-running daemon. Each message is a single file whose name encodes
//! its dispatch order; visibility-timeout leasing is implemented by
//! renaming files between a queue directory and its `work/` subdirectory.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use ddmq::broker::{Broker, PublishOptions};
//!
//! let broker = Broker::open_or_init("./my-ddmq-root")?;
//! let mut opts = PublishOptions::new();
//! opts.create = true;
//! broker.publish("queue_name", "Hello World!", &opts)?;
//! # Ok::<(), ddmq::error::DdmqError>(())
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod admin;
pub mod broker;
pub mod cleaner;
pub mod error;
pub mod filename;
pub mod layout;
pub mod logging;
pub mod message;

pub use broker::{Broker, Consumed, PublishOptions};
pub use error::{DdmqError, Result};
pub use layout::{Layout, Settings};
pub use message::{Message, Requeue};

// vim: ts=4
