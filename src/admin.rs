//! Admin surface (§4.6): read-only queue introspection. None of these
//! mutate state, unlike everything in `broker.rs`/`cleaner.rs`.

use crate::broker::Broker;
use crate::error::Result;

impl Broker {
	/// Crate version, exposed for the `ddmq version`/`view` CLI commands.
	pub fn version() -> &'static str {
		env!("CARGO_PKG_VERSION")
	}

	/// Valid queue names under the root, lexicographically sorted.
	pub fn list_queues(&self) -> Result<Vec<String>> {
		self.layout().list_queues()
	}

	/// Waiting and leased message filenames for `queue`.
	pub fn message_list(&self, queue: &str) -> Result<(Vec<String>, Vec<String>)> {
		let waiting = Broker::list_message_files(&self.layout().queue_dir(queue))?;
		let leased = Broker::list_message_files(&self.layout().work_dir(queue))?;
		Ok((waiting, leased))
	}
}


// vim: ts=4
