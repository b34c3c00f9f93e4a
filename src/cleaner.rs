//! Cleaner (§4.5): scans `work/` for overdue leases, requeuing or
//! discarding per message policy. Split out from `broker.rs` as its own
//! `impl Broker` block since the source keeps this logic as a distinct
//! concern (`clean`/`clean_all`) even though it shares the broker's state.

use crate::broker::{now, Broker};
use crate::error::Result;
use crate::filename::LeasedName;
use crate::logging::*;
use crate::message::Message;
use std::fs;

impl Broker {
	/// Scan `work/` for overdue leases and expire them: requeue per
	/// policy, or discard, then drop the leased file. Debounced by a
	/// 60-second cooldown on `effective.cleaned` unless `force` is set.
	/// Returns `false` without doing any work when the debounce applies.
	pub fn clean(&self, queue: &str, force: bool) -> Result<bool> {
		let effective = self.layout().effective_settings(queue)?;
		if !force && effective.cleaned + 60 > now() {
			return Ok(false);
		}

		info!("cleaning {}", queue);
		let work = self.layout().work_dir(queue);
		let names = Broker::list_message_files(&work)?;
		let current = now();

		for name in names {
			let leased = match LeasedName::parse(&name) {
				Ok(leased) => leased,
				Err(_) => {
					warn!("malformed leased filename {} in {}, skipping", name, queue);
					continue;
				}
			};
			if leased.expiry >= current {
				continue;
			}

			let path = work.join(&name);
			let text = match fs::read_to_string(&path) {
				Ok(text) => text,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
					warn!("while cleaning, message file {} was missing, skipping", path.display());
					continue;
				}
				Err(e) => return Err(e.into()),
			};
			let msg = Message::from_json(&text)?;

			if msg.requeue.is_truthy() && !msg.requeue_limit_reached() {
				self.requeue_leased(queue, &leased, &msg)?;
			} else {
				self.remove_leased(queue, &leased)?;
			}
		}

		self.layout().persist_cleaned(queue, current)?;
		Ok(true)
	}

	/// Clean every queue under the root, in `list_queues` order.
	pub fn clean_all(&self) -> Result<()> {
		info!("cleaning all queues");
		for queue in self.layout().list_queues()? {
			self.clean(&queue, false)?;
		}
		Ok(())
	}
}


// vim: ts=4
