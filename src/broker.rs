//! Broker engine (§4.4): publish, consume, ack, nack, purge and queue
//! lifecycle, built on top of `Layout` for paths/config and `filename` for
//! the ordering grammar.

use crate::error::{DdmqError, Result};
use crate::filename::{self, LeasedName, WaitingName};
use crate::layout::{Layout, CONFIG_FILE};
use crate::logging::*;
use crate::message::{Message, Requeue};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs()
}

fn new_id() -> String {
	uuid::Uuid::new_v4().simple().to_string()
}

/// What `consume` handed back: zero, one, or several messages, mirroring
/// the source's `None` / single / list trichotomy without an `Option<Vec<_>>`
/// that would blur "asked for one, got none" with "asked for many, got none".
#[derive(Debug, Clone, PartialEq)]
pub enum Consumed {
	None,
	One(Message),
	Many(Vec<Message>),
}

impl Consumed {
	pub fn into_vec(self) -> Vec<Message> {
		match self {
			Consumed::None => Vec::new(),
			Consumed::One(m) => vec![m],
			Consumed::Many(v) => v,
		}
	}
}

/// Options shared by `publish`; all but `queue` and `message` are optional
/// overrides of the queue's effective settings.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
	pub priority: Option<i64>,
	pub timeout: Option<u64>,
	pub requeue: Requeue,
	pub requeue_counter: u64,
	pub requeue_limit: Option<u64>,
	pub clean: bool,
	pub create: bool,
}

impl PublishOptions {
	pub fn new() -> PublishOptions {
		PublishOptions { clean: true, ..Default::default() }
	}
}

/// A handle to a ddmq root, implementing the broker protocol over it.
pub struct Broker {
	layout: Layout,
}

impl Broker {
	pub fn open(root: impl Into<PathBuf>) -> Result<Broker> {
		Ok(Broker { layout: Layout::open(root)? })
	}

	pub fn open_or_init(root: impl Into<PathBuf>) -> Result<Broker> {
		Ok(Broker { layout: Layout::open_or_init(root)? })
	}

	pub fn layout(&self) -> &Layout {
		&self.layout
	}

	/// List waiting message filenames for `queue`, matching `*.ddmq*`, in
	/// the order `read_dir` hands them back (callers that need dispatch
	/// order must sort).
	pub(crate) fn list_message_files(dir: &Path) -> Result<Vec<String>> {
		let mut names = Vec::new();
		let entries = match fs::read_dir(dir) {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
			Err(e) => return Err(e.into()),
		};
		for entry in entries {
			let entry = entry?;
			let name = entry.file_name().to_string_lossy().into_owned();
			if filename::is_message_filename(&name) {
				names.push(name);
			}
		}
		Ok(names)
	}

	/// Next sequence number for `queue`: max of field-1 across waiting
	/// filenames, plus one. Not atomic across processes (§9); the uuid
	/// suffix on each filename prevents collision regardless.
	fn next_seq(&self, queue: &str) -> Result<u64> {
		let mut max_seq = 0u64;
		for name in Self::list_message_files(&self.layout.queue_dir(queue))? {
			if let Ok(parsed) = WaitingName::parse(&name) {
				max_seq = max_seq.max(parsed.seq);
			}
		}
		Ok(max_seq + 1)
	}

	fn ensure_queue_for(&self, queue: &str, create: bool) -> Result<()> {
		self.layout.ensure_queue(queue, create)
	}

	/// Publish a message to `queue`, returning the record as written.
	pub fn publish(&self, queue: &str, text: &str, opts: &PublishOptions) -> Result<Message> {
		info!("publishing message to {}", queue);
		self.ensure_queue_for(queue, opts.create)?;
		let effective = self.layout.effective_settings(queue)?;

		if opts.clean {
			self.clean(queue, false)?;
		}

		let priority = match opts.priority {
			Some(p) if p < 0 => return Err(DdmqError::InvalidPriority { priority: p }),
			Some(p) => p,
			None => effective.priority,
		};

		// an explicit integer requeue priority implies requeue is on, same
		// as the source's `requeue_prio and (requeue = requeue_prio)`.
		let requeue = match opts.requeue.priority_override() {
			Some(p) => Requeue::OnWithPriority(p),
			None => opts.requeue,
		};

		let seq = self.next_seq(queue)?;
		let id = new_id();
		let filename = WaitingName::format(priority as u64, seq, &id);

		let msg = Message {
			message: text.to_string(),
			queue: queue.to_string(),
			priority,
			queue_number: seq,
			id,
			filename: filename.clone(),
			timeout: opts.timeout,
			requeue,
			requeue_counter: opts.requeue_counter,
			requeue_limit: opts.requeue_limit,
		};

		self.write_message_atomic(&self.layout.queue_dir(queue), &filename, &msg)?;
		Ok(msg)
	}

	/// Write a message body to `dir/name` via a sibling temp file and
	/// rename, so a concurrent lister never observes a partial write
	/// (tightens the source's direct-write, see SPEC_FULL.md §9). The temp
	/// name is unrelated to `name` and deliberately avoids the `ddmq`
	/// marker, so a crash between write and rename leaves a file that
	/// `is_message_filename` (and so `list_message_files`/`consume`) never
	/// picks up.
	fn write_message_atomic(&self, dir: &Path, name: &str, msg: &Message) -> Result<()> {
		let tmp = dir.join(format!(".tmp-{}", new_id()));
		fs::write(&tmp, msg.to_json()?)?;
		fs::rename(&tmp, dir.join(name))?;
		Ok(())
	}

	/// Consume up to `n` messages from `queue`.
	pub fn consume(&self, queue: &str, n: usize, clean: bool, create: bool) -> Result<Consumed> {
		let n = n.max(1);
		info!("consuming {} message(s) from {}", n, queue);
		self.ensure_queue_for(queue, create)?;
		let effective = self.layout.effective_settings(queue)?;

		if clean {
			self.clean(queue, false)?;
		}

		let queue_dir = self.layout.queue_dir(queue);
		let mut candidates = Self::list_message_files(&queue_dir)?;
		candidates.sort();
		candidates.truncate(n);

		let mut consumed = Vec::new();
		for name in candidates {
			let src = queue_dir.join(&name);
			let text = match fs::read_to_string(&src) {
				Ok(text) => text,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
					warn!("while consuming, message file {} was missing, skipping", src.display());
					continue;
				}
				Err(e) => return Err(e.into()),
			};
			let mut msg = Message::from_json(&text)?;

			let parsed = match WaitingName::parse(&name) {
				Ok(parsed) => parsed,
				Err(_) => {
					warn!("malformed waiting filename {} in {}, skipping", name, queue);
					continue;
				}
			};
			let expiry = now() + msg.timeout.unwrap_or(effective.message_timeout);
			let leased = parsed.into_leased(expiry);
			let dest = self.layout.work_dir(queue).join(leased.to_filename());

			match fs::rename(&src, &dest) {
				Ok(()) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
					// another consumer won the race for this file
					continue;
				}
				Err(e) => return Err(e.into()),
			}
			msg.filename = leased.to_filename();
			consumed.push(msg);
		}

		Ok(match (consumed.len(), n) {
			(0, _) => Consumed::None,
			(_, 1) => Consumed::One(consumed.into_iter().next().unwrap()),
			_ => Consumed::Many(consumed),
		})
	}

	/// Requeue the leased message at `work/<leased_name>`, replacing it
	/// with a fresh waiting message, unless its requeue budget is spent.
	pub(crate) fn requeue_leased(&self, queue: &str, leased: &LeasedName, msg: &Message) -> Result<()> {
		if msg.requeue_limit_reached() {
			debug!("requeue limit reached for message {}, discarding", msg.id);
			return self.remove_leased(queue, leased);
		}

		let effective = self.layout.effective_settings(queue)?;
		let priority = msg.requeue.priority_override().unwrap_or(effective.requeue_prio);

		let opts = PublishOptions {
			priority: Some(priority),
			timeout: msg.timeout,
			requeue: msg.requeue,
			requeue_counter: msg.requeue_counter + 1,
			requeue_limit: msg.requeue_limit,
			clean: false,
			create: false,
		};
		self.publish(queue, &msg.message, &opts)?;
		self.remove_leased(queue, leased)
	}

	pub(crate) fn remove_leased(&self, queue: &str, leased: &LeasedName) -> Result<()> {
		let path = self.layout.work_dir(queue).join(leased.to_filename());
		match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	fn read_leased(&self, queue: &str, name: &str) -> Result<Option<(LeasedName, Message)>> {
		let path = self.layout.work_dir(queue).join(name);
		let text = match fs::read_to_string(&path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		let msg = Message::from_json(&text)?;
		let leased = LeasedName::parse(name)?;
		Ok(Some((leased, msg)))
	}

	/// Acknowledge leased messages by their `work/` filenames. `requeue`
	/// overrides when set; unset defaults to `false` (just remove),
	/// regardless of the message's own `requeue` field. Returns the
	/// filenames actually acted on.
	pub fn ack(&self, queue: &str, filenames: &[String], requeue: Option<bool>) -> Result<Vec<String>> {
		self.ack_or_nack(queue, filenames, requeue, false)
	}

	/// Negatively acknowledge leased messages by their `work/` filenames.
	/// `requeue` overrides when set; unset falls back to the message's own
	/// `requeue` field. Returns the filenames actually acted on.
	pub fn nack(&self, queue: &str, filenames: &[String], requeue: Option<bool>) -> Result<Vec<String>> {
		self.ack_or_nack(queue, filenames, requeue, true)
	}

	fn ack_or_nack(&self, queue: &str, filenames: &[String], requeue: Option<bool>, unset_checks_message: bool) -> Result<Vec<String>> {
		let mut acked = Vec::new();
		for name in filenames {
			let Some((leased, msg)) = self.read_leased(queue, name)? else {
				warn!("message file missing, {}", name);
				continue;
			};
			let should_requeue = requeue.unwrap_or_else(|| unset_checks_message && msg.requeue.is_truthy());
			if should_requeue {
				self.requeue_leased(queue, &leased, &msg)?;
			} else {
				self.remove_leased(queue, &leased)?;
			}
			acked.push(name.clone());
		}
		Ok(acked)
	}

	/// Remove every message file from `queue` and its `work/`, leaving
	/// config and directory structure intact. Returns `(waiting, leased)`
	/// counts removed.
	pub fn purge(&self, queue: &str) -> Result<(usize, usize)> {
		info!("purging {}", queue);
		let mut removed_waiting = 0;
		let mut removed_leased = 0;

		let work = self.layout.work_dir(queue);
		for name in Self::list_message_files(&work)? {
			fs::remove_file(work.join(name))?;
			removed_leased += 1;
		}

		let queue_dir = self.layout.queue_dir(queue);
		for name in Self::list_message_files(&queue_dir)? {
			fs::remove_file(queue_dir.join(name))?;
			removed_waiting += 1;
		}

		Ok((removed_waiting, removed_leased))
	}

	/// Delete a single message file by its waiting- or leased-grammar
	/// filename, bypassing ack/nack semantics. Validates `filename`
	/// against the ddmq grammar first; a non-ddmq or malformed name is
	/// fatal, unlike the log-and-skip policy `consume`/`clean` use for the
	/// same failure (direct-delete requests name a specific file, so a
	/// name mismatch means the caller is confused, not racing a listing).
	pub fn delete_message(&self, queue: &str, filename: &str) -> Result<()> {
		if WaitingName::parse(filename).is_err() && LeasedName::parse(filename).is_err() {
			return Err(DdmqError::MalformedName { name: filename.to_string() });
		}
		let work_path = self.layout.work_dir(queue).join(filename);
		let path = if work_path.is_file() { work_path } else { self.layout.queue_dir(queue).join(filename) };
		fs::remove_file(&path)?;
		Ok(())
	}

	pub fn create_queue(&self, queue: &str) -> Result<()> {
		self.layout.create_queue(queue)
	}

	pub fn delete_queue(&self, queue: &str) -> Result<()> {
		self.layout.delete_queue(queue)
	}

	/// Path to a given queue's config file, exposed for CLI introspection.
	pub fn config_path(&self, queue: &str) -> PathBuf {
		self.layout.queue_dir(queue).join(CONFIG_FILE)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn new_broker() -> (TempDir, Broker) {
		let dir = TempDir::new().unwrap();
		let broker = Broker::open_or_init(dir.path()).unwrap();
		(dir, broker)
	}

	#[test]
	fn publish_creates_one_waiting_file() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		let msg = broker.publish("q", "hello", &opts).unwrap();
		assert_eq!(msg.message, "hello");
		assert_eq!(msg.queue_number, 1);

		let (waiting, leased) = broker.message_list("q").unwrap();
		assert_eq!(waiting.len(), 1);
		assert!(leased.is_empty());
	}

	#[test]
	fn publish_rejects_negative_priority() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		opts.priority = Some(-1);
		match broker.publish("q", "hi", &opts) {
			Err(DdmqError::InvalidPriority { priority: -1 }) => {}
			other => panic!("expected InvalidPriority, got {:?}", other),
		}
	}

	#[test]
	fn publish_without_create_fails_on_missing_queue() {
		let (_dir, broker) = new_broker();
		let opts = PublishOptions::new();
		assert!(matches!(broker.publish("q", "hi", &opts), Err(DdmqError::QueueMissing { .. })));
	}

	#[test]
	fn sequence_numbers_increase() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		let a = broker.publish("q", "a", &opts).unwrap();
		let b = broker.publish("q", "b", &opts).unwrap();
		assert!(b.queue_number > a.queue_number);
	}

	#[test]
	fn consume_returns_none_on_empty_queue() {
		let (_dir, broker) = new_broker();
		broker.create_queue("q").unwrap();
		assert_eq!(broker.consume("q", 1, true, false).unwrap(), Consumed::None);
	}

	#[test]
	fn consume_moves_message_to_work_dir() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		broker.publish("q", "hi", &opts).unwrap();

		let consumed = broker.consume("q", 1, true, false).unwrap();
		let msg = match consumed {
			Consumed::One(m) => m,
			other => panic!("expected One, got {:?}", other),
		};
		assert!(msg.filename.split('.').count() == 4);

		let (waiting, leased) = broker.message_list("q").unwrap();
		assert!(waiting.is_empty());
		assert_eq!(leased.len(), 1);
	}

	#[test]
	fn priority_order_respected() {
		let (_dir, broker) = new_broker();
		let mut low = PublishOptions::new();
		low.create = true;
		low.priority = Some(10);
		let mut high = PublishOptions::new();
		high.priority = Some(1);
		broker.publish("q", "low-priority", &low).unwrap();
		broker.publish("q", "high-priority", &high).unwrap();

		let consumed = broker.consume("q", 1, true, false).unwrap();
		match consumed {
			Consumed::One(m) => assert_eq!(m.message, "high-priority"),
			other => panic!("expected One, got {:?}", other),
		}
	}

	#[test]
	fn ack_without_requeue_removes_message() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		broker.publish("q", "hi", &opts).unwrap();
		let msg = match broker.consume("q", 1, true, false).unwrap() {
			Consumed::One(m) => m,
			_ => panic!("expected a message"),
		};

		let acked = broker.ack("q", &[msg.filename.clone()], Some(false)).unwrap();
		assert_eq!(acked, vec![msg.filename]);
		let (waiting, leased) = broker.message_list("q").unwrap();
		assert!(waiting.is_empty());
		assert!(leased.is_empty());
	}

	#[test]
	fn nack_with_requeue_true_republishes() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		broker.publish("q", "hi", &opts).unwrap();
		let msg = match broker.consume("q", 1, true, false).unwrap() {
			Consumed::One(m) => m,
			_ => panic!("expected a message"),
		};

		broker.nack("q", &[msg.filename], Some(true)).unwrap();
		let (waiting, leased) = broker.message_list("q").unwrap();
		assert_eq!(waiting.len(), 1);
		assert!(leased.is_empty());
	}

	#[test]
	fn ack_with_unset_requeue_removes_even_when_message_requeue_is_truthy() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		opts.requeue = Requeue::On;
		broker.publish("q", "hi", &opts).unwrap();
		let msg = match broker.consume("q", 1, true, false).unwrap() {
			Consumed::One(m) => m,
			_ => panic!("expected a message"),
		};

		broker.ack("q", &[msg.filename], None).unwrap();
		let (waiting, leased) = broker.message_list("q").unwrap();
		assert!(waiting.is_empty(), "ack with unset requeue must default to remove, not the message's own field");
		assert!(leased.is_empty());
	}

	#[test]
	fn nack_with_unset_requeue_honors_message_requeue_field() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		opts.requeue = Requeue::On;
		broker.publish("q", "hi", &opts).unwrap();
		let msg = match broker.consume("q", 1, true, false).unwrap() {
			Consumed::One(m) => m,
			_ => panic!("expected a message"),
		};

		broker.nack("q", &[msg.filename], None).unwrap();
		let (waiting, leased) = broker.message_list("q").unwrap();
		assert_eq!(waiting.len(), 1, "nack with unset requeue must fall back to the message's own field");
		assert!(leased.is_empty());
	}

	#[test]
	fn consume_skips_stray_unparseable_filename_instead_of_failing() {
		let (_dir, broker) = new_broker();
		broker.create_queue("q").unwrap();
		let mut opts = PublishOptions::new();
		opts.create = false;
		broker.publish("q", "good", &opts).unwrap();
		std::fs::write(broker.layout().queue_dir("q").join("not-a-valid.ddmqname"), "{}").unwrap();

		let consumed = broker.consume("q", 5, true, false).unwrap();
		let texts: Vec<String> = match consumed {
			Consumed::One(m) => vec![m.message],
			Consumed::Many(v) => v.into_iter().map(|m| m.message).collect(),
			Consumed::None => Vec::new(),
		};
		assert_eq!(texts, vec!["good".to_string()]);
	}

	#[test]
	fn publish_temp_file_does_not_match_message_filename_grammar() {
		assert!(!crate::filename::is_message_filename(".tmp-deadbeef"));
	}

	#[test]
	fn delete_message_rejects_non_grammar_filename() {
		let (_dir, broker) = new_broker();
		broker.create_queue("q").unwrap();
		let err = broker.delete_message("q", "not-a-ddmq-file.txt").unwrap_err();
		assert!(matches!(err, DdmqError::MalformedName { .. }));
	}

	#[test]
	fn delete_message_removes_a_grammar_valid_waiting_file() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		let msg = broker.publish("q", "hi", &opts).unwrap();

		broker.delete_message("q", &msg.filename).unwrap();
		let (waiting, leased) = broker.message_list("q").unwrap();
		assert!(waiting.is_empty());
		assert!(leased.is_empty());
	}

	#[test]
	fn missing_ack_target_is_reported_not_fatal() {
		let (_dir, broker) = new_broker();
		broker.create_queue("q").unwrap();
		let acked = broker.ack("q", &["0000000001.0000000001.0000000001.ddmqdeadbeef".to_string()], Some(false)).unwrap();
		assert!(acked.is_empty());
	}

	#[test]
	fn requeue_limit_exhaustion_discards_instead_of_republishing() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		opts.requeue = Requeue::On;
		opts.requeue_limit = Some(1);
		opts.requeue_counter = 1;
		broker.publish("q", "hi", &opts).unwrap();

		let msg = match broker.consume("q", 1, true, false).unwrap() {
			Consumed::One(m) => m,
			_ => panic!("expected a message"),
		};
		broker.ack("q", &[msg.filename], None).unwrap();

		let (waiting, leased) = broker.message_list("q").unwrap();
		assert!(waiting.is_empty());
		assert!(leased.is_empty());
	}

	#[test]
	fn purge_removes_all_messages_but_keeps_queue() {
		let (_dir, broker) = new_broker();
		let mut opts = PublishOptions::new();
		opts.create = true;
		broker.publish("q", "a", &opts).unwrap();
		broker.publish("q", "b", &opts).unwrap();
		broker.consume("q", 1, true, false).unwrap();

		let (removed_waiting, removed_leased) = broker.purge("q").unwrap();
		assert_eq!(removed_waiting, 1);
		assert_eq!(removed_leased, 1);
		assert!(broker.list_queues().unwrap().contains(&"q".to_string()));
	}

	#[test]
	fn purge_is_idempotent() {
		let (_dir, broker) = new_broker();
		broker.create_queue("q").unwrap();
		assert_eq!(broker.purge("q").unwrap(), (0, 0));
		assert_eq!(broker.purge("q").unwrap(), (0, 0));
	}
}

// vim: ts=4
