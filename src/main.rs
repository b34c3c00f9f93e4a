use clap::{Parser, Subcommand};
use ddmq::broker::{Broker, Consumed, PublishOptions};
use ddmq::error::DdmqError;
use ddmq::logging::{error, init_tracing};
use ddmq::message::Requeue;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ddmq", version, about = "dead-drop message queue")]
struct Cli {
	/// Root directory of the ddmq tree.
	#[arg(short = 'r', long, global = true, default_value = "./ddmq")]
	root: PathBuf,

	/// Create the root (and, for subcommands that take one, the queue) if missing.
	#[arg(short = 'c', long, global = true)]
	create: bool,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Create a queue.
	Create { queue: String },
	/// Delete a queue entirely.
	Delete { queue: String },
	/// Publish a message.
	Publish {
		queue: String,
		message: String,
		#[arg(long)]
		priority: Option<i64>,
		#[arg(long)]
		timeout: Option<u64>,
		#[arg(long)]
		requeue: bool,
		#[arg(long)]
		requeue_prio: Option<i64>,
		#[arg(long)]
		requeue_limit: Option<u64>,
		#[arg(long, default_value_t = true)]
		clean: bool,
	},
	/// Consume one or more messages.
	Consume {
		queue: String,
		#[arg(short = 'n', default_value_t = 1)]
		n: usize,
		#[arg(long, default_value_t = true)]
		clean: bool,
	},
	/// Acknowledge leased message(s), by their `work/` filename.
	Ack {
		queue: String,
		#[arg(required = true)]
		filenames: Vec<String>,
		#[arg(long)]
		requeue: Option<bool>,
	},
	/// Negatively acknowledge leased message(s).
	Nack {
		queue: String,
		#[arg(required = true)]
		filenames: Vec<String>,
		#[arg(long)]
		requeue: Option<bool>,
	},
	/// Delete a single message file directly, bypassing ack/nack semantics.
	#[command(name = "del-msg")]
	DelMsg { queue: String, filename: String },
	/// Remove every message from a queue, keeping its config and directories.
	Purge { queue: String },
	/// Run the cleaner over one queue, or every queue with `--all`.
	Clean {
		queue: Option<String>,
		#[arg(long)]
		force: bool,
		#[arg(long)]
		all: bool,
	},
	/// List valid queues under the root.
	List,
	/// Show waiting and leased message filenames for a queue.
	View { queue: String },
	/// Publish a message described by a JSON object read from stdin.
	Json { queue: String },
}

fn requeue_from_flags(requeue: bool, requeue_prio: Option<i64>) -> Requeue {
	match requeue_prio {
		Some(p) => Requeue::OnWithPriority(p),
		None if requeue => Requeue::On,
		None => Requeue::Off,
	}
}

#[derive(serde::Deserialize)]
struct JsonPublishRequest {
	message: String,
	#[serde(default)]
	priority: Option<i64>,
	#[serde(default)]
	timeout: Option<u64>,
	#[serde(default)]
	requeue: Requeue,
	#[serde(default)]
	requeue_prio: Option<i64>,
	#[serde(default)]
	requeue_limit: Option<u64>,
}

fn run(cli: Cli) -> Result<(), DdmqError> {
	let broker = if cli.create {
		Broker::open_or_init(&cli.root)?
	} else {
		Broker::open(&cli.root)?
	};

	match cli.command {
		Commands::Create { queue } => {
			broker.create_queue(&queue)?;
			println!("created {}", queue);
		}
		Commands::Delete { queue } => {
			broker.delete_queue(&queue)?;
			println!("deleted {}", queue);
		}
		Commands::Publish { queue, message, priority, timeout, requeue, requeue_prio, requeue_limit, clean } => {
			let mut opts = PublishOptions::new();
			opts.create = cli.create;
			opts.priority = priority;
			opts.timeout = timeout;
			opts.requeue = requeue_from_flags(requeue, requeue_prio);
			opts.requeue_limit = requeue_limit;
			opts.clean = clean;
			let msg = broker.publish(&queue, &message, &opts)?;
			println!("{}", msg.to_json()?);
		}
		Commands::Consume { queue, n, clean } => {
			let consumed = broker.consume(&queue, n, clean, cli.create)?;
			match consumed {
				Consumed::None => println!("null"),
				Consumed::One(msg) => println!("{}", msg.to_json()?),
				Consumed::Many(msgs) => {
					for msg in msgs {
						println!("{}", msg.to_json()?);
					}
				}
			}
		}
		Commands::Ack { queue, filenames, requeue } => {
			let acked = broker.ack(&queue, &filenames, requeue)?;
			println!("acked {} message(s)", acked.len());
		}
		Commands::Nack { queue, filenames, requeue } => {
			let nacked = broker.nack(&queue, &filenames, requeue)?;
			println!("nacked {} message(s)", nacked.len());
		}
		Commands::DelMsg { queue, filename } => {
			broker.delete_message(&queue, &filename)?;
			println!("deleted {}", filename);
		}
		Commands::Purge { queue } => {
			let (waiting, leased) = broker.purge(&queue)?;
			println!("purged {} waiting, {} leased", waiting, leased);
		}
		Commands::Clean { queue, force, all } => {
			if all {
				broker.clean_all()?;
				println!("cleaned all queues");
			} else {
				let queue = queue.expect("queue name required unless --all is given");
				let did_work = broker.clean(&queue, force)?;
				println!("{}", if did_work { "cleaned" } else { "skipped (debounced)" });
			}
		}
		Commands::List => {
			for queue in broker.list_queues()? {
				println!("{}", queue);
			}
		}
		Commands::View { queue } => {
			let (waiting, leased) = broker.message_list(&queue)?;
			println!("waiting ({}):", waiting.len());
			for name in waiting {
				println!("  {}", name);
			}
			println!("leased ({}):", leased.len());
			for name in leased {
				println!("  {}", name);
			}
		}
		Commands::Json { queue } => {
			let text = std::io::read_to_string(std::io::stdin()).map_err(DdmqError::from)?;
			let request: JsonPublishRequest = serde_json::from_str(&text)?;
			let mut opts = PublishOptions::new();
			opts.create = cli.create;
			opts.priority = request.priority;
			opts.timeout = request.timeout;
			opts.requeue = match request.requeue_prio {
				Some(p) => Requeue::OnWithPriority(p),
				None => request.requeue,
			};
			opts.requeue_limit = request.requeue_limit;
			let msg = broker.publish(&queue, &request.message, &opts)?;
			println!("{}", msg.to_json()?);
		}
	}

	Ok(())
}

fn main() -> ExitCode {
	init_tracing();
	let cli = Cli::parse();
	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::from(1)
		}
	}
}

// vim: ts=4
