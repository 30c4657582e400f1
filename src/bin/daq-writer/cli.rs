use clap::{Args, Parser, Subcommand};
use daq_window::{ContainerKind, SinkFormat, WriterConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "daq-writer",
    version,
    about = "Digitizer event writer with epoch windowing",
    long_about = "Receive digitizer readout packets and write one window per acquisition epoch.\n\
                  Clock restarts are detected per channel; each digitizer gets its own output file.\n\
                  Settings come from DAQ_* environment variables (or .env) and the flags below."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Receive event packets over UDP until interrupted
    Listen(ListenArgs),
    /// Process a recorded session file (one JSON packet per line)
    Replay(ReplayArgs),
    /// Print the effective configuration as JSON
    Config(ConfigArgs),
}

/// Engine and output settings shared by every subcommand
#[derive(Args)]
pub struct WriterArgs {
    /// Output directory [env: DAQ_OUTPUT_DIR]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Channels per digitizer [env: DAQ_CHANNELS]
    #[arg(long)]
    pub channels: Option<usize>,

    /// Events per window before a capacity flush [env: DAQ_CAPACITY]
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Window container: vector or sorted [env: DAQ_CONTAINER]
    #[arg(long)]
    pub container: Option<ContainerKind>,

    /// Output format: jsonl or hdf5 [env: DAQ_FORMAT]
    #[arg(long)]
    pub format: Option<SinkFormat>,

    /// Batches queued per stage [env: DAQ_QUEUE_DEPTH]
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Cancellation poll interval in milliseconds [env: DAQ_POLL_MS]
    #[arg(long)]
    pub poll_ms: Option<u64>,
}

impl WriterArgs {
    pub fn apply(&self, config: &mut WriterConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(container) = self.container {
            config.container = container;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(depth) = self.queue_depth {
            config.queue_depth = depth;
        }
        if let Some(poll) = self.poll_ms {
            config.poll_interval_ms = poll;
        }
    }
}

#[derive(Args)]
pub struct ListenArgs {
    /// UDP bind address [env: DAQ_BIND_ADDR]
    #[arg(long)]
    pub bind: Option<String>,

    /// Largest accepted datagram in bytes [env: DAQ_DATAGRAM_SIZE]
    #[arg(long)]
    pub datagram_size: Option<usize>,

    #[command(flatten)]
    pub writer: WriterArgs,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Recorded session file
    #[arg(long)]
    pub file: PathBuf,

    #[command(flatten)]
    pub writer: WriterArgs,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// UDP bind address [env: DAQ_BIND_ADDR]
    #[arg(long)]
    pub bind: Option<String>,

    #[command(flatten)]
    pub writer: WriterArgs,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}
