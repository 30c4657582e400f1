pub mod config;
pub mod listen;
pub mod replay;
mod session;

use crate::cli::WriterArgs;
use crate::exit_codes;
use daq_window::WriterConfig;

/// Environment first, then the flags given on the command line
fn load_config<F>(writer: &WriterArgs, extra: F) -> Result<WriterConfig, i32>
where
    F: FnOnce(&mut WriterConfig),
{
    WriterConfig::from_env_with(|config| {
        writer.apply(config);
        extra(config);
    })
    .map_err(|e| {
        eprintln!("Error: {}", e);
        exit_codes::CONFIG_ERROR
    })
}
