use super::{load_config, session};
use crate::cli::ReplayArgs;
use daq_window::ReplaySource;

pub async fn execute(args: ReplayArgs) -> i32 {
    let config = match load_config(&args.writer, |_| {}) {
        Ok(config) => config,
        Err(code) => return code,
    };

    eprintln!("Replaying {}...", args.file.display());
    eprintln!("  Output: {} ({})", config.output_dir.display(), config.format);

    let source = ReplaySource::new(args.file);
    session::run(Box::new(source), &config).await
}
