use super::{load_config, session};
use crate::cli::ListenArgs;
use daq_window::UdpListener;

pub async fn execute(args: ListenArgs) -> i32 {
    let config = match load_config(&args.writer, |config| {
        if let Some(bind) = &args.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(size) = args.datagram_size {
            config.datagram_size = size;
        }
    }) {
        Ok(config) => config,
        Err(code) => return code,
    };

    eprintln!("Listening on {} (Ctrl+C to stop)...", config.bind_addr);
    eprintln!("  Output: {} ({})", config.output_dir.display(), config.format);
    eprintln!(
        "  Windows: {} channels, capacity {}, {} container",
        config.channels, config.capacity, config.container
    );

    let source = UdpListener::new(config.bind_addr.clone(), config.datagram_size);
    session::run(Box::new(source), &config).await
}
