use super::load_config;
use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = match load_config(&args.writer, |config| {
        if let Some(bind) = &args.bind {
            config.bind_addr = bind.clone();
        }
    }) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match output::print_json(&config, args.compact) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::RUNTIME_ERROR
        }
    }
}
