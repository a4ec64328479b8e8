use std::env;
use std::error::Error;
use std::process;

use streamprob::config::load_config;
use streamprob::logging::{self, Stage, init_logger};
use streamprob::report::print_summary;
use streamprob::runner;

const DEFAULT_CONFIG: &str = "streamprob.toml";

fn main() -> Result<(), Box<dyn Error>> {
    let config_path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = load_config(&config_path)?;

    init_logger(
        config.output.log_level()?,
        config.output.log_file.as_deref(),
        config.output.console_timestamps,
    );
    logging::info(Stage::System, None, &format!("Using configuration {}", config_path));

    let (run, report) = match runner::run(&config) {
        Ok(done) => done,
        Err(e) => {
            logging::error(Stage::System, None, &format!("run aborted [{}]: {}", e.class(), e));
            return Err(e.into());
        }
    };
    print_summary(&report);

    if run.merged_count() == 0 && !run.outcomes.is_empty() {
        process::exit(2);
    }
    Ok(())
}
