mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;
mod storm;

fn main() {
    env_loader::load_dotenv();

    // Logging comes up before any command so config errors are still reported.
    let log_config = storm::config::load_config()
        .map(|cfg| cfg.log)
        .unwrap_or_default();
    logging::init(&log_config);

    if let Err(err) = cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
