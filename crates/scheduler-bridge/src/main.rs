use std::process::ExitCode;
use tracing::{error, info, warn};

use scheduler_bridge::config::{self, BridgeConfig};
use scheduler_bridge::{logging, supervisor};

fn main() -> ExitCode {
    let log_file = config::log_file_from_env();
    if let Err(e) = logging::init_logging(log_file.as_deref()) {
        // Fall back to stderr only; losing the file is not fatal.
        let _ = logging::init_logging(None);
        warn!("{:#}", e);
    }
    logging::install_panic_hook();

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(supervisor::run(config));
    // A pending stdin read must not hold up exit.
    runtime.shutdown_background();

    match outcome {
        Ok(()) => {
            info!("Scheduler bridge stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Scheduler bridge failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
