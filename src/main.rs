use argh::FromArgs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sensor_sd::config::Config;
use sensor_sd::signal;
use sensor_sd::updater::Updater;

/// Prometheus file-based service discovery for sensor inventories.
#[derive(Debug, FromArgs)]
struct RootCommand {
    /// print version information and exit
    #[argh(switch, short = 'v')]
    version: bool,
}

fn main() {
    let opts: RootCommand = argh::from_env();
    if opts.version {
        println!("sensor-sd {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let levels = std::env::var("SENSOR_SD_LOG").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(levels))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(message = "invalid configuration", %err);
            std::process::exit(exitcode::CONFIG);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("sensor-sd-worker")
        .enable_io()
        .enable_time()
        .build()
        .unwrap();

    let code = runtime.block_on(async move {
        info!(
            message = "start sensor-sd",
            endpoint = %config.endpoint,
            interval = ?config.interval,
            targets_file = %config.targets_file.display(),
        );

        let signal_rx = signal::watch();

        let updater = match Updater::new(config) {
            Ok(updater) => updater,
            Err(err) => {
                error!(message = "build HTTP client failed", %err);
                return exitcode::SOFTWARE;
            }
        };

        match updater.run(signal_rx).await {
            Ok(()) => {
                info!(message = "shutdown gracefully");
                exitcode::OK
            }
            Err(err) => {
                error!(message = "startup failed", %err);
                exitcode::UNAVAILABLE
            }
        }
    });

    std::process::exit(code);
}
