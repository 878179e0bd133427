mod config;

use clap::{Args, Parser};
use config::{CommonConfig, Config, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::describe;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
enum CliCommand {
    /// Serve upsert and lookup requests
    Bridge(ConfigArgs),
    /// Load and validate the config file without serving
    CheckConfig(ConfigArgs),
    /// List every metric the bridge emits
    Metrics,
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_file: PathBuf,
}

fn main() {
    let cli = CliCommand::parse();

    match &cli {
        CliCommand::Bridge(args) => {
            let config = load_config(&args.config_file);
            let Some(bridge_config) = config.bridge else {
                eprintln!("config file has no bridge section");
                process::exit(1);
            };

            let _sentry = match init_logging(config.common.logging.as_ref()) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("could not initialise logging: {e}");
                    process::exit(1);
                }
            };
            if let Err(e) = init_metrics(&config.common) {
                eprintln!("could not initialise metrics: {e}");
                process::exit(1);
            }

            let rt = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("could not start runtime: {e}");
                    process::exit(1);
                }
            };

            tracing::info!("starting bridge");
            if let Err(e) = rt.block_on(bridge::run(bridge_config)) {
                tracing::error!(error = %e, "bridge stopped");
                process::exit(1);
            }
        }
        CliCommand::CheckConfig(args) => {
            let config = load_config(&args.config_file);
            match config.bridge.map(|bridge_config| bridge_config.validate()) {
                Some(Ok(())) => println!("config ok"),
                Some(Err(e)) => {
                    eprintln!("invalid bridge config: {e}");
                    process::exit(1);
                }
                None => {
                    eprintln!("config file has no bridge section");
                    process::exit(1);
                }
            }
        }
        CliCommand::Metrics => {
            println!("{}", describe(bridge::metrics_defs::ALL_METRICS));
        }
    }
}

fn load_config(path: &std::path::Path) -> Config {
    match Config::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            process::exit(1);
        }
    }
}

/// Installs the global subscriber. The returned guard flushes sentry on drop
/// and has to outlive the runtime.
fn init_logging(
    logging: Option<&LoggingConfig>,
) -> Result<Option<sentry::ClientInitGuard>, sentry::types::ParseDsnError> {
    let guard = match logging {
        Some(logging) => {
            let dsn: sentry::types::Dsn = logging.sentry_dsn.parse()?;
            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                environment: logging.environment.clone().map(Into::into),
                ..Default::default()
            }))
        }
        None => None,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    Ok(guard)
}

fn init_metrics(common: &CommonConfig) -> Result<(), String> {
    let Some(MetricsConfig {
        statsd_host,
        statsd_port,
        prefix,
    }) = &common.metrics
    else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(statsd_host.as_str(), *statsd_port)
        .build(Some(prefix.as_str()))
        .map_err(|e| e.to_string())?;
    metrics::set_global_recorder(recorder).map_err(|e| e.to_string())?;

    tracing::info!(%statsd_host, statsd_port, "metrics exported to statsd");
    Ok(())
}
