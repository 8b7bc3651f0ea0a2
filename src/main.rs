//! Solar forecast service entry point: CLI wiring, artifact loading, serving.

use std::path::{Path, PathBuf};
use std::process;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use solar_forecast::artifact::ArtifactStore;
use solar_forecast::config::ServiceConfig;
use solar_forecast::prediction_log::PredictionLogger;
use solar_forecast::service::InferenceService;
use solar_forecast::validation::ConstraintValidator;

/// Environment variable holding the log filter, e.g. `info,solar_forecast=debug`.
const LOG_ENV: &str = "SOLAR_FORECAST_LOG";

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<PathBuf>,
    bind: Option<String>,
    artifacts_dir: Option<PathBuf>,
    model_version: Option<String>,
    log_path: Option<PathBuf>,
    check: bool,
}

fn print_help() {
    eprintln!("solar-forecast: solar power inference service");
    eprintln!();
    eprintln!("Usage: solar-forecast [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load service configuration from a TOML file");
    eprintln!("  --bind <addr>            Listen address (default: 127.0.0.1:8000)");
    eprintln!("  --artifacts <dir>        Directory holding model/scaler artifacts");
    eprintln!("  --model-version <v>      Artifact version to serve (default: v2)");
    eprintln!("  --log-path <path>        Prediction log CSV file");
    eprintln!("  --check                  Load and verify artifacts, then exit");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Log verbosity is read from {LOG_ENV} (falls back to RUST_LOG, then info).");
}

fn next_value(args: &[String], i: &mut usize, flag: &str, what: &str) -> String {
    *i += 1;
    if let Some(value) = args.get(*i) {
        value.clone()
    } else {
        eprintln!("error: {flag} requires {what}");
        process::exit(1);
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        bind: None,
        artifacts_dir: None,
        model_version: None,
        log_path: None,
        check: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                cli.config_path = Some(next_value(&args, &mut i, "--config", "a path").into());
            }
            "--bind" => {
                cli.bind = Some(next_value(&args, &mut i, "--bind", "an address"));
            }
            "--artifacts" => {
                cli.artifacts_dir =
                    Some(next_value(&args, &mut i, "--artifacts", "a directory").into());
            }
            "--model-version" => {
                cli.model_version = Some(next_value(&args, &mut i, "--model-version", "a version"));
            }
            "--log-path" => {
                cli.log_path = Some(next_value(&args, &mut i, "--log-path", "a path").into());
            }
            "--check" => {
                cli.check = true;
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Resolves configuration: file (or defaults), then CLI overrides.
fn load_config(cli: CliArgs) -> ServiceConfig {
    let mut config = if let Some(ref path) = cli.config_path {
        match ServiceConfig::from_toml_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        }
    } else {
        ServiceConfig::default()
    };

    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = cli.artifacts_dir {
        config.artifacts.dir = dir;
    }
    if let Some(version) = cli.model_version {
        config.artifacts.model_version = version;
    }
    if let Some(path) = cli.log_path {
        config.prediction_log.path = path;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        process::exit(1);
    }
    config
}

fn open_logger(path: &Path) -> PredictionLogger {
    match PredictionLogger::open(path) {
        Ok(logger) => logger,
        Err(e) => {
            // Predictions are still served; appends retry the open.
            warn!(error = %e, "prediction log unavailable at startup");
            PredictionLogger::new(path)
        }
    }
}

fn main() {
    let cli = parse_args();
    init_tracing();

    let check_only = cli.check;
    let config = load_config(cli);

    let store = ArtifactStore::new(&config.artifacts.dir, &config.artifacts.model_version);
    let service = InferenceService::new(
        store,
        ConstraintValidator::new(config.bounds.clone()),
        open_logger(&config.prediction_log.path),
    );

    if let Err(e) = service.start() {
        error!(error = %e, "cannot load model artifacts, refusing to start");
        process::exit(1);
    }

    if check_only {
        info!(
            version = %config.artifacts.model_version,
            "artifacts verified, exiting (--check)"
        );
        return;
    }

    #[cfg(feature = "api")]
    {
        use std::sync::Arc;

        let addr = match config.bind_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        };
        let state = Arc::new(solar_forecast::api::AppState { service });
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            error!("failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(solar_forecast::api::serve(state, addr)) {
            error!("server error: {e}");
            process::exit(1);
        }
    }

    #[cfg(not(feature = "api"))]
    {
        drop(service);
        error!("built without the `api` feature; only --check is available");
        process::exit(1);
    }
}
