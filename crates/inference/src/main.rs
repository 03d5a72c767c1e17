use clap::Parser;
use inference::{
    Cli, RuntimeConfig, RuntimeError, logging::init_logging, resolve_backend, service,
};
use std::{
    process::ExitCode,
    sync::{Arc, atomic::AtomicBool},
};

#[cfg(not(any(feature = "ort-backend", feature = "trt-backend")))]
compile_error!("At least one backend feature must be enabled: 'ort-backend' or 'trt-backend'");

fn main() -> ExitCode {
    let config = match RuntimeConfig::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let _logging = match init_logging("infer", config.environment, config.otel_endpoint.as_deref())
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Inference stopped");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(config: &RuntimeConfig) -> Result<(), RuntimeError> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop)).map_err(|e| {
            RuntimeError::Startup(format!("cannot install signal handler: {e}"))
        })?;
    }

    let resolved = resolve_backend(config);
    tracing::info!(
        artifact = %resolved.artifact_path.display(),
        accelerated = resolved.is_accelerated(),
        options = ?resolved.options,
        "Backend resolved"
    );

    let report = service::run(config, &resolved, stop)?;
    tracing::info!(report = ?report, "Run complete");
    Ok(())
}
