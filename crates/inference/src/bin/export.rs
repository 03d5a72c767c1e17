use clap::Parser;
use inference::export::{ExportRequest, export};
use std::{path::PathBuf, process::ExitCode};

/// Build a TensorRT engine (FP16, fixed input shape) from ONNX weights.
#[derive(Parser, Debug)]
#[command(name = "export-engine", version, about)]
struct Args {
    /// ONNX weights to convert
    #[arg(long)]
    weights: PathBuf,

    /// Input resolution baked into the engine
    #[arg(long, default_value_t = 640)]
    imgsz: u32,

    /// Engine path (defaults to the weights path with an .engine extension)
    #[arg(long)]
    output: Option<PathBuf>,

    /// ONNX input tensor name
    #[arg(long, default_value = "images")]
    input_name: String,

    /// Builder workspace limit in MiB
    #[arg(long)]
    workspace_mib: Option<u32>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    common::setup_logging(common::Environment::from_env());

    let mut request = ExportRequest::new(args.weights, args.imgsz, args.output);
    request.input_name = args.input_name;
    request.workspace_mib = args.workspace_mib;

    match export(&request) {
        Ok(engine) => {
            tracing::info!(engine = %engine.display(), "Engine ready");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Export failed");
            ExitCode::from(e.exit_code())
        }
    }
}
