pub mod backend;
pub mod config;
pub mod detector;
pub mod errors;
pub mod export;
pub mod logging;
pub mod overlay;
pub mod processing;
pub mod resolver;
pub mod service;
pub mod sink;
pub mod throughput;

pub use backend::{ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::{Cli, RuntimeConfig};
pub use detector::{Detector, YoloDetector, build_detector};
pub use errors::RuntimeError;
pub use processing::post::Detection;
pub use resolver::{Backend, InferenceOptions, ResolvedBackend, resolve, resolve_backend};
pub use service::{InferenceLoop, LoopState, RunReport, TerminationReason};
pub use sink::ArtifactWriter;
pub use throughput::ThroughputCounter;
