use crate::{
    config::RuntimeConfig,
    detector::{Detector, build_detector},
    errors::RuntimeError,
    resolver::{InferenceOptions, ResolvedBackend},
    sink::ArtifactWriter,
    throughput::ThroughputCounter,
};
use capture::{Display, FfplayDisplay, FrameSource, open_source};
use std::{
    num::NonZeroU64,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

const WINDOW_TITLE: &str = "detections";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    StreamExhausted,
    UserQuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Stopping,
    Failed,
    Terminated,
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunReport {
    pub reason: TerminationReason,
    pub frames_processed: u64,
    pub throughput_reports: u64,
    pub artifacts_written: u64,
}

/// Source and window for one run, released exactly once whichever way the run ends.
struct RunResources<S: FrameSource, W: Display> {
    source: S,
    display: Option<W>,
}

impl<S: FrameSource, W: Display> Drop for RunResources<S, W> {
    fn drop(&mut self) {
        self.source.release();
        if let Some(display) = self.display.as_mut() {
            display.release();
        }
        tracing::debug!("Frame source and display released");
    }
}

/// Pull, infer, render, persist, show, count: one frame at a time.
pub struct InferenceLoop<D: Detector> {
    detector: D,
    options: InferenceOptions,
    writer: ArtifactWriter,
    log_stride: NonZeroU64,
    stop: Arc<AtomicBool>,
    source_label: String,
    state: LoopState,
}

impl<D: Detector> InferenceLoop<D> {
    pub fn new(
        detector: D,
        options: InferenceOptions,
        writer: ArtifactWriter,
        log_stride: NonZeroU64,
    ) -> Self {
        Self {
            detector,
            options,
            writer,
            log_stride,
            stop: Arc::new(AtomicBool::new(false)),
            source_label: "video source".to_string(),
            state: LoopState::Starting,
        }
    }

    /// External stop request (signal handlers), checked before each frame.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "Inference loop state");
        self.state = next;
    }

    /// Run until the source ends, the user quits, or a frame fails.
    ///
    /// Consumes the loop: a terminated loop cannot be restarted.
    pub fn run<S, W>(mut self, source: S, display: Option<W>) -> Result<RunReport, RuntimeError>
    where
        S: FrameSource,
        W: Display,
    {
        let mut resources = RunResources { source, display };
        let mut throughput = ThroughputCounter::new(self.log_stride.get(), Instant::now());

        self.transition(LoopState::Running);
        let outcome = self.drive(&mut resources, &mut throughput);

        self.transition(match outcome {
            Ok(_) => LoopState::Stopping,
            Err(_) => LoopState::Failed,
        });
        drop(resources);
        self.transition(LoopState::Terminated);

        let reason = outcome?;
        let frames_processed = throughput.frames_processed();
        match throughput.average_fps(Instant::now()) {
            Some(fps) => tracing::info!(
                ?reason,
                frames_processed,
                average_fps = %format!("{fps:.2}"),
                "Finished"
            ),
            None => tracing::info!(?reason, frames_processed, "Finished"),
        }

        Ok(RunReport {
            reason,
            frames_processed,
            throughput_reports: throughput.reports(),
            artifacts_written: self.writer.written(),
        })
    }

    fn drive<S: FrameSource, W: Display>(
        &mut self,
        resources: &mut RunResources<S, W>,
        throughput: &mut ThroughputCounter,
    ) -> Result<TerminationReason, RuntimeError> {
        let mut quit_requested = false;
        let mut index: u64 = 0;

        loop {
            if quit_requested || self.stop.load(Ordering::Relaxed) {
                tracing::info!(frame = index, "Quit requested");
                return Ok(TerminationReason::UserQuit);
            }

            let frame = match resources.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!(frames = index, "End of stream");
                    return Ok(TerminationReason::StreamExhausted);
                }
                Err(e) => {
                    return Err(RuntimeError::SourceUnavailable {
                        descriptor: self.source_label.clone(),
                        reason: e.to_string(),
                    });
                }
            };

            let span = tracing::debug_span!("frame", index);
            let _enter = span.enter();

            let detections = self.detector.infer(&frame, &self.options)?;
            let rendered = self.detector.render(&frame, &detections);

            if self.writer.should_write(index) {
                self.writer.write(&rendered, index)?;
            }

            if let Some(display) = resources.display.as_mut() {
                display
                    .present(&rendered)
                    .map_err(|e| RuntimeError::Display(e.to_string()))?;
                quit_requested = display.quit_requested();
            }

            if let Some(fps) = throughput.record(Instant::now()) {
                tracing::info!(
                    frames_processed = throughput.frames_processed(),
                    fps = %format!("{fps:.2}"),
                    "Throughput"
                );
            }

            index += 1;
        }
    }
}

/// Build everything for `config` and run the loop to completion.
///
/// The detector is built first, so a missing model fails before the source is opened.
pub fn run(
    config: &RuntimeConfig,
    resolved: &ResolvedBackend,
    stop: Arc<AtomicBool>,
) -> Result<RunReport, RuntimeError> {
    tracing::info!(
        artifact = %resolved.artifact_path.display(),
        backend = ?resolved.backend,
        source = %config.source,
        "Starting inference"
    );

    let detector = build_detector(resolved, config.device, config.iou_threshold)?;
    let writer = ArtifactWriter::new(&config.output_dir, config.artifact_save_stride)?;

    let source = open_source(&config.source, &config.capture_options())
        .map_err(|e| RuntimeError::source_unavailable(&config.source, e))?;

    let display = if config.show_live_window {
        Some(FfplayDisplay::open(WINDOW_TITLE).map_err(|e| RuntimeError::Display(e.to_string()))?)
    } else {
        None
    };

    InferenceLoop::new(detector, resolved.options, writer, config.log_stride)
        .with_stop_flag(stop)
        .with_source_label(config.source.to_string())
        .run(source, display)
}
