use moodcam_core::{AnalysisResult, EmotionDetector, ImageSource, Pipeline, PipelineError, ScaleFactor};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Detector as owned by the engine thread.
pub type BoxedDetector = Box<dyn EmotionDetector + Send>;

/// Work items for the engine thread.
enum EngineRequest {
    Analyze {
        source: ImageSource,
        reply: oneshot::Sender<Result<AnalysisResult, PipelineError>>,
    },
}

/// Cheap to clone; every clone feeds the same engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Queue one frame for analysis and wait for the result.
    ///
    /// Once accepted, the job runs to completion even if the caller
    /// stops waiting.
    pub async fn analyze(&self, source: ImageSource) -> Result<AnalysisResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                source,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let result = reply_rx.await.map_err(|_| EngineError::ChannelClosed)?;
        Ok(result?)
    }
}

/// Move an already-loaded detector onto its own OS thread.
///
/// The thread reuses the detector for every request and exits once all
/// handles are dropped.
pub fn spawn_engine(detector: BoxedDetector, scale: ScaleFactor, queue_depth: usize) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));
    let mut pipeline = Pipeline::new(detector, scale);

    std::thread::Builder::new()
        .name("moodcam-engine".into())
        .spawn(move || {
            tracing::info!(scale = pipeline.scale_factor().get(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { source, reply } => {
                        let _ = reply.send(analyze_contained(&mut pipeline, &source));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Run one analysis, turning a panic into an error for this frame only.
///
/// The detector stays in service afterwards; the next request gets a
/// fresh call on the same instance.
fn analyze_contained(
    pipeline: &mut Pipeline<BoxedDetector>,
    source: &ImageSource,
) -> Result<AnalysisResult, PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(|| pipeline.analyze(source))).unwrap_or_else(|payload| {
        let msg = panic_message(payload.as_ref());
        tracing::error!(panic = %msg, "analysis panicked");
        Err(PipelineError::Aborted(msg))
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
impl EngineHandle {
    /// A handle whose engine thread is already gone.
    pub(crate) fn closed() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}
