use crate::error::InferenceError;
use crate::region::raster::EncodedImage;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod demux;
pub mod job;
pub mod orchestrator;

pub use demux::{Demultiplexed, InputView, StreamDemultiplexer};
pub use job::{GenerationJob, JobOutcome};
pub use orchestrator::{GenerationOrchestrator, JobHandle, RequestParams};

/// Appended to the stream when the user stops a job.
pub const STOP_NOTE: &str = "[Generation stopped by user]";

/// Marker that opens the text of input `order` (1-based) in the stream.
pub fn region_marker(order: usize) -> String {
    format!("Region {order}:\n")
}

/// Separator appended between two inputs, opening input `order` (1-based).
pub fn region_boundary(order: usize) -> String {
    format!("\n\n{}", region_marker(order))
}

pub fn stop_suffix() -> String {
    format!("\n\n{STOP_NOTE}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Progress of a single input. Only ever moves forward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, strum::Display, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum InputState {
    #[default]
    Queued,
    Generating,
    Complete,
}

/// One image sent to the endpoint: a captured region, or the whole image.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub image: EncodedImage,
}

impl From<EncodedImage> for GenerationInput {
    fn from(image: EncodedImage) -> Self {
        Self { image }
    }
}

#[derive(Debug)]
pub enum JobEvent {
    InputStarted { index: usize },
    /// Text appended to the cumulative stream while `index` is processed,
    /// markers included.
    Append { index: usize, text: String },
    InputFinished { index: usize },
    Cancelled,
    Failed(InferenceError),
    Completed,
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::Cancelled | JobEvent::Failed(_) | JobEvent::Completed
        )
    }
}
