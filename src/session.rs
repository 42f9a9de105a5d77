//! The orchestrating session: uploaded images, the regions of the selected
//! image, the active job and the single visible notice.

use crate::error::{GenerationError, RasterError, ValidationError};
use crate::export::write_text;
use crate::generation::{
    GenerationInput, GenerationJob, GenerationOrchestrator, InputState, JobEvent, JobHandle,
    JobId, RequestParams,
};
use crate::inference::InferenceClient;
use crate::region::geometry::{Rect, RegionGeometry, Size, to_natural};
use crate::region::raster::{EncodedImage, rasterize, rasterize_whole};
use crate::region::{Region, RegionId, RegionStore};
use image::DynamicImage;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

pub const GENERATION_FAILED: &str = "Failed to generate text from image. Please try again.";
pub const ENDPOINT_UNAVAILABLE_TITLE: &str = "Cannot Connect to Ollama";
pub const ENDPOINT_UNAVAILABLE: &str = "Ollama service is not running or cannot be reached. Please follow the instructions below to start Ollama.";

/// One step of the first time setup shown with the unavailable notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupStep {
    pub description: &'static str,
    pub command: Option<&'static str>,
}

pub const SETUP_STEPS: [SetupStep; 4] = [
    SetupStep {
        description: "Install Ollama from https://ollama.com",
        command: None,
    },
    SetupStep {
        description: "Pull a vision model, e.g. granite3.2-vision or gemma3",
        command: Some("ollama pull granite3.2-vision"),
    },
    SetupStep {
        description: "Start the Ollama service",
        command: Some("ollama serve"),
    },
    SetupStep {
        description: "For Ollama on another machine, listen on all interfaces and set the endpoint URL",
        command: Some("OLLAMA_HOST=0.0.0.0 ollama serve"),
    },
];

pub const SETUP_FOOTER: &str = "After starting Ollama, press \u{21bb} next to the endpoint to reconnect.";

/// Presentation callbacks. Every method defaults to doing nothing.
pub trait SessionListener: Send {
    fn on_regions_changed(&self, _regions: &[Region]) {}
    fn on_crop_preview_changed(&self, _preview: Option<&EncodedImage>) {}
    fn on_generation_progress(&self, _cumulative_text: &str) {}
    fn on_job_state_changed(&self, _states: &[InputState]) {}
}

impl SessionListener for () {}

#[derive(Debug, Clone)]
pub enum ImageState {
    Pending,
    Ready(Arc<DynamicImage>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub state: ImageState,
}

impl SourceImage {
    pub fn decoded(&self) -> Option<&DynamicImage> {
        match &self.state {
            ImageState::Ready(image) => Some(image),
            _ => None,
        }
    }

    pub fn natural_size(&self) -> Option<Size> {
        self.decoded()
            .map(|image| Size::new(image.width() as f32, image.height() as f32))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Setup problem, stays until dismissed.
    Warning(String),
    /// The endpoint cannot be reached; comes with [`SETUP_STEPS`].
    Unavailable,
    Error(String),
}

impl Notice {
    pub fn title(&self) -> &str {
        match self {
            Notice::Warning(_) => "Warning",
            Notice::Unavailable => ENDPOINT_UNAVAILABLE_TITLE,
            Notice::Error(_) => "Error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::Warning(message) | Notice::Error(message) => message,
            Notice::Unavailable => ENDPOINT_UNAVAILABLE,
        }
    }

    pub fn setup_steps(&self) -> &'static [SetupStep] {
        match self {
            Notice::Unavailable => &SETUP_STEPS,
            _ => &[],
        }
    }
}

pub struct Session {
    orchestrator: GenerationOrchestrator,
    listener: Box<dyn SessionListener>,
    images: Vec<SourceImage>,
    selected: Option<usize>,
    regions: RegionStore,
    crop_preview: Option<EncodedImage>,
    job: Option<GenerationJob>,
    handle: Option<JobHandle>,
    notice: Option<Notice>,
}

impl Session {
    pub fn new(client: Arc<dyn InferenceClient>, listener: Box<dyn SessionListener>) -> Self {
        Self {
            orchestrator: GenerationOrchestrator::new(client),
            listener,
            images: vec![],
            selected: None,
            regions: RegionStore::default(),
            crop_preview: None,
            job: None,
            handle: None,
            notice: None,
        }
    }

    /// Jobs started afterwards use `client`; a running job keeps its own.
    pub fn set_client(&mut self, client: Arc<dyn InferenceClient>) {
        self.orchestrator = GenerationOrchestrator::new(client);
    }

    // Images

    pub fn add_image(&mut self, name: impl Into<String>) -> usize {
        self.images.push(SourceImage {
            name: name.into(),
            state: ImageState::Pending,
        });
        self.images.len() - 1
    }

    pub fn image_decoded(&mut self, index: usize, result: Result<Arc<DynamicImage>, String>) {
        let Some(image) = self.images.get_mut(index) else {
            warn!("Decoded image {index} does not exist");
            return;
        };
        image.state = match result {
            Ok(decoded) => {
                info!(
                    "Decoded '{}' ({}x{})",
                    image.name,
                    decoded.width(),
                    decoded.height()
                );
                ImageState::Ready(decoded)
            }
            Err(err) => {
                warn!("Failed to decode '{}': {err}", image.name);
                ImageState::Failed(err)
            }
        };
    }

    /// Switching the active image drops all regions of the previous one.
    pub fn select_image(&mut self, index: usize) {
        if index >= self.images.len() {
            return;
        }
        self.selected = Some(index);
        self.reset_regions();
    }

    pub fn images(&self) -> &[SourceImage] {
        &self.images
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_image(&self) -> Option<&SourceImage> {
        self.selected.and_then(|index| self.images.get(index))
    }

    // Regions

    /// Capture `display_rect`, drawn on the selected image rendered at `display_size`.
    pub fn save_region(&mut self, display_rect: Rect, display_size: Size) -> Result<RegionId, RasterError> {
        let image = self
            .selected_image()
            .and_then(SourceImage::decoded)
            .ok_or(RasterError::ImageNotReady)?;
        let natural_size = Size::new(image.width() as f32, image.height() as f32);

        let rect = to_natural(display_rect, display_size, natural_size);
        let raster = rasterize(Some(image), rect)?;

        let id = self
            .regions
            .add(RegionGeometry { rect, natural_size }, raster.clone());
        debug!("Saved {id} at {rect:?}");

        self.set_crop_preview(Some(raster));
        self.listener.on_regions_changed(self.regions.regions());
        Ok(id)
    }

    pub fn delete_region(&mut self, id: RegionId) -> bool {
        if self.regions.remove(id).is_none() {
            return false;
        }

        let preview = self.regions.last().map(|region| region.raster().clone());
        self.set_crop_preview(preview);
        self.listener.on_regions_changed(self.regions.regions());
        true
    }

    pub fn reset_regions(&mut self) {
        self.regions.reset_all();
        self.set_crop_preview(None);
        self.listener.on_regions_changed(self.regions.regions());
    }

    pub fn regions(&self) -> &[Region] {
        self.regions.regions()
    }

    pub fn crop_preview(&self) -> Option<&EncodedImage> {
        self.crop_preview.as_ref()
    }

    fn set_crop_preview(&mut self, preview: Option<EncodedImage>) {
        if self.crop_preview == preview {
            return;
        }
        self.crop_preview = preview;
        self.listener
            .on_crop_preview_changed(self.crop_preview.as_ref());
    }

    // Generation

    pub fn start_generation(&mut self, params: RequestParams) -> Result<JobId, GenerationError> {
        let result = self.try_start(params);
        if let Err(err) = &result {
            warn!("Generation not started: {err}");
            self.notice = Some(Notice::Error(err.to_string()));
        }
        result
    }

    fn try_start(&mut self, params: RequestParams) -> Result<JobId, GenerationError> {
        if self.is_generating() {
            return Err(ValidationError::JobAlreadyActive.into());
        }
        if params.model.trim().is_empty() {
            return Err(ValidationError::NoModelSelected.into());
        }

        let inputs = self.collect_inputs()?;
        let handle = self.orchestrator.start(inputs, params)?;
        let job = GenerationJob::new(handle.id(), handle.input_count());
        let id = handle.id();
        info!("Started {id} over {} inputs", handle.input_count());

        self.listener.on_generation_progress(job.cumulative_text());
        self.listener.on_job_state_changed(job.states());
        self.job = Some(job);
        self.handle = Some(handle);
        Ok(id)
    }

    /// Captured regions in order, or the whole selected image when there are none.
    fn collect_inputs(&self) -> Result<Vec<GenerationInput>, GenerationError> {
        if !self.regions.is_empty() {
            return Ok(self
                .regions
                .regions()
                .iter()
                .map(|region| GenerationInput::from(region.raster().clone()))
                .collect());
        }

        let image = self.selected_image().ok_or(ValidationError::NoInput)?;
        let raster = rasterize_whole(image.decoded())?;
        Ok(vec![raster.into()])
    }

    pub fn stop_generation(&mut self) {
        if let Some(handle) = &self.handle {
            handle.cancel();
        }
    }

    pub fn is_generating(&self) -> bool {
        self.handle.is_some()
    }

    /// Fold every queued job event into the active job. Returns whether anything changed.
    pub fn poll_job(&mut self) -> bool {
        let (Some(handle), Some(job)) = (self.handle.as_mut(), self.job.as_mut()) else {
            return false;
        };

        let mut changed = false;
        let mut finished = false;
        while let Some(event) = handle.try_next() {
            finished = event.is_terminal();
            if matches!(event, JobEvent::Failed(_)) {
                self.notice = Some(Notice::Error(GENERATION_FAILED.to_string()));
            }

            let update = job.apply(event);
            if update.text_changed {
                self.listener.on_generation_progress(job.cumulative_text());
            }
            if update.states_changed {
                self.listener.on_job_state_changed(job.states());
            }
            changed |= update.text_changed || update.states_changed;

            if finished {
                break;
            }
        }

        if finished {
            info!("{} finished: {:?}", job.id(), job.outcome());
            self.handle = None;
        }
        changed
    }

    pub fn job(&self) -> Option<&GenerationJob> {
        self.job.as_ref()
    }

    pub fn generated_text(&self) -> &str {
        self.job.as_ref().map_or("", GenerationJob::cumulative_text)
    }

    /// Forget the generated text of a finished job.
    pub fn clear_generated(&mut self) {
        if self.is_generating() {
            return;
        }
        self.job = None;
        self.listener.on_generation_progress("");
    }

    /// Write the (possibly edited) output text to disk. Failures become the notice.
    pub fn export_text(&mut self, text: &str) -> Option<PathBuf> {
        match write_text(text) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("Export failed: {err:#}");
                self.notice = Some(Notice::Error(format!("Export failed: {err:#}")));
                None
            }
        }
    }

    // Notices

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn report_warning(&mut self, message: impl Into<String>) {
        self.notice = Some(Notice::Warning(message.into()));
    }

    pub fn report_error(&mut self, message: impl Into<String>) {
        self.notice = Some(Notice::Error(message.into()));
    }

    pub fn set_availability(&mut self, available: bool) {
        if available {
            if matches!(self.notice, Some(Notice::Warning(_) | Notice::Unavailable)) {
                self.notice = None;
            }
        } else {
            warn!("Inference endpoint unavailable");
            self.notice = Some(Notice::Unavailable);
        }
    }
}
