use crate::VlmOcrApp;
use crate::generation::InputState;
use crate::region::Region;
use crate::region::raster::EncodedImage;
use crate::session::SessionListener;
use crate::ui::app::apply_endpoint_check;
use eframe::epaint::textures::TextureOptions;
use eframe::epaint::ColorImage;
use egui::{Context, Id, TextureHandle};
use image::DynamicImage;
use log::warn;
use std::sync::{Arc, LazyLock};

#[derive(Debug, Clone)]
pub enum Event {
    ImageDecoded(usize, Result<Arc<DynamicImage>, String>),
    EndpointChecked {
        available: bool,
        models: Result<Vec<String>, String>,
    },
    CropPreviewChanged(Option<EncodedImage>),
    GenerationProgress(String),
}

pub trait EventHandler {
    fn emit(&self, value: Event);

    fn get_events(&self) -> Vec<Event>;

    fn update_state(&self, state: &mut VlmOcrApp) {
        let events = self.get_events();

        for x in events {
            self.handle_event(state, x);
        }
    }

    fn handle_event(&self, state: &mut VlmOcrApp, event: Event);
}

static EVENT_LIST_ID: LazyLock<Id> = LazyLock::new(|| Id::new("EVENT_LIST"));

impl EventHandler for Context {
    fn emit(&self, value: Event) {
        self.data_mut(|x| {
            x.get_temp_mut_or_insert_with(*EVENT_LIST_ID, Vec::new)
                .push(value);
        });
        self.request_repaint();
    }

    fn get_events(&self) -> Vec<Event> {
        self.data_mut(|x| x.remove_temp(*EVENT_LIST_ID).unwrap_or_default())
    }

    fn handle_event(&self, state: &mut VlmOcrApp, event: Event) {
        match event {
            Event::ImageDecoded(index, result) => {
                state.session.image_decoded(index, result);
                if state.session.selected_index() == Some(index) {
                    state.image_panel.reload_texture(self, &state.session);
                }
            }
            Event::EndpointChecked { available, models } => {
                apply_endpoint_check(&mut state.settings, &mut state.session, available, models);
            }
            Event::CropPreviewChanged(preview) => {
                state.image_panel.crop_preview = preview.and_then(|preview| {
                    match preview.decode() {
                        Ok(image) => create_texture(self, Some(&image), "crop_preview_texture"),
                        Err(err) => {
                            warn!("Unable to show crop preview: {err}");
                            None
                        }
                    }
                });
            }
            Event::GenerationProgress(text) => {
                state
                    .output
                    .sync(&text, state.session.is_generating());
            }
        }
    }
}

/// The session reports through the frame loop: every callback becomes an
/// [`Event`] handled on the next frame.
impl SessionListener for Context {
    fn on_regions_changed(&self, _regions: &[Region]) {
        self.request_repaint();
    }

    fn on_crop_preview_changed(&self, preview: Option<&EncodedImage>) {
        self.emit(Event::CropPreviewChanged(preview.cloned()));
    }

    fn on_generation_progress(&self, cumulative_text: &str) {
        self.emit(Event::GenerationProgress(cumulative_text.to_string()));
    }

    fn on_job_state_changed(&self, _states: &[InputState]) {
        self.request_repaint();
    }
}

pub fn create_texture(
    ctx: &Context,
    image: Option<&DynamicImage>,
    name: &str,
) -> Option<TextureHandle> {
    image.map(|image| {
        let rgba = image.to_rgba8();
        ctx.load_texture(
            name,
            ColorImage::from_rgba_unmultiplied(
                [rgba.width() as usize, rgba.height() as usize],
                rgba.as_raw(),
            ),
            TextureOptions::default(),
        )
    })
}
