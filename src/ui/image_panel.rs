use super::event::{Event, EventHandler, create_texture};
use super::{REGION_BORDER_ALPHA, REGION_FILL_ALPHA, region_color};
use crate::region::RegionId;
use crate::region::geometry::{Rect, Size, to_display};
use crate::session::{ImageState, Session};
use crate::shutdown::TASK_TRACKER;
use anyhow::{Context as _, Result};
use eframe::epaint::StrokeKind;
use egui::{Color32, Context, Pos2, RichText, Sense, TextureHandle, Vec2};
use image::DynamicImage;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

pub enum ImageSource {
    Path(PathBuf),
    Bytes { name: String, bytes: Arc<[u8]> },
}

impl ImageSource {
    pub fn name(&self) -> String {
        match self {
            ImageSource::Path(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned()),
            ImageSource::Bytes { name, .. } => name.clone(),
        }
    }

    fn decode(self) -> Result<DynamicImage> {
        match self {
            ImageSource::Path(path) => {
                image::open(&path).with_context(|| format!("Unable to open image {path:?}"))
            }
            ImageSource::Bytes { name, bytes } => image::load_from_memory(&bytes)
                .with_context(|| format!("Unable to decode image {name}")),
        }
    }
}

/// Decode off the frame loop, the result arrives as [`Event::ImageDecoded`].
pub fn load_image(ctx: &Context, index: usize, source: ImageSource) {
    let ctx = ctx.clone();
    TASK_TRACKER.spawn(async move {
        debug!("Decoding image {index}");
        let result = match tokio::task::spawn_blocking(move || source.decode()).await {
            Ok(result) => result.map(Arc::new).map_err(|err| format!("{err:#}")),
            Err(err) => Err(err.to_string()),
        };
        ctx.emit(Event::ImageDecoded(index, result));
    });
}

/// The selected image with its crop drag, region overlays and region chips.
#[derive(Default)]
pub struct ImagePanel {
    texture: Option<TextureHandle>,
    pub crop_preview: Option<TextureHandle>,

    drag_start: Option<Vec2>,
    /// Display space crop together with the display size it was drawn at.
    pending_crop: Option<(Rect, Size)>,
}

impl ImagePanel {
    pub fn reload_texture(&mut self, ctx: &Context, session: &Session) {
        let image = session.selected_image().and_then(|image| image.decoded());
        self.texture = create_texture(ctx, image, "image_texture");
        self.drag_start = None;
        self.pending_crop = None;
    }

    pub fn has_pending_crop(&self) -> bool {
        self.pending_crop.is_some()
    }

    pub fn save_pending_crop(&mut self, session: &mut Session) {
        let Some((rect, display_size)) = self.pending_crop.take() else {
            return;
        };
        match session.save_region(rect, display_size) {
            Ok(id) => info!("Saved {id}"),
            Err(err) => session.report_error(err.to_string()),
        }
    }

    pub fn clear_pending_crop(&mut self) {
        self.pending_crop = None;
    }

    pub fn show(&mut self, ui: &mut egui::Ui, session: &mut Session) {
        self.show_region_chips(ui, session);

        let Some(texture) = self.texture.clone() else {
            let text = match session.selected_image().map(|image| &image.state) {
                None => "Drop image files onto the window".to_string(),
                Some(ImageState::Pending) => "Loading image...".to_string(),
                Some(ImageState::Failed(err)) => format!("Image could not be loaded: {err}"),
                Some(ImageState::Ready(_)) => "No Image".to_string(),
            };
            ui.centered_and_justified(|ui| ui.label(text));
            return;
        };

        let response = ui.add(
            egui::Image::new(&texture)
                .shrink_to_fit()
                .sense(Sense::click_and_drag()),
        );
        let display_size = Size::new(response.rect.width(), response.rect.height());

        if !session.is_generating() {
            self.update_drag(&response, display_size);
        }
        self.draw_regions(ui, response.rect.min, display_size, session);

        if let Some(preview) = &self.crop_preview {
            ui.separator();
            ui.label("Last saved region:");
            ui.add(
                egui::Image::new(preview)
                    .max_height(160.0)
                    .corner_radius(4.0),
            );
        }
    }

    fn show_region_chips(&mut self, ui: &mut egui::Ui, session: &mut Session) {
        let mut delete: Option<RegionId> = None;
        ui.horizontal_wrapped(|ui| {
            for (i, region) in session.regions().iter().enumerate() {
                let text = RichText::new(format!("Region {} \u{2716}", i + 1))
                    .color(region_color(i, 1.0));
                let button = egui::Button::new(text).fill(region_color(i, REGION_FILL_ALPHA));
                if ui
                    .add_enabled(!session.is_generating(), button)
                    .on_hover_text("Delete region")
                    .clicked()
                {
                    delete = Some(region.id());
                }
            }
        });

        if let Some(id) = delete {
            session.delete_region(id);
        }
    }

    fn update_drag(&mut self, response: &egui::Response, display_size: Size) {
        let origin = response.rect.min;

        if response.drag_started() {
            if let Some(mpos) = response.interact_pointer_pos() {
                self.drag_start = Some(response.rect.clamp(mpos) - origin);
            }
        }

        if response.dragged() || response.drag_stopped() {
            if let (Some(start), Some(mpos)) = (self.drag_start, response.interact_pointer_pos()) {
                let end = response.rect.clamp(mpos) - origin;
                let rect = Rect::from_corners((start.x, start.y), (end.x, end.y));
                self.pending_crop = (!rect.is_empty()).then_some((rect, display_size));
            }
            if response.drag_stopped() {
                self.drag_start = None;
            }
        }
    }

    fn draw_regions(&self, ui: &egui::Ui, origin: Pos2, display_size: Size, session: &Session) {
        let painter = ui.painter();

        for (i, region) in session.regions().iter().enumerate() {
            let rect = to_screen(origin, region.geometry.display_rect(display_size));
            painter.rect(
                rect,
                0.0,
                region_color(i, REGION_FILL_ALPHA),
                (2.0, region_color(i, REGION_BORDER_ALPHA)),
                StrokeKind::Middle,
            );
            painter.text(
                rect.left_top() + Vec2::new(4.0, 2.0),
                egui::Align2::LEFT_TOP,
                format!("{}", i + 1),
                egui::FontId::proportional(14.0),
                region_color(i, 1.0),
            );
        }

        if let Some((rect, drawn_at)) = self.pending_crop {
            // rescale in case the window changed size since the drag
            let rect = to_display(rect, drawn_at, display_size);
            painter.rect(
                to_screen(origin, rect),
                0.0,
                Color32::TRANSPARENT,
                (1.5, Color32::WHITE),
                StrokeKind::Middle,
            );
        }
    }
}

fn to_screen(origin: Pos2, rect: Rect) -> egui::Rect {
    egui::Rect::from_min_size(
        origin + Vec2::new(rect.x, rect.y),
        Vec2::new(rect.width, rect.height),
    )
}
