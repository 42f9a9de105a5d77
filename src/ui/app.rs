use super::event::{Event, EventHandler};
use super::image_panel::{ImagePanel, ImageSource, load_image};
use super::settings::{AppSettings, EndpointStatus, SettingsAction};
use super::{notice, output_panel};
use crate::export::OutputText;
use crate::inference::{InferenceClient, OllamaClient};
use crate::session::{ImageState, Session};
use crate::shutdown::{TASK_TRACKER, shutdown_tasks};
use anyhow::{Context as _, Result};
use egui::Context;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

pub struct VlmOcrApp {
    pub settings: AppSettings,
    pub session: Session,
    pub output: OutputText,
    pub(crate) image_panel: ImagePanel,
}

impl VlmOcrApp {
    pub fn new(cc: &eframe::CreationContext<'_>, images: Vec<PathBuf>) -> Result<Self> {
        let settings: AppSettings = cc
            .storage
            .and_then(|storage| eframe::get_value(storage, eframe::APP_KEY))
            .unwrap_or_default();

        let ctx = &cc.egui_ctx;
        let client = Arc::new(
            OllamaClient::new(&settings.base_url).context("Unable to create inference client")?,
        );
        let session = Session::new(client.clone(), Box::new(ctx.clone()));

        let mut app = Self {
            settings,
            session,
            output: OutputText::default(),
            image_panel: ImagePanel::default(),
        };

        check_endpoint(ctx, client);
        app.add_images(ctx, images.into_iter().map(ImageSource::Path).collect());

        Ok(app)
    }

    /// Rebuild the client for the configured base URL and query it again.
    fn reconnect(&mut self, ctx: &Context) {
        info!("Connecting to {}", self.settings.base_url);
        match OllamaClient::new(&self.settings.base_url) {
            Ok(client) => {
                let client = Arc::new(client);
                self.session.set_client(client.clone());
                self.settings.endpoint_status = EndpointStatus::Checking;
                check_endpoint(ctx, client);
            }
            Err(err) => {
                warn!("Unable to create client: {err}");
                self.session.report_warning(err.to_string());
            }
        }
    }

    fn add_images(&mut self, ctx: &Context, sources: Vec<ImageSource>) {
        let mut first = None;
        for source in sources {
            let index = self.session.add_image(source.name());
            first.get_or_insert(index);
            load_image(ctx, index, source);
        }

        if let Some(index) = first {
            if !self.session.is_generating() {
                self.select_image(ctx, index);
            }
        }
    }

    fn select_image(&mut self, ctx: &Context, index: usize) {
        self.session.select_image(index);
        self.image_panel.reload_texture(ctx, &self.session);
    }

    fn handle_dropped_files(&mut self, ctx: &Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        if dropped.is_empty() {
            return;
        }

        let sources: Vec<ImageSource> = dropped
            .into_iter()
            .filter_map(|file| match (file.path, file.bytes) {
                (Some(path), _) => Some(ImageSource::Path(path)),
                (None, Some(bytes)) => Some(ImageSource::Bytes {
                    name: file.name,
                    bytes,
                }),
                (None, None) => None,
            })
            .collect();
        info!("{} files dropped", sources.len());
        self.add_images(ctx, sources);
    }

    fn show(&mut self, ctx: &Context) {
        if ctx.input(|i| i.viewport().close_requested()) {
            shutdown_tasks();
        }

        self.handle_dropped_files(ctx);
        if self.session.poll_job() {
            ctx.request_repaint();
        }
        if self.session.is_generating() {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }

        notice::show(ctx, &mut self.session);

        egui::SidePanel::left("sidebar")
            .resizable(true)
            .default_width(280.0)
            .show_animated(ctx, self.settings.show_sidebar, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.show_image_list(ui, ctx);
                    ui.separator();
                    if self.settings.show(ui) == SettingsAction::Reconnect {
                        self.reconnect(ctx);
                    }
                });
            });

        egui::SidePanel::right("output")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                output_panel::show(ui, &mut self.output, &mut self.session);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_toolbar(ui);
            ui.separator();
            self.image_panel.show(ui, &mut self.session);
        });
    }

    fn show_image_list(&mut self, ui: &mut egui::Ui, ctx: &Context) {
        ui.heading("Images");
        if self.session.images().is_empty() {
            ui.label("Drop image files onto the window");
        }

        let mut selected = None;
        let locked = self.session.is_generating();
        for (i, image) in self.session.images().iter().enumerate() {
            let label = match &image.state {
                ImageState::Pending => format!("{} (loading)", image.name),
                ImageState::Ready(_) => image.name.clone(),
                ImageState::Failed(_) => format!("{} (failed)", image.name),
            };
            let is_selected = self.session.selected_index() == Some(i);
            let response = ui
                .add_enabled_ui(!locked, |ui| ui.selectable_label(is_selected, label))
                .inner;
            if response.clicked() && !is_selected {
                selected = Some(i);
            }
        }

        if let Some(index) = selected {
            self.select_image(ctx, index);
        }
    }

    fn show_toolbar(&mut self, ui: &mut egui::Ui) {
        let generating = self.session.is_generating();
        ui.horizontal(|ui| {
            if ui.button("\u{2630}").on_hover_text("Toggle sidebar").clicked() {
                self.settings.show_sidebar = !self.settings.show_sidebar;
            }

            if ui
                .add_enabled(
                    !generating && self.image_panel.has_pending_crop(),
                    egui::Button::new("Save Region"),
                )
                .clicked()
            {
                self.image_panel.save_pending_crop(&mut self.session);
            }

            if ui
                .add_enabled(
                    !generating && !self.session.regions().is_empty(),
                    egui::Button::new("Clear Regions"),
                )
                .clicked()
            {
                self.image_panel.clear_pending_crop();
                self.session.reset_regions();
            }

            if generating {
                if ui.button("Stop").clicked() {
                    self.session.stop_generation();
                }
            } else if ui.button("Generate").clicked() {
                let params = self.settings.request_params();
                if let Err(err) = self.session.start_generation(params) {
                    warn!("Generate rejected: {err}");
                }
            }

            if generating {
                ui.add(egui::Spinner::new());
            }
        });
    }
}

fn check_endpoint(ctx: &Context, client: Arc<dyn InferenceClient>) {
    let ctx = ctx.clone();
    TASK_TRACKER.spawn(async move {
        let (available, models) = query_endpoint(client.as_ref()).await;
        ctx.emit(Event::EndpointChecked { available, models });
    });
}

/// Availability and, if reachable, the listed models of `client`.
pub(crate) async fn query_endpoint(
    client: &dyn InferenceClient,
) -> (bool, Result<Vec<String>, String>) {
    let available = client.check_availability().await;
    let models = if available {
        client.list_models().await.map_err(|err| err.to_string())
    } else {
        Err("endpoint unavailable".to_string())
    };
    (available, models)
}

/// Folds the result of [`query_endpoint`] into the settings and the session notice.
pub(crate) fn apply_endpoint_check(
    settings: &mut AppSettings,
    session: &mut Session,
    available: bool,
    models: Result<Vec<String>, String>,
) {
    session.set_availability(available);
    settings.endpoint_status = if available {
        EndpointStatus::Available
    } else {
        EndpointStatus::Unavailable
    };

    match models {
        Ok(models) => {
            info!("Endpoint lists {} models", models.len());
            settings.set_models(models);
        }
        Err(err) if available => {
            warn!("Model listing failed: {err}");
            session.report_warning(format!("Failed to list models: {err}"));
        }
        // the saved model stays selected for when the endpoint comes back
        Err(_) => settings.models.clear(),
    }
}

impl eframe::App for VlmOcrApp {
    /// Called each time the UI needs repainting, which may be many times per second.
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        ctx.update_state(self);

        ctx.set_zoom_factor(self.settings.zoom_factor);

        self.show(ctx);
    }

    /// Called by the frame work to save state before shutdown.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.settings);
    }
}
