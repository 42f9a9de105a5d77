use crate::generation::RequestParams;
use crate::inference::GenerationParameters;
use crate::inference::ollama::DEFAULT_BASE_URL;
use egui::{CollapsingHeader, Color32, Id, RichText, Spinner};
use log::info;
use rand::Rng;

pub const DEFAULT_PROMPT: &str = "Analyze the image and extract all visible text. Format your response as plain text, preserving the layout as seen in the image.";

const CONTEXT_LENGTHS: [(u32, &str); 5] = [
    (2048, "2k"),
    (4096, "4k"),
    (8192, "8k"),
    (16384, "16k"),
    (32768, "32k"),
];

#[derive(serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AppSettings {
    pub base_url: String,
    pub model: String,
    pub prompt: String,
    pub parameters: GenerationParameters,
    pub fixed_seed: bool,

    pub zoom_factor: f32,
    pub show_sidebar: bool,

    #[serde(skip)]
    pub models: Vec<String>,
    #[serde(skip)]
    pub endpoint_status: EndpointStatus,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            parameters: GenerationParameters::default(),
            fixed_seed: true,
            zoom_factor: 1.0,
            show_sidebar: true,
            models: vec![],
            endpoint_status: EndpointStatus::default(),
        }
    }
}

/// Requested follow-up of a settings interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsAction {
    None,
    Reconnect,
}

impl AppSettings {
    pub fn request_params(&self) -> RequestParams {
        RequestParams {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            parameters: self.parameters,
        }
    }

    /// Keeps the selection if the endpoint still offers it, else picks the first model.
    pub fn set_models(&mut self, models: Vec<String>) {
        if !models.contains(&self.model) {
            self.model = models.first().cloned().unwrap_or_default();
            info!("Selected model '{}'", self.model);
        }
        self.models = models;
    }

    pub fn set_fixed_seed(&mut self, fixed: bool) {
        self.fixed_seed = fixed;
        if !fixed {
            self.parameters.seed = rand::thread_rng().gen_range(0..1_000_000);
        }
    }

    pub(crate) fn show(&mut self, ui: &mut egui::Ui) -> SettingsAction {
        let mut action = SettingsAction::None;

        CollapsingHeader::new("Model Settings")
            .default_open(true)
            .show(ui, |ui| {
                action = self.show_endpoint(ui);
                self.show_model_select(ui);
                self.show_parameters(ui);
            });

        CollapsingHeader::new("Prompt")
            .default_open(true)
            .show(ui, |ui| {
                ui.add(
                    egui::TextEdit::multiline(&mut self.prompt)
                        .desired_rows(6)
                        .desired_width(f32::INFINITY),
                );
                if ui.button("Reset Prompt").clicked() {
                    self.prompt = DEFAULT_PROMPT.to_string();
                }
            });

        CollapsingHeader::new("Window").show(ui, |ui| {
            egui::widgets::global_theme_preference_buttons(ui);

            ui.horizontal(|ui| {
                ui.label("Zoom Factor:");
                ui.selectable_value(&mut self.zoom_factor, 1.0, "100%");
                ui.selectable_value(&mut self.zoom_factor, 1.5, "150%");
                ui.selectable_value(&mut self.zoom_factor, 2.0, "200%");
            });
        });

        action
    }

    fn show_endpoint(&mut self, ui: &mut egui::Ui) -> SettingsAction {
        let mut action = SettingsAction::None;
        ui.horizontal(|ui| {
            ui.label("Endpoint:");
            self.endpoint_status.get_ui(ui);
        });
        ui.horizontal(|ui| {
            let response = ui.text_edit_singleline(&mut self.base_url);
            if response.lost_focus() && response.changed() {
                action = SettingsAction::Reconnect;
            }
            if ui.button("\u{21bb}").on_hover_text("Refresh").clicked() {
                action = SettingsAction::Reconnect;
            }
        });
        action
    }

    /// Text of the closed model select.
    pub fn model_label(&self) -> &str {
        if self.endpoint_status == EndpointStatus::Checking {
            "Loading models..."
        } else if self.models.is_empty() {
            "No models found"
        } else if self.model.is_empty() {
            "Select a model"
        } else {
            &self.model
        }
    }

    fn show_model_select(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Model:");
            let selected = self.model_label().to_string();
            ui.add_enabled_ui(!self.models.is_empty(), |ui| {
                egui::ComboBox::from_id_salt(Id::new("model_select"))
                    .selected_text(selected)
                    .show_ui(ui, |ui| {
                        for model in &self.models {
                            ui.selectable_value(&mut self.model, model.clone(), model);
                        }
                    });
            });
        });
    }

    fn show_parameters(&mut self, ui: &mut egui::Ui) {
        let parameters = &mut self.parameters;

        ui.add(
            egui::Slider::new(&mut parameters.temperature, 0.0..=1.0)
                .step_by(0.1)
                .text("Temperature"),
        );

        ui.horizontal(|ui| {
            ui.label("Context:");
            for (length, label) in CONTEXT_LENGTHS {
                ui.selectable_value(&mut parameters.context_length, length, label);
            }
        });

        let mut fixed_seed = self.fixed_seed;
        ui.horizontal(|ui| {
            if ui.checkbox(&mut fixed_seed, "Fixed Seed").changed() {
                self.set_fixed_seed(fixed_seed);
            }
            ui.add_enabled(
                self.fixed_seed,
                egui::DragValue::new(&mut self.parameters.seed).range(0..=i64::from(i32::MAX)),
            );
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointStatus {
    #[default]
    Checking,
    Available,
    Unavailable,
}

impl EndpointStatus {
    fn get_ui(&self, ui: &mut egui::Ui) {
        match self {
            EndpointStatus::Checking => ui.add(Spinner::new()),
            EndpointStatus::Available => ui.label(RichText::from("\u{2714}").color(Color32::GREEN)),
            EndpointStatus::Unavailable => {
                ui.label(RichText::from("\u{2716}").color(Color32::RED))
            }
        };
    }
}
