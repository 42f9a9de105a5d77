use super::{REGION_FILL_ALPHA, region_color};
use crate::export::OutputText;
use crate::generation::{GenerationJob, InputState};
use crate::session::Session;
use egui::{Color32, RichText, ScrollArea, Spinner};
use itertools::izip;
use log::info;

pub fn show(ui: &mut egui::Ui, output: &mut OutputText, session: &mut Session) {
    ui.heading("Output");

    if let Some(job) = session.job() {
        ScrollArea::vertical()
            .id_salt("region_output")
            .max_height(ui.available_height() / 2.0)
            .show(ui, |ui| show_job(ui, job));
        ui.separator();
    }

    let generating = session.is_generating();
    ui.horizontal(|ui| {
        if ui
            .add_enabled(!output.text.is_empty(), egui::Button::new("Export"))
            .clicked()
        {
            if let Some(path) = session.export_text(&output.text) {
                info!("Output written to {path:?}");
            }
        }
        if ui
            .add_enabled(!generating, egui::Button::new("Clear"))
            .clicked()
        {
            output.clear();
            session.clear_generated();
        }
        if output.is_user_modified() {
            ui.label(RichText::new("edited").weak());
        }
    });

    ScrollArea::vertical()
        .id_salt("output_text")
        .show(ui, |ui| {
            let response = ui.add(
                egui::TextEdit::multiline(&mut output.text)
                    .desired_width(f32::INFINITY)
                    .desired_rows(12)
                    .hint_text("Extracted text appears here"),
            );
            if response.changed() {
                output.mark_edited();
            }
        });
}

fn show_job(ui: &mut egui::Ui, job: &GenerationJob) {
    for (i, (text, state)) in izip!(job.input_texts(), job.states()).enumerate() {
        egui::Frame::group(ui.style())
            .fill(region_color(i, REGION_FILL_ALPHA / 2.0))
            .show(ui, |ui| {
                ui.set_width(ui.available_width());
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new(format!("Region {}", i + 1))
                            .strong()
                            .color(region_color(i, 1.0)),
                    );
                    state_badge(ui, *state);
                });
                if !text.is_empty() {
                    ui.label(text);
                }
            });
    }

    if let Some(note) = job.terminal_note() {
        ui.label(RichText::new(note).italics().weak());
    }
}

fn state_badge(ui: &mut egui::Ui, state: InputState) {
    let color = match state {
        InputState::Queued => Color32::GRAY,
        InputState::Generating => {
            ui.add(Spinner::new().size(12.0));
            Color32::from_rgb(245, 158, 11)
        }
        InputState::Complete => Color32::GREEN,
    };
    ui.label(RichText::new(state.to_string()).small().color(color));
}
