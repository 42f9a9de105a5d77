use crate::session::{Notice, SETUP_FOOTER, Session};
use egui::{CollapsingHeader, Color32, RichText};

pub fn show(ctx: &egui::Context, session: &mut Session) {
    let Some(notice) = session.notice() else {
        return;
    };
    let color = match notice {
        Notice::Warning(_) | Notice::Unavailable => Color32::from_rgb(245, 158, 11),
        Notice::Error(_) => Color32::from_rgb(239, 68, 68),
    };
    let title = notice.title().to_string();
    let message = notice.message().to_string();
    let steps = notice.setup_steps();

    let mut dismissed = false;
    egui::TopBottomPanel::top("notice").show(ctx, |ui| {
        ui.horizontal(|ui| {
            ui.label(RichText::new(title).strong().color(color));
            ui.label(message);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                dismissed = ui.button("\u{2716}").on_hover_text("Dismiss").clicked();
            });
        });

        if steps.is_empty() {
            return;
        }
        CollapsingHeader::new("First time setup")
            .default_open(true)
            .show(ui, |ui| {
                for (i, step) in steps.iter().enumerate() {
                    ui.label(format!("{}. {}", i + 1, step.description));
                    if let Some(command) = step.command {
                        ui.horizontal(|ui| {
                            ui.code(command);
                            if ui.small_button("Copy").clicked() {
                                ui.ctx().copy_text(command.to_string());
                            }
                        });
                    }
                }
                ui.label(RichText::new(SETUP_FOOTER).weak());
            });
    });

    if dismissed {
        session.dismiss_notice();
    }
}
