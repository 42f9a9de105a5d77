use egui::Color32;

pub mod app;
mod event;
mod image_panel;
mod notice;
mod output_panel;
mod settings;

/// amber, sky, green, purple, red, orange
const REGION_COLORS: [(u8, u8, u8); 6] = [
    (245, 158, 11),
    (14, 165, 233),
    (34, 197, 94),
    (168, 85, 247),
    (239, 68, 68),
    (249, 115, 22),
];

pub const REGION_FILL_ALPHA: f32 = 0.25;
pub const REGION_BORDER_ALPHA: f32 = 0.5;

/// Colour of the region with capture index `index`, cycling through the palette.
pub fn region_color(index: usize, alpha: f32) -> Color32 {
    let (r, g, b) = REGION_COLORS[index % REGION_COLORS.len()];
    Color32::from_rgba_unmultiplied(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}
