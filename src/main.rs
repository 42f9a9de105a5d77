#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
use log4rs::config::Deserializers;
use std::path::PathBuf;
use std::{fs, path::Path};
use vlm_ocr::VlmOcrApp;

#[tokio::main]
async fn main() -> eframe::Result {
    init_logger();

    let images: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };
    eframe::run_native(
        "VLM OCR",
        native_options,
        Box::new(|cc| Ok(Box::new(VlmOcrApp::new(cc, images)?))),
    )
}

const LOG_CONFIG_DIR: &str = "config";
const LOG_CONFIG: &str = "config/log4rs.yaml";

fn init_logger() {
    fs::create_dir_all(LOG_CONFIG_DIR).expect("Config directory creation failed");
    if !Path::new(&LOG_CONFIG).exists() {
        fs::write(LOG_CONFIG, include_str!("../config/log4rs.yaml"))
            .expect("Config file creation failed");
    }

    log4rs::init_file(LOG_CONFIG, Deserializers::default()).expect("Logger init failed");
}
