#![warn(clippy::all, rust_2018_idioms)]
#![allow(
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
mod ui;

pub use ui::app::VlmOcrApp;

pub mod error;
pub mod export;
pub mod generation;
pub mod inference;
pub mod region;
pub mod session;
pub mod shutdown;
