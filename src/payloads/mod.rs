pub mod generator;
pub mod templates;

pub use generator::{benign_value, PayloadGenerator};
