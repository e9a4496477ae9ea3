pub mod credentials;
pub mod parser;
pub mod schema;
pub mod security;
pub mod types;
pub mod validator;

pub use types::*;
pub use parser::{parse_config, parse_config_str, load_config_value};
pub use validator::{validate, ValidatedConfig, ValidationReport};
