//! Pipeline definition files: parsing and semantic validation.

pub mod parser;
pub mod validator;

pub use parser::{parse_definition, parse_definition_str, substitute_env_vars};
pub use validator::validate_definition;
