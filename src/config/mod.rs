pub mod parser;
pub mod schema;
pub mod types;

pub use types::*;
pub use parser::{parse_config, resolve_board_path};
