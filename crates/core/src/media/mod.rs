//! Media identities and release name parsing.

mod parser;
mod types;

pub use parser::{is_video_file, parse_release, ReleaseMeta, Resolution};
pub use types::*;
