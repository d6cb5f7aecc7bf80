//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Overview plan prompt
pub const OVERVIEW: &str = include_str!("../../prompts/overview.pmt");

/// Section detail plan prompt
pub const SECTION: &str = include_str!("../../prompts/section.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "overview" => {
            debug!("get_embedded: matched overview");
            Some(OVERVIEW)
        }
        "section" => {
            debug!("get_embedded: matched section");
            Some(SECTION)
        }
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
