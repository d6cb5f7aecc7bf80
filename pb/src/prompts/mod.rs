//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for the two plan phases.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (user override, when configured)
//! 2. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{OverviewPromptContext, PromptLoader, SectionPromptContext};
