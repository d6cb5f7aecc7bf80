//! planbuilder - design document to implementation plan
//!
//! Reads a project design, asks a model for an ordered overview plan, then
//! asks again for each section's detailed plan. Results land on disk as
//! `overview_plan.md` plus one `sections/<id>.md` per section.
//!
//! # Core Concepts
//!
//! - **Two phases**: one blocking overview call, then bounded concurrent section calls
//! - **Protocol fallback**: the structured protocol is probed once and the
//!   conversational one takes over when it is unsupported
//! - **Failure isolation**: a failed section never stops its siblings
//!
//! # Modules
//!
//! - [`source`] - Design document loading
//! - [`llm`] - Backends, protocol selection, retry
//! - [`plan`] - Plan types, overview parsing, both generators
//! - [`prompts`] - Handlebars prompt templates
//! - [`output`] - Plan file rendering and writing
//! - [`pipeline`] - End-to-end run with fan-out
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod prompts;
pub mod source;

pub use config::{Config, LlmConfig, PlanConfig};
pub use llm::{
    GenerationError, LlmClient, LlmError, ModelInvoker, ModelRequest, ModelResponse, Protocol, ProtocolMode,
    ResponseShape, RetryPolicy, create_client,
};
pub use output::{Materializer, WriteError};
pub use pipeline::{Pipeline, PipelineConfig, RunOutcome, RunReport, SectionOutcome};
pub use plan::{OverviewPlan, PlanError, SectionPlan, SectionRecord, SectionStatus};
pub use prompts::PromptLoader;
pub use source::{DesignDocument, SourceError};
