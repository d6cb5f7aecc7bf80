//! CLI definition

use std::path::PathBuf;

use clap::Parser;
use tracing::debug;

use crate::config::Config;
use crate::llm::ProtocolMode;

/// planbuilder - turn a design document into an implementation plan
#[derive(Debug, Parser)]
#[command(
    name = "pb",
    about = "Generate an overview plan and per-section implementation plans from a design document",
    version
)]
pub struct Cli {
    /// Design document to plan from
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory for overview_plan.md and sections/
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Model for the overview phase
    #[arg(long, value_name = "MODEL")]
    pub overview_model: Option<String>,

    /// Model for each section plan
    #[arg(long, value_name = "MODEL")]
    pub detail_model: Option<String>,

    /// Maximum concurrent section generations
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Model protocol (auto, structured, conversational)
    #[arg(long, value_name = "MODE")]
    pub protocol: Option<ProtocolMode>,

    /// Exit with status 3 when some section plans failed
    #[arg(long)]
    pub strict: bool,

    /// Path to config file
    #[arg(short, long, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Overlay flags that were given onto the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        debug!(?self, "Cli::apply: called");
        if let Some(dir) = &self.output_dir {
            config.plan.output_dir = dir.clone();
        }
        if let Some(model) = &self.overview_model {
            config.plan.overview_model = model.clone();
        }
        if let Some(model) = &self.detail_model {
            config.plan.detail_model = model.clone();
        }
        if let Some(n) = self.concurrency {
            config.plan.concurrency = n as usize;
        }
        if let Some(mode) = self.protocol {
            config.llm.protocol = mode;
        }
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }
    }
}
