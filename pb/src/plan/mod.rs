//! Plan domain types and the two generation phases
//!
//! - [`overview`] - one model call turning the design into an [`OverviewPlan`]
//! - [`parser`] - tolerant markdown parsing of the overview response
//! - [`section`] - one model call per [`SectionRecord`] producing a [`SectionPlan`]

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::llm::GenerationError;
use crate::output::WriteError;
use crate::source::SourceError;

pub mod overview;
pub mod parser;
pub mod section;

pub use overview::OverviewGenerator;
pub use parser::{ParseOptions, parse_overview};
pub use section::{DETAIL_HEADINGS, SectionGenerator};

/// Scope used when the model does not classify the project
pub const DEFAULT_SCOPE: &str = "4 week MVP";

/// Longest slug kept for a section id
const MAX_SLUG_LEN: usize = 60;

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("overview response contained {found} usable section(s), need at least {required} ({skipped} malformed heading(s) skipped)")]
    EmptyPlan {
        found: usize,
        required: usize,
        skipped: usize,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("prompt error: {0}")]
    Prompt(String),
}

/// Progress state of a planned section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionStatus {
    #[default]
    NotStarted,
    WorkInProgress,
    Complete,
    ToBeUpdated,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::NotStarted => "not started",
            SectionStatus::WorkInProgress => "work in progress",
            SectionStatus::Complete => "complete",
            SectionStatus::ToBeUpdated => "to be updated",
        }
    }

    /// Parse a status value, ignoring case, punctuation and markdown emphasis
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .trim_matches(|c: char| c == '*' || c == '_' || c == '`' || c == '.')
            .to_lowercase()
            .replace(['-', '_'], " ");
        match normalized.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "not started" | "todo" | "pending" => Some(SectionStatus::NotStarted),
            "work in progress" | "in progress" | "wip" => Some(SectionStatus::WorkInProgress),
            "complete" | "completed" | "done" => Some(SectionStatus::Complete),
            "to be updated" | "needs update" => Some(SectionStatus::ToBeUpdated),
            _ => None,
        }
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned unit of work from the overview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRecord {
    /// Unique, filesystem-safe slug
    pub id: String,
    /// Short label such as "S1"
    pub key: String,
    pub name: String,
    pub summary: String,
    pub status: SectionStatus,
}

impl SectionRecord {
    /// "key: name", as shown in headings and prompts
    pub fn label(&self) -> String {
        format!("{}: {}", self.key, self.name)
    }
}

/// The overview plan: title, scope and ordered sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewPlan {
    pub title: String,
    pub scope_classification: String,
    /// Free-text overview paragraph, may be empty
    pub overview: String,
    pub sections: Vec<SectionRecord>,
}

/// Generated detail plan for one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPlan {
    pub section_id: String,
    pub markdown: String,
}

/// Slugify a string for use in filenames
pub fn slugify(s: &str) -> String {
    let slug = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let mut slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() { "section".to_string() } else { slug }
}

/// Hands out unique section ids in order of appearance
#[derive(Debug, Default)]
pub struct SlugAllocator {
    used: HashSet<String>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slug for `label`, with `-2`, `-3`, ... appended on collision
    pub fn allocate(&mut self, label: &str) -> String {
        let base = slugify(label);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.used.contains(&candidate) {
            let suffix = format!("-{}", n);
            // Slugs are ASCII, so byte truncation stays on a char boundary
            let keep = base.len().min(MAX_SLUG_LEN.saturating_sub(suffix.len()));
            candidate = format!("{}{}", base[..keep].trim_end_matches('-'), suffix);
            n += 1;
        }
        debug!(%label, id = %candidate, "SlugAllocator::allocate: assigned");
        self.used.insert(candidate.clone());
        candidate
    }
}
