//! Output materializer
//!
//! Writes `overview_plan.md` and `sections/<id>.md` under the output root.
//! Each file is written to a temporary sibling and renamed over the target so
//! readers never see a half-written plan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::plan::{OverviewPlan, SectionPlan};

pub const OVERVIEW_FILE: &str = "overview_plan.md";
pub const SECTIONS_DIR: &str = "sections";

/// Failure to persist a plan file
#[derive(Debug, Error)]
#[error("Failed to write {}: {source}", path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Writes plan files under an output root
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
}

impl Materializer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(?root, "Materializer::new: called");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn overview_path(&self) -> PathBuf {
        self.root.join(OVERVIEW_FILE)
    }

    pub fn section_path(&self, section_id: &str) -> PathBuf {
        self.root.join(SECTIONS_DIR).join(format!("{}.md", section_id))
    }

    /// Render the overview plan as markdown
    pub fn render_overview(plan: &OverviewPlan) -> String {
        let mut out = format!(
            "# {}\n\nScope classification: {}\n\n",
            plan.title, plan.scope_classification
        );

        if !plan.overview.trim().is_empty() {
            out.push_str("## Overview\n");
            out.push_str(plan.overview.trim());
            out.push_str("\n\n");
        }

        out.push_str("## Sections\n");
        for section in &plan.sections {
            out.push_str(&format!(
                "\n### {}\nStatus: {}\n\n{}\n",
                section.label(),
                section.status,
                section.summary
            ));
        }
        out
    }

    /// Write `overview_plan.md`, replacing any previous copy
    pub fn write_overview(&self, plan: &OverviewPlan) -> Result<PathBuf, WriteError> {
        debug!(title = %plan.title, "Materializer::write_overview: called");
        let path = self.overview_path();
        write_atomic(&path, &Self::render_overview(plan))?;
        info!(?path, sections = plan.sections.len(), "Wrote overview plan");
        Ok(path)
    }

    /// Write `sections/<id>.md`, replacing any previous copy
    pub fn write_section(&self, section: &SectionPlan) -> Result<PathBuf, WriteError> {
        debug!(id = %section.section_id, "Materializer::write_section: called");
        let path = self.section_path(&section.section_id);
        write_atomic(&path, &section.markdown)?;
        info!(?path, "Wrote section plan");
        Ok(path)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), WriteError> {
    let err = |source| WriteError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(err)?;
    }

    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    fs::write(&tmp, content).map_err(err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        err(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{SectionRecord, SectionStatus};
    use tempfile::TempDir;

    fn plan() -> OverviewPlan {
        OverviewPlan {
            title: "Shop".to_string(),
            scope_classification: "4 week MVP".to_string(),
            overview: "Sell widgets.".to_string(),
            sections: vec![SectionRecord {
                id: "s1-a".to_string(),
                key: "S1".to_string(),
                name: "A".to_string(),
                summary: "Do A.".to_string(),
                status: SectionStatus::NotStarted,
            }],
        }
    }

    #[test]
    fn test_render_overview_layout() {
        let expected = "\
# Shop

Scope classification: 4 week MVP

## Overview
Sell widgets.

## Sections

### S1: A
Status: not started

Do A.
";
        assert_eq!(Materializer::render_overview(&plan()), expected);
    }

    #[test]
    fn test_render_overview_omits_empty_overview() {
        let mut plan = plan();
        plan.overview = "  ".to_string();
        let text = Materializer::render_overview(&plan);
        assert!(!text.contains("## Overview"));
        assert!(text.contains("## Sections"));
    }

    #[test]
    fn test_write_creates_directories_and_replaces() {
        let dir = TempDir::new().unwrap();
        let out = Materializer::new(dir.path().join("nested/out"));

        let path = out.write_overview(&plan()).unwrap();
        assert_eq!(path, dir.path().join("nested/out/overview_plan.md"));
        assert!(fs::read_to_string(&path).unwrap().starts_with("# Shop"));

        let section = SectionPlan {
            section_id: "s1-a".to_string(),
            markdown: "# S1: A\n".to_string(),
        };
        let path = out.write_section(&section).unwrap();
        assert_eq!(path, dir.path().join("nested/out/sections/s1-a.md"));

        let updated = SectionPlan {
            markdown: "# S1: A v2\n".to_string(),
            ..section
        };
        out.write_section(&updated).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# S1: A v2\n");

        let leftovers: Vec<_> = fs::read_dir(dir.path().join("nested/out/sections"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_error_names_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let out = Materializer::new(&blocker);
        let err = out.write_overview(&plan()).unwrap_err();
        assert_eq!(err.path, blocker.join(OVERVIEW_FILE));
        assert!(err.to_string().contains("overview_plan.md"));
    }
}
