//! Plan pipeline
//!
//! Runs the overview phase, writes the overview, then fans out one task per
//! section under a concurrency limit. A failing section is recorded and its
//! siblings keep going.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::llm::ModelInvoker;
use crate::output::Materializer;
use crate::plan::{OverviewGenerator, OverviewPlan, PlanError, SectionGenerator, SectionRecord};
use crate::prompts::PromptLoader;
use crate::source::DesignDocument;

/// Settings for one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub overview_model: String,
    pub detail_model: String,
    pub concurrency: usize,
    pub max_tokens: u32,
    pub max_context_chars: usize,
    pub min_sections: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.plan.output_dir.clone(),
            overview_model: config.plan.overview_model.clone(),
            detail_model: config.plan.detail_model.clone(),
            concurrency: config.plan.concurrency,
            max_tokens: config.llm.max_tokens,
            max_context_chars: config.plan.max_context_chars,
            min_sections: config.plan.min_sections,
        }
    }
}

/// What happened to one section
#[derive(Debug, Clone)]
pub enum SectionOutcome {
    Written { record: SectionRecord, path: PathBuf },
    Failed { record: SectionRecord, error: String },
}

impl SectionOutcome {
    pub fn record(&self) -> &SectionRecord {
        match self {
            SectionOutcome::Written { record, .. } | SectionOutcome::Failed { record, .. } => record,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, SectionOutcome::Written { .. })
    }
}

/// Overall result of a run that got past the overview phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Complete,
    Partial,
}

/// Summary of a pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub plan: OverviewPlan,
    pub overview_path: PathBuf,
    /// One entry per section, in plan order
    pub sections: Vec<SectionOutcome>,
}

impl RunReport {
    pub fn outcome(&self) -> RunOutcome {
        if self.sections.iter().all(SectionOutcome::is_written) {
            RunOutcome::Complete
        } else {
            RunOutcome::Partial
        }
    }

    pub fn written(&self) -> impl Iterator<Item = &SectionOutcome> {
        self.sections.iter().filter(|s| s.is_written())
    }

    pub fn failed(&self) -> impl Iterator<Item = &SectionOutcome> {
        self.sections.iter().filter(|s| !s.is_written())
    }
}

/// Design document in, overview and section plan files out
pub struct Pipeline {
    overview: OverviewGenerator,
    sections: Arc<SectionGenerator>,
    materializer: Arc<Materializer>,
    concurrency: usize,
}

impl Pipeline {
    pub fn new(invoker: Arc<ModelInvoker>, prompts: Arc<PromptLoader>, config: PipelineConfig) -> Self {
        debug!(?config, "Pipeline::new: called");
        let overview = OverviewGenerator::new(
            invoker.clone(),
            prompts.clone(),
            config.overview_model,
            config.max_tokens,
            config.min_sections,
        );
        let sections = SectionGenerator::new(
            invoker,
            prompts,
            config.detail_model,
            config.max_tokens,
            config.max_context_chars,
        );

        Self {
            overview,
            sections: Arc::new(sections),
            materializer: Arc::new(Materializer::new(config.output_dir)),
            concurrency: config.concurrency.max(1),
        }
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Run both phases for `doc`
    ///
    /// Errors are limited to the fatal paths: overview generation, an empty
    /// plan, or failing to write the overview. Section failures land in the
    /// report instead.
    pub async fn run(&self, doc: &DesignDocument) -> Result<RunReport, PlanError> {
        debug!(path = ?doc.path(), "Pipeline::run: called");
        info!(path = ?doc.path(), "Generating overview plan");

        let plan = self.overview.generate(doc).await?;
        let overview_path = self.materializer.write_overview(&plan)?;

        let sections = self.generate_sections(doc, &plan).await;
        let report = RunReport {
            plan,
            overview_path,
            sections,
        };
        info!(
            written = report.written().count(),
            failed = report.failed().count(),
            outcome = ?report.outcome(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    async fn generate_sections(&self, doc: &DesignDocument, plan: &OverviewPlan) -> Vec<SectionOutcome> {
        debug!(count = plan.sections.len(), concurrency = self.concurrency, "generate_sections: called");
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let doc = Arc::new(doc.clone());
        let shared_plan = Arc::new(plan.clone());

        let handles: Vec<_> = plan
            .sections
            .iter()
            .cloned()
            .map(|record| {
                let semaphore = semaphore.clone();
                let generator = self.sections.clone();
                let materializer = self.materializer.clone();
                let doc = doc.clone();
                let plan = shared_plan.clone();

                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return SectionOutcome::Failed {
                                record,
                                error: format!("worker pool closed: {}", e),
                            };
                        }
                    };
                    debug!(id = %record.id, "generate_sections: permit acquired");

                    let result = match generator.generate(&doc, &plan, &record).await {
                        Ok(section) => materializer.write_section(&section).map_err(PlanError::from),
                        Err(e) => Err(e),
                    };

                    match result {
                        Ok(path) => SectionOutcome::Written { record, path },
                        Err(e) => {
                            error!(id = %record.id, section = %record.label(), error = %e, "Section plan failed");
                            SectionOutcome::Failed {
                                record,
                                error: e.to_string(),
                            }
                        }
                    }
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(plan.sections.iter())
            .map(|(joined, record)| match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(id = %record.id, error = %e, "Section task aborted");
                    SectionOutcome::Failed {
                        record: record.clone(),
                        error: format!("task aborted: {}", e),
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use crate::llm::{ProtocolMode, RetryPolicy};
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir, replies: Vec<MockReply>, concurrency: usize) -> Pipeline {
        let client = Arc::new(MockLlmClient::new(replies));
        let invoker = Arc::new(ModelInvoker::new(client, ProtocolMode::Auto, RetryPolicy::default()));
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            concurrency,
            ..Default::default()
        };
        Pipeline::new(invoker, Arc::new(PromptLoader::embedded_only()), config)
    }

    #[tokio::test]
    async fn test_run_sequential_writes_all_sections() {
        let dir = TempDir::new().unwrap();
        let overview = "# Shop\n### S1: A\nSummary: a\n### S2: B\nSummary: b\n";
        let replies = vec![
            MockReply::Text(overview.to_string()),
            MockReply::Text("## Summary\nA".to_string()),
            MockReply::Text("## Summary\nB".to_string()),
        ];
        let doc = DesignDocument::from_text("shop.md", "design").unwrap();

        let report = pipeline(&dir, replies, 1).run(&doc).await.unwrap();
        assert_eq!(report.outcome(), RunOutcome::Complete);
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].record().id, "s1-a");
        assert!(dir.path().join("sections/s1-a.md").exists());
        assert!(dir.path().join("sections/s2-b.md").exists());
        assert_eq!(report.overview_path, dir.path().join("overview_plan.md"));
    }

    #[tokio::test]
    async fn test_run_records_failed_section() {
        let dir = TempDir::new().unwrap();
        let overview = "### S1: A\nSummary: a\n### S2: B\nSummary: b\n";
        let replies = vec![
            MockReply::Text(overview.to_string()),
            MockReply::Status(400),
            MockReply::Text("## Summary\nB".to_string()),
        ];
        let doc = DesignDocument::from_text("shop.md", "design").unwrap();

        let report = pipeline(&dir, replies, 1).run(&doc).await.unwrap();
        assert_eq!(report.outcome(), RunOutcome::Partial);
        assert_eq!(report.failed().count(), 1);
        assert!(!dir.path().join("sections/s1-a.md").exists());
        assert!(dir.path().join("sections/s2-b.md").exists());
    }

    #[tokio::test]
    async fn test_run_empty_plan_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let doc = DesignDocument::from_text("shop.md", "design").unwrap();

        let err = pipeline(&dir, vec![MockReply::Text("no plan".to_string())], 2)
            .run(&doc)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::EmptyPlan { .. }));
        assert!(!dir.path().join("overview_plan.md").exists());
    }

    #[test]
    fn test_pipeline_config_from_config() {
        let mut config = Config::default();
        config.plan.concurrency = 9;
        config.llm.max_tokens = 77;
        let pc = PipelineConfig::from_config(&config);
        assert_eq!(pc.concurrency, 9);
        assert_eq!(pc.max_tokens, 77);
        assert_eq!(pc.detail_model, "gpt-5-mini");
    }
}
