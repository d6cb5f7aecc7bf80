//! Section phase: one model call per planned section

use std::sync::Arc;

use tracing::{debug, info};

use super::{OverviewPlan, PlanError, SectionPlan, SectionRecord};
use crate::llm::{ModelInvoker, ModelRequest, ResponseShape};
use crate::prompts::{PromptLoader, SectionPromptContext};
use crate::source::DesignDocument;

/// Level-2 headings every detail plan is asked to contain, in order
pub const DETAIL_HEADINGS: &[&str] = &[
    "Summary",
    "Design",
    "Implementation Steps",
    "Risks",
    "Dependencies",
    "Acceptance Criteria",
];

const TRUNCATION_MARKER: &str = "\n\n[... design text truncated ...]";

/// Generates the detailed plan for one section of an overview
pub struct SectionGenerator {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<PromptLoader>,
    model: String,
    max_tokens: u32,
    max_context_chars: usize,
}

impl SectionGenerator {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<PromptLoader>,
        model: impl Into<String>,
        max_tokens: u32,
        max_context_chars: usize,
    ) -> Self {
        let model = model.into();
        debug!(%model, max_tokens, max_context_chars, "SectionGenerator::new: called");
        Self {
            invoker,
            prompts,
            model,
            max_tokens,
            max_context_chars,
        }
    }

    /// Generate the detail plan for `record`
    pub async fn generate(
        &self,
        doc: &DesignDocument,
        plan: &OverviewPlan,
        record: &SectionRecord,
    ) -> Result<SectionPlan, PlanError> {
        debug!(id = %record.id, "SectionGenerator::generate: called");
        let (design, truncated) = truncate_design(doc.text(), self.max_context_chars);
        if truncated {
            debug!(id = %record.id, limit = self.max_context_chars, "SectionGenerator::generate: design truncated");
        }

        let context = SectionPromptContext {
            title: plan.title.clone(),
            scope: plan.scope_classification.clone(),
            key: record.key.clone(),
            name: record.name.clone(),
            summary: record.summary.clone(),
            siblings: plan.sections.iter().map(SectionRecord::label).collect(),
            headings: DETAIL_HEADINGS.iter().map(|h| h.to_string()).collect(),
            truncated,
        };
        let instructions = self
            .prompts
            .section_prompt(&context)
            .map_err(|e| PlanError::Prompt(e.to_string()))?;

        let request = ModelRequest::new(&self.model, instructions, format!("Project design:\n\n{}", design))
            .with_shape(ResponseShape::markdown(DETAIL_HEADINGS.iter().copied()))
            .with_max_tokens(self.max_tokens);

        let response = self.invoker.generate(&request).await?;
        info!(
            id = %record.id,
            protocol = %response.protocol,
            attempts = response.attempts,
            "Section plan generated"
        );

        Ok(SectionPlan {
            section_id: record.id.clone(),
            markdown: normalize_markdown(&response.text, record),
        })
    }
}

/// Cut `text` to at most `limit` chars on a char boundary, appending a marker
fn truncate_design(text: &str, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        None => (text.to_string(), false),
        Some((byte_idx, _)) => (format!("{}{}", text[..byte_idx].trim_end(), TRUNCATION_MARKER), true),
    }
}

/// Trim, unwrap a fenced block, ensure a level-1 heading, end with one newline
fn normalize_markdown(raw: &str, record: &SectionRecord) -> String {
    let mut body = raw.trim();

    if let Some(rest) = body.strip_prefix("```") {
        let (lang, inner) = rest.split_once('\n').unwrap_or((rest, ""));
        let lang = lang.trim();
        if (lang.is_empty() || lang.eq_ignore_ascii_case("markdown") || lang.eq_ignore_ascii_case("md"))
            && let Some(inner) = inner.trim_end().strip_suffix("```")
        {
            body = inner.trim();
        }
    }

    let mut markdown = if body.starts_with("# ") {
        body.to_string()
    } else {
        format!("# {}\n\n{}", record.label(), body)
    };
    let trimmed_len = markdown.trim_end().len();
    markdown.truncate(trimmed_len);
    markdown.push('\n');
    markdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::{MockLlmClient, MockReply};
    use crate::llm::{ProtocolMode, RetryPolicy};
    use crate::plan::SectionStatus;

    fn record(key: &str, name: &str) -> SectionRecord {
        SectionRecord {
            id: crate::plan::slugify(&format!("{} {}", key, name)),
            key: key.to_string(),
            name: name.to_string(),
            summary: format!("{} summary", name),
            status: SectionStatus::NotStarted,
        }
    }

    fn plan() -> OverviewPlan {
        OverviewPlan {
            title: "Shop".to_string(),
            scope_classification: "4 week MVP".to_string(),
            overview: String::new(),
            sections: vec![record("S1", "A"), record("S2", "B")],
        }
    }

    #[test]
    fn test_truncate_design_short_text_untouched() {
        assert_eq!(truncate_design("short", 10), ("short".to_string(), false));
        assert_eq!(truncate_design("exact", 5), ("exact".to_string(), false));
    }

    #[test]
    fn test_truncate_design_respects_char_boundaries() {
        let (text, truncated) = truncate_design("ééééé", 2);
        assert!(truncated);
        assert!(text.starts_with("éé\n\n[..."));
        assert!(text.ends_with("truncated ...]"));
    }

    #[test]
    fn test_normalize_prepends_heading() {
        let md = normalize_markdown("## Summary\nDo A.\n\n\n", &record("S1", "A"));
        assert_eq!(md, "# S1: A\n\n## Summary\nDo A.\n");
    }

    #[test]
    fn test_normalize_keeps_existing_heading() {
        let md = normalize_markdown("  # S1: A plan\n\n## Design\nx", &record("S1", "A"));
        assert_eq!(md, "# S1: A plan\n\n## Design\nx\n");
    }

    #[test]
    fn test_normalize_strips_markdown_fence() {
        let md = normalize_markdown("```markdown\n# S2: B\n\n## Risks\nnone\n```", &record("S2", "B"));
        assert_eq!(md, "# S2: B\n\n## Risks\nnone\n");
    }

    #[test]
    fn test_normalize_leaves_code_fences_in_language_blocks() {
        let raw = "```rust\nfn main() {}\n```";
        let md = normalize_markdown(raw, &record("S1", "A"));
        assert_eq!(md, "# S1: A\n\n```rust\nfn main() {}\n```\n");
    }

    #[tokio::test]
    async fn test_generate_produces_section_plan() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Text("## Summary\nBuild B.".to_string())]));
        let invoker = Arc::new(ModelInvoker::new(client, ProtocolMode::Auto, RetryPolicy::default()));
        let generator = SectionGenerator::new(invoker, Arc::new(PromptLoader::embedded_only()), "gpt-5-mini", 500, 100);

        let doc = DesignDocument::from_text("d.md", "design").unwrap();
        let plan = plan();
        let section = generator.generate(&doc, &plan, &plan.sections[1]).await.unwrap();
        assert_eq!(section.section_id, "s2-b");
        assert_eq!(section.markdown, "# S2: B\n\n## Summary\nBuild B.\n");
    }

    #[tokio::test]
    async fn test_generate_failure_is_reported() {
        let client = Arc::new(MockLlmClient::new(vec![MockReply::Empty]));
        let invoker = Arc::new(ModelInvoker::new(client, ProtocolMode::Auto, RetryPolicy::default()));
        let generator = SectionGenerator::new(invoker, Arc::new(PromptLoader::embedded_only()), "m", 500, 100);

        let doc = DesignDocument::from_text("d.md", "design").unwrap();
        let plan = plan();
        let err = generator.generate(&doc, &plan, &plan.sections[0]).await.unwrap_err();
        assert!(matches!(err, PlanError::Generation(_)));
    }
}
