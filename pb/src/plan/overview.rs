//! Overview phase: one model call turning the whole design into an ordered plan

use std::sync::Arc;

use tracing::{debug, info};

use super::parser::{ParseOptions, parse_overview};
use super::{OverviewPlan, PlanError};
use crate::llm::{ModelInvoker, ModelRequest, ResponseShape};
use crate::prompts::{OverviewPromptContext, PromptLoader};
use crate::source::DesignDocument;

/// Headings the overview response is asked to use
const OVERVIEW_SHAPE: &[&str] = &["Overview", "Sections"];

/// Generates the overview plan for a design document
pub struct OverviewGenerator {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<PromptLoader>,
    model: String,
    max_tokens: u32,
    min_sections: usize,
}

impl OverviewGenerator {
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<PromptLoader>,
        model: impl Into<String>,
        max_tokens: u32,
        min_sections: usize,
    ) -> Self {
        let model = model.into();
        debug!(%model, max_tokens, min_sections, "OverviewGenerator::new: called");
        Self {
            invoker,
            prompts,
            model,
            max_tokens,
            min_sections,
        }
    }

    /// Ask the model for an overview plan and parse it
    pub async fn generate(&self, doc: &DesignDocument) -> Result<OverviewPlan, PlanError> {
        debug!(path = ?doc.path(), "OverviewGenerator::generate: called");
        let fallback_title = doc.stem();

        let instructions = self
            .prompts
            .overview_prompt(&OverviewPromptContext {
                fallback_title: fallback_title.clone(),
            })
            .map_err(|e| PlanError::Prompt(e.to_string()))?;

        let request = ModelRequest::new(&self.model, instructions, design_input(doc))
            .with_shape(ResponseShape::markdown(OVERVIEW_SHAPE.iter().copied()))
            .with_max_tokens(self.max_tokens);

        let response = self.invoker.generate(&request).await?;
        info!(
            model = %self.model,
            protocol = %response.protocol,
            attempts = response.attempts,
            chars = response.text.len(),
            "Overview response received"
        );

        let plan = parse_overview(
            &response.text,
            &ParseOptions {
                min_sections: self.min_sections,
                fallback_title,
            },
        )?;
        info!(title = %plan.title, sections = plan.sections.len(), "Overview plan parsed");
        Ok(plan)
    }
}

fn design_input(doc: &DesignDocument) -> String {
    format!("Project design:\n\n{}", doc.text())
}
