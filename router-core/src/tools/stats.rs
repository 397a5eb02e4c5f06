use super::best_column_match;
use crate::config::ScoringConfig;
use crate::error::Result;
use crate::registry::CapabilityDescriptor;
use crate::resolver::tokenize;
use crate::tool::{Refinement, Tool, ToolContext, ToolRequest, ToolResult};
use async_trait::async_trait;
use serde_json::json;

/// One-shot descriptive-statistics tool. Summarizes a single variable when
/// one is named, otherwise the whole dataset.
pub struct StatsTool {
    descriptor: CapabilityDescriptor,
}

impl StatsTool {
    pub fn new() -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(
                "stats",
                &[
                    "statistics",
                    "stats",
                    "summary",
                    "summarize",
                    "describe",
                    "mean",
                    "average",
                    "median",
                    "deviation",
                    "variance",
                ],
                &[
                    "give me summary statistics",
                    "what is the average temperature",
                    "describe the dataset",
                    "mean and median of rainfall",
                ],
            )
            .requires_data_loaded(),
        }
    }
}

impl Default for StatsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for StatsTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn description(&self) -> &str {
        "Computes descriptive statistics for a variable or the whole dataset"
    }

    fn can_handle(&self, message: &str, _ctx: &ToolContext<'_>) -> bool {
        let tokens = tokenize(message);
        self.keywords()
            .iter()
            .any(|k| tokens.iter().any(|t| t == k))
    }

    fn refine(
        &self,
        tokens: &[String],
        _message: &str,
        ctx: &ToolContext<'_>,
        scoring: &ScoringConfig,
    ) -> Refinement {
        let mut refinement = Refinement::default();
        let candidates: Vec<String> = tokens
            .iter()
            .filter(|t| !self.keywords().iter().any(|k| k == *t))
            .cloned()
            .collect();
        if let Some((column, _)) =
            best_column_match(&candidates, &ctx.dataset.columns, scoring.fuzzy_match_threshold)
        {
            refinement.bonus += scoring.fuzzy_bonus;
            refinement.matched_terms.push(column.clone());
            refinement
                .arguments
                .insert("variable_name".to_string(), json!(column));
        }
        // A dataset-wide summary is a fine default, so nothing is ever
        // reported missing here.
        refinement
    }

    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        if let Some(variable) = request.argument_str("variable_name") {
            let data = json!({
                "variable": variable,
                "measures": ["count", "mean", "median", "std", "min", "max"],
            });
            return Ok(ToolResult::message(format!(
                "Here are the descriptive statistics for {variable}."
            ))
            .with_data(data)
            .with_variable_reference(variable));
        }

        if ctx.dataset.columns.is_empty() {
            return Ok(ToolResult::clarification(
                "There are no columns to summarize yet. Try uploading a dataset first.",
            ));
        }

        let data = json!({
            "columns": ctx.dataset.columns,
            "measures": ["count", "mean", "median", "std", "min", "max"],
        });
        Ok(ToolResult::message(format!(
            "Here's a summary of all {} columns in the dataset.",
            ctx.dataset.columns.len()
        ))
        .with_data(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::tool::DatasetContext;
    use std::collections::HashMap;

    #[tokio::test]
    async fn summarizes_a_named_variable() {
        let tool = StatsTool::new();
        let dataset = DatasetContext::with_columns(vec!["temperature".to_string()]);
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let mut args = HashMap::new();
        args.insert("variable_name".to_string(), json!("temperature"));
        let request = ToolRequest::with_arguments("average temperature", args);

        let result = tool.execute(&request, &ctx).await.unwrap();
        assert!(result.message.contains("temperature"));
        assert!(result.data.is_some());
        assert_eq!(result.variable_reference.as_deref(), Some("temperature"));
    }

    #[tokio::test]
    async fn falls_back_to_a_dataset_summary() {
        let tool = StatsTool::new();
        let dataset =
            DatasetContext::with_columns(vec!["rainfall".to_string(), "region".to_string()]);
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };

        let result = tool
            .execute(&ToolRequest::new("summary statistics please"), &ctx)
            .await
            .unwrap();
        assert!(result.message.contains("2 columns"));
        assert!(!result.requires_additional_arguments);
    }
}
