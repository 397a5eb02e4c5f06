use super::{best_column_match, pronoun_reference};
use crate::config::ScoringConfig;
use crate::error::Result;
use crate::registry::CapabilityDescriptor;
use crate::resolver::tokenize;
use crate::tool::{Refinement, Tool, ToolContext, ToolRequest, ToolResult};
use async_trait::async_trait;
use serde_json::json;

/// One-shot visualization tool: choropleth-style maps of a single variable,
/// distributions, and correlation matrices. The actual rendering happens in
/// the front end; this tool produces the chart specification.
pub struct VisualizeTool {
    descriptor: CapabilityDescriptor,
}

impl VisualizeTool {
    pub fn new() -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(
                "visualize",
                &[
                    "map",
                    "plot",
                    "chart",
                    "graph",
                    "visualize",
                    "visualise",
                    "distribution",
                    "histogram",
                    "heatmap",
                    "correlation",
                    "matrix",
                ],
                &[
                    "map rainfall by district",
                    "plot the distribution of temperature",
                    "show a correlation matrix of the numeric columns",
                    "map it again",
                    "visualize access to facilities",
                ],
            )
            .requires_data_loaded(),
        }
    }

    fn wants_correlation_matrix(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("correlation") || lower.contains("heatmap")
    }
}

impl Default for VisualizeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for VisualizeTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn description(&self) -> &str {
        "Renders maps, distributions and correlation matrices of dataset variables"
    }

    fn can_handle(&self, message: &str, _ctx: &ToolContext<'_>) -> bool {
        let lower = message.to_lowercase();
        let tokens = tokenize(&lower);
        self.keywords()
            .iter()
            .any(|k| tokens.iter().any(|t| t == k))
    }

    fn refine(
        &self,
        tokens: &[String],
        message: &str,
        ctx: &ToolContext<'_>,
        scoring: &ScoringConfig,
    ) -> Refinement {
        let mut refinement = Refinement::default();

        if Self::wants_correlation_matrix(message) {
            refinement
                .arguments
                .insert("chart_type".to_string(), json!("correlation_matrix"));
        }

        // Trigger keywords ("map", "plot") are verbs here, never column
        // mentions; drop them before fuzzy matching.
        let candidates: Vec<String> = tokens
            .iter()
            .filter(|t| !self.keywords().iter().any(|k| k == *t))
            .cloned()
            .collect();
        match best_column_match(&candidates, &ctx.dataset.columns, scoring.fuzzy_match_threshold) {
            Some((column, _similarity)) => {
                refinement.bonus += scoring.fuzzy_bonus;
                refinement.matched_terms.push(column.clone());
                refinement
                    .arguments
                    .insert("variable_name".to_string(), json!(column));
            }
            None => {
                // "map it again" style references reuse the last variable
                // the user operated on.
                if let (Some(pronoun), Some(last)) = (
                    pronoun_reference(tokens),
                    ctx.session.last_variable_reference.as_deref(),
                ) {
                    refinement.bonus += scoring.pronoun_bonus;
                    refinement.matched_terms.push(pronoun.to_string());
                    refinement
                        .arguments
                        .insert("variable_name".to_string(), json!(last));
                }
            }
        }

        refinement.missing_arguments = !refinement.arguments.contains_key("variable_name")
            && !refinement.arguments.contains_key("chart_type");
        refinement
    }

    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        if let Some(variable) = request.argument_str("variable_name") {
            let chart_type = request.argument_str("chart_type").unwrap_or("choropleth");
            let payload = json!({
                "type": chart_type,
                "variable": variable,
            });
            return Ok(ToolResult::message(format!(
                "Here's a map of {variable} across the dataset."
            ))
            .with_visualization(payload)
            .with_variable_reference(variable));
        }

        if request.argument_str("chart_type") == Some("correlation_matrix")
            || Self::wants_correlation_matrix(&request.message)
        {
            let payload = json!({
                "type": "correlation_matrix",
                "columns": ctx.dataset.columns,
            });
            return Ok(ToolResult::message(
                "Here's a correlation matrix of the numeric columns.",
            )
            .with_visualization(payload));
        }

        // Direct invocation without resolver-inferred arguments: accept an
        // exact column mention, otherwise ask.
        let tokens = tokenize(&request.message);
        if let Some(column) = ctx
            .dataset
            .columns
            .iter()
            .find(|c| tokens.iter().any(|t| *t == c.to_lowercase()))
        {
            let payload = json!({
                "type": "choropleth",
                "variable": column,
            });
            return Ok(ToolResult::message(format!(
                "Here's a map of {column} across the dataset."
            ))
            .with_visualization(payload)
            .with_variable_reference(column.clone()));
        }

        Ok(ToolResult::clarification(format!(
            "Which variable would you like to see? Available columns: {}.",
            ctx.dataset.columns.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::tool::DatasetContext;
    use std::collections::HashMap;

    #[tokio::test]
    async fn executes_with_inferred_variable() {
        let tool = VisualizeTool::new();
        let dataset = DatasetContext::with_columns(vec!["rainfall".to_string()]);
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let mut args = HashMap::new();
        args.insert("variable_name".to_string(), json!("rainfall"));
        let request = ToolRequest::with_arguments("map rainfall", args);

        let result = tool.execute(&request, &ctx).await.unwrap();
        assert!(result.message.contains("rainfall"));
        assert!(result.visualization.is_some());
        assert_eq!(result.variable_reference.as_deref(), Some("rainfall"));
        assert!(!result.requires_additional_arguments);
    }

    #[tokio::test]
    async fn asks_for_a_variable_when_none_is_named() {
        let tool = VisualizeTool::new();
        let dataset = DatasetContext::with_columns(vec!["rainfall".to_string()]);
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let request = ToolRequest::new("map something for me");

        let result = tool.execute(&request, &ctx).await.unwrap();
        assert!(result.requires_additional_arguments);
        assert!(result.message.contains("rainfall"));
    }

    #[tokio::test]
    async fn correlation_matrix_needs_no_variable() {
        let tool = VisualizeTool::new();
        let dataset =
            DatasetContext::with_columns(vec!["rainfall".to_string(), "temperature".to_string()]);
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let request = ToolRequest::new("show me a correlation matrix");

        let result = tool.execute(&request, &ctx).await.unwrap();
        assert!(!result.requires_additional_arguments);
        let payload = result.visualization.unwrap();
        assert_eq!(payload["type"], json!("correlation_matrix"));
    }
}
