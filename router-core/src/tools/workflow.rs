use crate::config::ScoringConfig;
use crate::error::Result;
use crate::registry::CapabilityDescriptor;
use crate::session::{WorkflowInstance, WorkflowStage};
use crate::tool::{
    Refinement, Tool, ToolContext, ToolRequest, ToolResult, WorkflowSnapshot, WorkflowUpdate,
};
use async_trait::async_trait;
use serde_json::{json, Value};

const FACILITIES: &[&str] = &["district hospital", "health center", "mobile clinic"];
const AGE_GROUPS: &[&str] = &["0-11 months", "12-23 months", "24-59 months"];

/// Canned coverage percentages by (facility, age group); the real
/// computation lives in the analysis layer, not the router.
const COVERAGE_RATES: [[f64; 3]; 3] = [
    [78.4, 81.2, 69.5],
    [85.1, 74.8, 72.3],
    [66.7, 70.9, 64.2],
];

/// Guided multi-step workflow calculating an immunization coverage rate.
/// Collects a facility and an age group across sequential turns, then
/// produces the result. All run state lives in the session's
/// [`WorkflowInstance`]; the tool itself is stateless and shareable.
pub struct CoverageRateTool {
    descriptor: CapabilityDescriptor,
}

impl CoverageRateTool {
    pub const NAME: &'static str = "coverage_rate";

    pub fn new() -> Self {
        Self {
            descriptor: CapabilityDescriptor::new(
                Self::NAME,
                &["rate", "coverage", "immunization", "immunisation", "vaccination"],
                &[
                    "calculate the coverage rate",
                    "what is the immunization rate",
                    "start the coverage workflow",
                    "vaccination coverage by facility",
                ],
            )
            .requires_data_loaded(),
        }
    }

    fn prompt_for_stage(stage: WorkflowStage) -> String {
        match stage {
            WorkflowStage::AwaitingFacility => format!(
                "Which facility should we calculate the coverage rate for? Options: {}.",
                numbered(FACILITIES)
            ),
            WorkflowStage::AwaitingAgeGroup => {
                format!("Which age group? Options: {}.", numbered(AGE_GROUPS))
            }
            WorkflowStage::Calculating => "Calculating the coverage rate now.".to_string(),
            WorkflowStage::Complete => "This coverage calculation is already complete.".to_string(),
        }
    }

    fn options_for_stage(stage: WorkflowStage) -> Option<(&'static str, &'static [&'static str])> {
        match stage {
            WorkflowStage::AwaitingFacility => Some(("facility", FACILITIES)),
            WorkflowStage::AwaitingAgeGroup => Some(("age_group", AGE_GROUPS)),
            _ => None,
        }
    }

    /// Exact option name, or a 1-based numeric choice.
    fn exact_option(message: &str, options: &[&str]) -> Option<String> {
        let trimmed = message.trim().to_lowercase();
        if let Ok(index) = trimmed.parse::<usize>() {
            if index >= 1 && index <= options.len() {
                return Some(options[index - 1].to_string());
            }
        }
        options
            .iter()
            .find(|o| o.to_lowercase() == trimmed)
            .map(|o| o.to_string())
    }

    /// Looser match for full sentences ("let's use the district hospital").
    fn option_mentioned(message: &str, options: &[&str]) -> Option<String> {
        let lower = message.trim().to_lowercase();
        Self::exact_option(&lower, options).or_else(|| {
            options
                .iter()
                .find(|o| lower.contains(&o.to_lowercase()))
                .map(|o| o.to_string())
        })
    }

    fn finish(&self, mut instance: WorkflowInstance) -> ToolResult {
        let facility = selection_str(&instance, "facility");
        let age_group = selection_str(&instance, "age_group");
        let facility_idx = FACILITIES.iter().position(|f| *f == facility).unwrap_or(0);
        let age_idx = AGE_GROUPS.iter().position(|a| *a == age_group).unwrap_or(0);
        let rate = COVERAGE_RATES[facility_idx][age_idx];

        instance.stage = WorkflowStage::Complete;
        let data = json!({
            "facility": facility,
            "age_group": age_group,
            "coverage_rate_percent": rate,
        });
        ToolResult::message(format!(
            "Coverage rate for {facility}, ages {age_group}: {rate}%."
        ))
        .with_data(data)
        .with_workflow(WorkflowUpdate::Set(instance))
    }
}

fn numbered(options: &[&str]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}) {}", i + 1, o))
        .collect::<Vec<_>>()
        .join(", ")
}

fn selection_str(instance: &WorkflowInstance, slot: &str) -> String {
    instance
        .collected_selections
        .get(slot)
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

impl Default for CoverageRateTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CoverageRateTool {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn description(&self) -> &str {
        "Guided workflow: immunization coverage rate by facility and age group"
    }

    fn pausable(&self) -> bool {
        true
    }

    fn can_handle(&self, message: &str, ctx: &ToolContext<'_>) -> bool {
        let tokens = crate::resolver::tokenize(message);
        if self
            .keywords()
            .iter()
            .any(|k| tokens.iter().any(|t| t == k))
        {
            return true;
        }
        // While this workflow is running, an answer to its pending question
        // also belongs here.
        ctx.session
            .running_workflow()
            .filter(|w| w.tool_name == self.name())
            .and_then(|w| self.match_pending_slot(message, w))
            .is_some()
    }

    fn refine(
        &self,
        _tokens: &[String],
        message: &str,
        ctx: &ToolContext<'_>,
        scoring: &ScoringConfig,
    ) -> Refinement {
        let mut refinement = Refinement::default();
        let Some(workflow) = ctx
            .session
            .running_workflow()
            .filter(|w| w.tool_name == self.name())
        else {
            return refinement;
        };
        let Some((slot, options)) = Self::options_for_stage(workflow.stage) else {
            return refinement;
        };
        if let Some(choice) = Self::option_mentioned(message, options) {
            refinement.bonus += scoring.fuzzy_bonus;
            refinement.matched_terms.push(choice.clone());
            refinement.arguments.insert(slot.to_string(), json!(choice));
        }
        refinement
    }

    fn match_pending_slot(
        &self,
        message: &str,
        workflow: &WorkflowInstance,
    ) -> Option<(String, Value)> {
        let (slot, options) = Self::options_for_stage(workflow.stage)?;
        Self::exact_option(message, options).map(|choice| (slot.to_string(), json!(choice)))
    }

    async fn execute(&self, request: &ToolRequest, ctx: &ToolContext<'_>) -> Result<ToolResult> {
        let running = ctx
            .session
            .running_workflow()
            .filter(|w| w.tool_name == self.name())
            .cloned();

        let Some(mut instance) = running else {
            // Start a fresh run.
            let instance = WorkflowInstance::new(Self::NAME, WorkflowStage::AwaitingFacility);
            let prompt = format!(
                "Let's calculate a coverage rate. {}",
                Self::prompt_for_stage(WorkflowStage::AwaitingFacility)
            );
            return Ok(ToolResult::message(prompt).with_workflow(WorkflowUpdate::Set(instance)));
        };

        let Some((slot, options)) = Self::options_for_stage(instance.stage) else {
            return Ok(ToolResult::message(Self::prompt_for_stage(instance.stage)));
        };

        let answer = request
            .argument_str(slot)
            .map(str::to_string)
            .or_else(|| Self::option_mentioned(&request.message, options));

        let Some(choice) = answer else {
            // Not an answer we recognize; re-ask without touching the run
            // state.
            return Ok(ToolResult::clarification(format!(
                "I didn't catch that. {}",
                Self::prompt_for_stage(instance.stage)
            )));
        };

        instance
            .collected_selections
            .insert(slot.to_string(), json!(choice));

        match instance.stage {
            WorkflowStage::AwaitingFacility => {
                instance.stage = WorkflowStage::AwaitingAgeGroup;
                let prompt = format!(
                    "Got it: {choice}. {}",
                    Self::prompt_for_stage(WorkflowStage::AwaitingAgeGroup)
                );
                Ok(ToolResult::message(prompt).with_workflow(WorkflowUpdate::Set(instance)))
            }
            WorkflowStage::AwaitingAgeGroup => {
                instance.stage = WorkflowStage::Calculating;
                Ok(self.finish(instance))
            }
            _ => Ok(ToolResult::message(Self::prompt_for_stage(instance.stage))),
        }
    }

    fn pause(&self, workflow: &WorkflowInstance) -> Option<WorkflowSnapshot> {
        Some(WorkflowSnapshot {
            tool_name: workflow.tool_name.clone(),
            stage: workflow.pause_stage.unwrap_or(workflow.stage),
            collected_selections: workflow.collected_selections.clone(),
        })
    }

    async fn resume(
        &self,
        snapshot: &WorkflowSnapshot,
        _ctx: &ToolContext<'_>,
    ) -> Result<ToolResult> {
        let mut instance = WorkflowInstance::new(Self::NAME, snapshot.stage);
        instance.collected_selections = snapshot.collected_selections.clone();
        let prompt = format!(
            "Picking up where we left off. {}",
            Self::prompt_for_stage(snapshot.stage)
        );
        Ok(ToolResult::message(prompt).with_workflow(WorkflowUpdate::Set(instance)))
    }
}
