use crate::config::ScoringConfig;
use crate::registry::ToolRegistry;
use crate::tool::{Tool, ToolContext};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Score assigned when a bare message answers the pending slot of the
/// running workflow, bypassing keyword scoring entirely.
const SLOT_FAST_PATH_SCORE: f64 = 4.0;

/// Tokens too generic to count as example-query overlap.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "for", "with", "and", "or", "is", "are",
    "was", "be", "do", "does", "did", "what", "whats", "how", "can", "could", "would", "me",
    "my", "i", "you", "it", "its", "this", "that", "these", "those", "please", "about",
];

/// Confidence-scored proposal naming one tool and its inferred arguments.
/// Constructed fresh per resolution attempt and consumed immediately.
#[derive(Debug, Clone)]
pub struct ToolResolution {
    pub tool_name: String,
    /// Normalized view of `score`, in [0, 1).
    pub confidence: f64,
    /// Raw unbounded scoring value.
    pub score: f64,
    pub inferred_arguments: HashMap<String, Value>,
    pub requires_additional_arguments: bool,
    /// Which keywords/terms contributed, for offline threshold tuning.
    pub matched_terms: Vec<String>,
}

/// Lowercased alphanumeric tokens of an utterance. Stopwords are kept here;
/// individual scoring signals filter them as needed (pronoun detection
/// wants "it", example overlap does not).
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

#[derive(Debug, Default)]
struct Candidate {
    score: f64,
    arguments: HashMap<String, Value>,
    matched_terms: Vec<String>,
    missing_arguments: bool,
}

/// Deterministic, explainable mapping from free text to a tool proposal.
///
/// No language model is involved: a declined resolution (`None`) is the
/// signal for the caller to fall back to its reasoning collaborator.
pub struct IntentResolver {
    config: ScoringConfig,
}

impl IntentResolver {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Resolves `text` against the registry, or declines.
    ///
    /// Empty input always declines. A bare answer to the running workflow's
    /// pending slot short-circuits to that workflow. Otherwise every tool is
    /// scored and the strictly highest score wins, with ties broken by
    /// registration order; a winner below the acceptance threshold declines.
    pub fn resolve(
        &self,
        text: &str,
        registry: &ToolRegistry,
        ctx: &ToolContext<'_>,
    ) -> Option<ToolResolution> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let tokens = tokenize(trimmed);
        if tokens.is_empty() {
            return None;
        }

        if let Some(resolution) = self.slot_fast_path(trimmed, registry, ctx) {
            return Some(resolution);
        }

        let lower = trimmed.to_lowercase();
        let mut best: Option<(String, Candidate)> = None;
        for tool in registry.iter() {
            let candidate = self.score_tool(tool.as_ref(), &tokens, &lower, trimmed, ctx);
            tracing::trace!(
                target: "resolver",
                tool = tool.name(),
                score = candidate.score,
                "scored candidate"
            );
            let better = match &best {
                Some((_, current)) => candidate.score > current.score,
                None => candidate.score > 0.0,
            };
            if better {
                best = Some((tool.name().to_string(), candidate));
            }
        }

        let (tool_name, candidate) = best?;
        if candidate.score < self.config.acceptance_threshold {
            tracing::debug!(
                target: "resolver",
                tool = %tool_name,
                score = candidate.score,
                threshold = self.config.acceptance_threshold,
                "below acceptance threshold, declining"
            );
            return None;
        }

        let resolution = ToolResolution {
            tool_name,
            confidence: self.normalize(candidate.score),
            score: candidate.score,
            inferred_arguments: candidate.arguments,
            requires_additional_arguments: candidate.missing_arguments,
            matched_terms: candidate.matched_terms,
        };
        tracing::debug!(
            target: "resolver",
            tool = %resolution.tool_name,
            confidence = resolution.confidence,
            score = resolution.score,
            matched_terms = ?resolution.matched_terms,
            final_args = ?resolution.inferred_arguments,
            "resolved"
        );
        Some(resolution)
    }

    /// A message that is only a number or a short token exactly matching the
    /// running workflow's expected slot value belongs to that workflow.
    fn slot_fast_path(
        &self,
        message: &str,
        registry: &ToolRegistry,
        ctx: &ToolContext<'_>,
    ) -> Option<ToolResolution> {
        let workflow = ctx.session.running_workflow()?;
        let tool = registry.get(&workflow.tool_name)?;
        let (slot, value) = tool.match_pending_slot(message, workflow)?;

        let rendered = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        let mut arguments = HashMap::new();
        arguments.insert(slot, value);
        tracing::debug!(
            target: "resolver",
            tool = %workflow.tool_name,
            answer = %rendered,
            "slot fast path"
        );
        Some(ToolResolution {
            tool_name: workflow.tool_name.clone(),
            confidence: self.normalize(SLOT_FAST_PATH_SCORE),
            score: SLOT_FAST_PATH_SCORE,
            inferred_arguments: arguments,
            requires_additional_arguments: false,
            matched_terms: vec![rendered],
        })
    }

    fn score_tool(
        &self,
        tool: &dyn Tool,
        tokens: &[String],
        lower: &str,
        original: &str,
        ctx: &ToolContext<'_>,
    ) -> Candidate {
        let descriptor = tool.descriptor();
        let mut candidate = Candidate::default();

        for keyword in &descriptor.trigger_keywords {
            let keyword_lc = keyword.to_lowercase();
            let hit = if keyword_lc.contains(' ') {
                lower.contains(&keyword_lc)
            } else {
                tokens.iter().any(|t| *t == keyword_lc)
            };
            if hit {
                candidate.score += self.config.keyword_weight;
                candidate.matched_terms.push(keyword.clone());
            }
        }

        let example_tokens: HashSet<String> = descriptor
            .example_queries
            .iter()
            .flat_map(|q| tokenize(q))
            .filter(|t| !is_stopword(t))
            .collect();
        let mut seen: HashSet<&str> = HashSet::new();
        for token in tokens {
            if is_stopword(token) || !seen.insert(token.as_str()) {
                continue;
            }
            if example_tokens.contains(token.as_str()) {
                candidate.score += self.config.example_token_weight;
            }
        }

        // Refinement hooks only run once there is some textual evidence for
        // the tool; a fuzzy column hit alone must not select a tool the
        // user gave no verb for.
        if candidate.score > 0.0 {
            let refinement = tool.refine(tokens, original, ctx, &self.config);
            candidate.score += refinement.bonus;
            candidate.arguments.extend(refinement.arguments);
            candidate.matched_terms.extend(refinement.matched_terms);
            candidate.missing_arguments = refinement.missing_arguments;
        }

        if !descriptor.preconditions_met(ctx.dataset) {
            candidate.score *= self.config.precondition_penalty;
        }

        candidate
    }

    fn normalize(&self, score: f64) -> f64 {
        score / (score + self.config.confidence_normalizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouterConfig, ScoringConfig};
    use crate::registry::{CapabilityDescriptor, ToolRegistry};
    use crate::session::SessionState;
    use crate::tool::{DatasetContext, ToolRequest, ToolResult};
    use crate::tools::{StatsTool, VisualizeTool};
    use async_trait::async_trait;
    use std::sync::Arc;

    fn default_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(VisualizeTool::new())).unwrap();
        registry.register(Arc::new(StatsTool::new())).unwrap();
        registry
    }

    fn resolver() -> IntentResolver {
        IntentResolver::new(RouterConfig::default().scoring)
    }

    fn rainfall_dataset() -> DatasetContext {
        DatasetContext::with_columns(vec![
            "rainfall".to_string(),
            "temperature".to_string(),
            "region".to_string(),
        ])
    }

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("Map the Rainfall-Distribution!"),
            vec!["map", "the", "rainfall", "distribution"]
        );
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn empty_input_declines() {
        let registry = default_registry();
        let dataset = rainfall_dataset();
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        assert!(resolver().resolve("", &registry, &ctx).is_none());
        assert!(resolver().resolve("   \t ", &registry, &ctx).is_none());
    }

    #[test]
    fn scenario_a_maps_a_known_column() {
        let registry = default_registry();
        let dataset = rainfall_dataset();
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };

        let resolution = resolver()
            .resolve("map rainfall distribution", &registry, &ctx)
            .expect("should resolve deterministically");
        assert_eq!(resolution.tool_name, "visualize");
        assert_eq!(
            resolution.inferred_arguments.get("variable_name"),
            Some(&Value::String("rainfall".to_string()))
        );
        assert!(resolution.confidence >= 0.8, "confidence {}", resolution.confidence);
        assert!(!resolution.requires_additional_arguments);
        assert!(resolution.matched_terms.iter().any(|t| t == "map"));
    }

    #[test]
    fn scenario_b_pronoun_reuses_last_variable() {
        let registry = default_registry();
        let dataset = rainfall_dataset();
        let mut session = SessionState::new("s1");
        session.note_variable("rainfall", 10);
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };

        let resolution = resolver()
            .resolve("map it again", &registry, &ctx)
            .expect("pronoun path should resolve");
        assert_eq!(resolution.tool_name, "visualize");
        assert_eq!(
            resolution.inferred_arguments.get("variable_name"),
            Some(&Value::String("rainfall".to_string()))
        );
    }

    #[test]
    fn scenario_c_unrelated_question_declines() {
        let registry = default_registry();
        let dataset = rainfall_dataset();
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };

        assert!(resolver()
            .resolve("what's the best way to think about this?", &registry, &ctx)
            .is_none());
    }

    #[test]
    fn appending_a_strong_keyword_never_decreases_the_score() {
        let registry = default_registry();
        let dataset = rainfall_dataset();
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let resolver = resolver();

        let weak = "what's the best way to think about this?";
        assert!(resolver.resolve(weak, &registry, &ctx).is_none());

        let strengthened = format!("{weak} map rainfall");
        let resolution = resolver
            .resolve(&strengthened, &registry, &ctx)
            .expect("adding a strong keyword must be able to cross the threshold");
        assert_eq!(resolution.tool_name, "visualize");
    }

    #[test]
    fn missing_preconditions_penalize_but_do_not_zero() {
        let registry = default_registry();
        let mut dataset = rainfall_dataset();
        let session = SessionState::new("s1");

        let loaded_score = {
            let ctx = ToolContext {
                dataset: &dataset,
                session: &session,
            };
            resolver()
                .resolve("map rainfall distribution", &registry, &ctx)
                .unwrap()
                .score
        };

        // Same text, data no longer loaded: the score shrinks by exactly the
        // penalty factor, but an overwhelming textual match still resolves.
        dataset.data_loaded = false;
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        let penalized = resolver()
            .resolve("map rainfall distribution", &registry, &ctx)
            .expect("strong match should survive the penalty");
        assert_eq!(penalized.tool_name, "visualize");
        assert!((penalized.score - loaded_score * 0.4).abs() < 1e-9);
    }

    struct FixedScoreTool {
        descriptor: CapabilityDescriptor,
    }

    impl FixedScoreTool {
        fn named(name: &str) -> Arc<dyn crate::tool::Tool> {
            Arc::new(Self {
                descriptor: CapabilityDescriptor::new(name, &["ping"], &[]),
            })
        }
    }

    #[async_trait]
    impl crate::tool::Tool for FixedScoreTool {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        fn description(&self) -> &str {
            "fixed"
        }

        fn can_handle(&self, message: &str, _ctx: &ToolContext<'_>) -> bool {
            message.contains("ping")
        }

        async fn execute(
            &self,
            _request: &ToolRequest,
            _ctx: &ToolContext<'_>,
        ) -> crate::error::Result<ToolResult> {
            Ok(ToolResult::message("pong"))
        }
    }

    #[test]
    fn exact_ties_go_to_the_earlier_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(FixedScoreTool::named("alpha")).unwrap();
        registry.register(FixedScoreTool::named("beta")).unwrap();

        let dataset = DatasetContext::default();
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };

        // Both tools score identically on "ping"; use a permissive
        // threshold so the tie itself is what is under test.
        let mut config = ScoringConfig::default();
        config.acceptance_threshold = 1.0;
        let resolution = IntentResolver::new(config)
            .resolve("ping", &registry, &ctx)
            .expect("should resolve");
        assert_eq!(resolution.tool_name, "alpha");
    }

    #[test]
    fn can_handle_is_pure() {
        let registry = default_registry();
        let dataset = rainfall_dataset();
        let session = SessionState::new("s1");
        let ctx = ToolContext {
            dataset: &dataset,
            session: &session,
        };
        for tool in registry.iter() {
            let first = tool.can_handle("map rainfall distribution", &ctx);
            let second = tool.can_handle("map rainfall distribution", &ctx);
            assert_eq!(first, second, "can_handle must be deterministic");
        }
    }
}
