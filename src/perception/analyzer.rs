use std::sync::Arc;

use crate::errors::AgentResult;
use crate::llm::provider::LlmProvider;
use crate::llm::registry::{ModelRole, ProviderRegistry};
use crate::llm::types::CallConfig;
use crate::perception::parser::parse_recommendation;
use crate::perception::types::RecommendationResult;

const ANALYSIS_PROMPT: &str = r#"You are a UI automation assistant. Look at the screenshot and report:

1. What the current screen shows.
2. Every interactive element you can see (buttons, inputs, menus, ...) with its approximate pixel coordinates.
3. The single next action that best advances the task.

Reply with exactly one JSON object and nothing else:
{
    "current_screen": "what is shown",
    "available_actions": [
        {"element": "element description", "coordinates": {"x": 100, "y": 200}, "confidence": 0.95}
    ],
    "recommended_action": {
        "action_type": "click|double_click|right_click|type|scroll|wait",
        "target": "element to interact with",
        "text": "text to type, only for type",
        "coordinates": {"x": 100, "y": 200},
        "parameters": {"amount": -3, "duration": 2},
        "confidence": 0.9,
        "reasoning": "why this action"
    }
}

Rules:
- Coordinates are screen pixels of the screenshot.
- Confidence is between 0.0 and 1.0.
- "parameters.amount" (positive scrolls up) is required for scroll, "parameters.duration" (seconds) for wait.
- Never recommend actions that submit payments or make irreversible changes."#;

const PAYMENT_PROMPT: &str = r#"Does this screenshot show a payment screen?
Signs include card or bank details forms, "Pay", "Purchase", "Place order" or "Complete order" buttons, price or total confirmations, and payment method pickers.

Answer with only "true" or "false"."#;

/// Asks the vision model about a screenshot.
pub struct ScreenAnalyzer {
    vision: Arc<dyn LlmProvider>,
    vision_cfg: CallConfig,
    classifier: Arc<dyn LlmProvider>,
    classifier_cfg: CallConfig,
}

impl ScreenAnalyzer {
    pub fn new(
        vision: (Arc<dyn LlmProvider>, CallConfig),
        classifier: (Arc<dyn LlmProvider>, CallConfig),
    ) -> Self {
        Self {
            vision: vision.0,
            vision_cfg: vision.1,
            classifier: classifier.0,
            classifier_cfg: classifier.1,
        }
    }

    pub fn from_registry(registry: &ProviderRegistry) -> AgentResult<Self> {
        Ok(Self::new(
            registry.call_config_for_role(ModelRole::Vision)?,
            registry.call_config_for_role(ModelRole::Classifier)?,
        ))
    }

    pub fn build_prompt(task_context: Option<&str>) -> String {
        match task_context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(ctx) => format!("{ANALYSIS_PROMPT}\n\nTask context: {ctx}"),
            None => ANALYSIS_PROMPT.to_string(),
        }
    }

    /// Transport errors propagate; so do parse failures.
    pub async fn analyze_screen(
        &self,
        image_png: &[u8],
        task_context: Option<&str>,
    ) -> AgentResult<RecommendationResult> {
        let prompt = Self::build_prompt(task_context);
        let text = self.vision.complete(&prompt, image_png, &self.vision_cfg).await?;
        let result = parse_recommendation(&text)?;
        tracing::info!(
            screen = %result.current_screen,
            candidates = result.available_actions.len(),
            recommended = ?result.recommended_action.as_ref().map(|a| a.action_type),
            "screen analyzed"
        );
        Ok(result)
    }

    /// Fails safe: any transport or decoding problem counts as a payment screen.
    pub async fn detect_payment_screen(&self, image_png: &[u8]) -> bool {
        match self
            .classifier
            .complete(PAYMENT_PROMPT, image_png, &self.classifier_cfg)
            .await
        {
            Ok(answer) => {
                let is_payment = answer.trim().to_lowercase().contains("true");
                if is_payment {
                    tracing::warn!("payment screen detected");
                }
                is_payment
            }
            Err(e) => {
                tracing::error!(error = %e, "payment detection failed; treating screen as payment");
                true
            }
        }
    }
}
