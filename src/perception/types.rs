use serde::{Deserialize, Serialize};

use crate::lifecycle::state::{ActionTarget, ActionTemplate};

/// What the model saw and what it suggests doing next. Never persisted here;
/// the caller decides whether to bind and store the recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub current_screen: String,
    pub available_actions: Vec<ActionTarget>,
    pub recommended_action: Option<ActionTemplate>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}
