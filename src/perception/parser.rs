// Turns untrusted model text into a validated recommendation, atomically.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::lifecycle::state::{
    ActionKind, ActionTarget, ActionTemplate, Coordinates, ParamValue, Parameters,
};
use crate::perception::types::RecommendationResult;

const CANDIDATE_CONFIDENCE: f64 = 0.5;
const RECOMMENDED_CONFIDENCE: f64 = 0.8;

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_+.-]*[ \t]*(?:\r?\n)?").expect("fence pattern is valid"))
}

/// Removes a leading ```` ``` ```` / ```` ```json ```` fence and a trailing fence.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(m) = fence_open().find(text) {
        text = &text[m.end()..];
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

pub fn parse_recommendation(raw: &str) -> AgentResult<RecommendationResult> {
    let body = strip_code_fence(raw);
    let data: Value = serde_json::from_str(body).map_err(|e| {
        tracing::debug!(raw = %raw, "undecodable model response");
        AgentError::malformed(format!("not valid JSON: {e}"), raw)
    })?;
    if !data.is_object() {
        return Err(AgentError::malformed("top-level value is not an object", raw));
    }

    let current_screen = match &data["current_screen"] {
        Value::Null => "Unknown".to_string(),
        Value::String(s) => s.clone(),
        _ => return Err(AgentError::malformed("'current_screen' is not a string", raw)),
    };

    let available_actions = match &data["available_actions"] {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .map(|item| candidate(item, raw))
            .collect::<AgentResult<Vec<_>>>()?,
        _ => return Err(AgentError::malformed("'available_actions' is not a list", raw)),
    };

    let (recommended_action, reasoning) = match &data["recommended_action"] {
        Value::Null => (None, None),
        rec @ Value::Object(_) => {
            let reasoning = rec["reasoning"].as_str().map(str::to_string);
            (Some(recommended(rec, raw)?), reasoning)
        }
        _ => return Err(AgentError::malformed("'recommended_action' is not an object", raw)),
    };

    Ok(RecommendationResult {
        current_screen,
        available_actions,
        recommended_action,
        reasoning,
    })
}

fn candidate(item: &Value, raw: &str) -> AgentResult<ActionTarget> {
    let element = item["element"]
        .as_str()
        .ok_or_else(|| AgentError::malformed("available action is missing 'element'", raw))?;
    Ok(ActionTarget {
        element: element.to_string(),
        coordinates: coordinates(&item["coordinates"]),
        confidence: confidence(&item["confidence"], CANDIDATE_CONFIDENCE, raw)?,
    })
}

fn recommended(rec: &Value, raw: &str) -> AgentResult<ActionTemplate> {
    let element = match &rec["target"] {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        _ => return Err(AgentError::malformed("recommended 'target' is not a string", raw)),
    };
    let action_type = match &rec["action_type"] {
        Value::Null => ActionKind::Click,
        Value::String(s) => s.parse::<ActionKind>()?,
        other => return Err(AgentError::UnknownActionKind(other.to_string())),
    };
    let text = match &rec["text"] {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        _ => return Err(AgentError::malformed("recommended 'text' is not a string", raw)),
    };
    let parameters = match &rec["parameters"] {
        Value::Null => None,
        Value::Object(map) => Some(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), scalar(v, raw)?)))
                .collect::<AgentResult<Parameters>>()?,
        ),
        _ => return Err(AgentError::malformed("recommended 'parameters' is not an object", raw)),
    };

    Ok(ActionTemplate {
        action_type,
        target: Some(ActionTarget {
            element,
            coordinates: coordinates(&rec["coordinates"]),
            confidence: confidence(&rec["confidence"], RECOMMENDED_CONFIDENCE, raw)?,
        }),
        text,
        parameters,
    })
}

/// Both axes must be present and numeric; anything less means "no coordinates".
fn coordinates(value: &Value) -> Option<Coordinates> {
    let axis = |v: &Value| -> Option<i32> {
        let n = v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))?;
        i32::try_from(n).ok()
    };
    Some(Coordinates::new(axis(&value["x"])?, axis(&value["y"])?))
}

fn confidence(value: &Value, default: f64, raw: &str) -> AgentResult<f64> {
    match value {
        Value::Null => Ok(default),
        Value::Number(n) => {
            let c = n.as_f64().unwrap_or(f64::NAN);
            if (0.0..=1.0).contains(&c) {
                Ok(c)
            } else {
                Err(AgentError::malformed(format!("confidence {n} is outside [0, 1]"), raw))
            }
        }
        _ => Err(AgentError::malformed("confidence is not a number", raw)),
    }
}

fn scalar(value: &Value, raw: &str) -> AgentResult<ParamValue> {
    match value {
        Value::Bool(b) => Ok(ParamValue::Bool(*b)),
        Value::Number(n) => n
            .as_f64()
            .map(ParamValue::Number)
            .ok_or_else(|| AgentError::malformed(format!("parameter {n} is not representable"), raw)),
        Value::String(s) => Ok(ParamValue::Text(s.clone())),
        _ => Err(AgentError::malformed("parameters must be scalar values", raw)),
    }
}
