// Maps a validated action onto one physical input sequence and records the outcome.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::ExecutorConfig;
use crate::errors::{AgentError, AgentResult};
use crate::executor::input::InputDevice;
use crate::executor::safety::FailSafe;
use crate::executor::text_input::type_text;
use crate::lifecycle::state::{Action, ActionKind, ActionStatus, Coordinates};

/// Only one physical input sequence may run at a time, process-wide.
static INPUT_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Click(Coordinates),
    DoubleClick(Coordinates),
    RightClick(Coordinates),
    Settle(Duration),
    Type(String),
    Scroll(i32),
}

#[derive(Debug, Clone, PartialEq)]
enum Plan {
    Physical(Vec<Step>),
    Wait(Duration),
}

pub struct ActionExecutor {
    device: Arc<dyn InputDevice>,
    config: ExecutorConfig,
    failsafe: FailSafe,
}

impl ActionExecutor {
    pub fn new(device: Arc<dyn InputDevice>, config: ExecutorConfig) -> Self {
        let failsafe = FailSafe::new(config.failsafe, config.corner_margin_px);
        if !failsafe.is_enabled() {
            tracing::warn!("corner fail-safe disabled for this executor");
        }
        Self {
            device,
            config,
            failsafe,
        }
    }

    /// Runs `action` and returns a copy carrying the outcome. Identity, session
    /// and step are never touched; failures are recorded, never returned.
    pub async fn execute(&self, action: &Action) -> Action {
        let mut outcome = action.clone();
        let started = Instant::now();
        let result = self.dispatch(action).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        outcome.execution_time_ms = Some(elapsed_ms);
        match result {
            Ok(()) => {
                outcome.status = ActionStatus::Success;
                outcome.error_message = None;
                tracing::info!(
                    action_id = %action.id,
                    kind = %action.action_type,
                    elapsed_ms,
                    "action executed"
                );
            }
            Err(e) => {
                outcome.status = ActionStatus::Failed;
                outcome.error_message = Some(e.to_string());
                tracing::error!(
                    action_id = %action.id,
                    kind = %action.action_type,
                    elapsed_ms,
                    error = %e,
                    "action execution failed"
                );
            }
        }
        outcome
    }

    async fn dispatch(&self, action: &Action) -> AgentResult<()> {
        match plan(action, &self.config)? {
            Plan::Wait(duration) => {
                tracing::debug!(secs = duration.as_secs_f64(), "waiting");
                tokio::time::sleep(duration).await;
                Ok(())
            }
            Plan::Physical(steps) => {
                let device = Arc::clone(&self.device);
                let failsafe = self.failsafe;
                let pause = Duration::from_millis(self.config.action_pause_ms);
                let interval = Duration::from_millis(self.config.keystroke_interval_ms);
                tokio::task::spawn_blocking(move || {
                    run_sequence(device.as_ref(), &failsafe, pause, interval, &steps)
                })
                .await
                .map_err(|e| AgentError::ExecutionFailure(format!("input task aborted: {e}")))?
            }
        }
    }
}

fn require_coordinates(action: &Action) -> AgentResult<Coordinates> {
    action.coordinates().ok_or_else(|| {
        AgentError::Validation(format!("{} action requires coordinates", action.action_type))
    })
}

fn plan(action: &Action, config: &ExecutorConfig) -> AgentResult<Plan> {
    let steps = match action.action_type {
        ActionKind::Click => vec![Step::Click(require_coordinates(action)?)],
        ActionKind::DoubleClick => vec![Step::DoubleClick(require_coordinates(action)?)],
        ActionKind::RightClick => vec![Step::RightClick(require_coordinates(action)?)],
        ActionKind::Type => {
            let text = action
                .text
                .clone()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AgentError::Validation("type action requires text".into()))?;
            let mut steps = Vec::with_capacity(3);
            if let Some(at) = action.coordinates() {
                steps.push(Step::Click(at));
                steps.push(Step::Settle(Duration::from_millis(config.focus_settle_ms)));
            }
            steps.push(Step::Type(text));
            steps
        }
        ActionKind::Scroll => {
            let amount = action.number_param("amount").ok_or_else(|| {
                AgentError::Validation("scroll action requires a numeric amount parameter".into())
            })?;
            if !amount.is_finite() {
                return Err(AgentError::Validation(format!("scroll amount {amount} is not finite")));
            }
            let mut steps = Vec::with_capacity(3);
            if let Some(at) = action.coordinates() {
                steps.push(Step::Click(at));
                steps.push(Step::Settle(Duration::from_millis(config.scroll_settle_ms)));
            }
            steps.push(Step::Scroll(amount.round() as i32));
            steps
        }
        ActionKind::Wait => {
            let secs = action.number_param("duration").ok_or_else(|| {
                AgentError::Validation("wait action requires a numeric duration parameter".into())
            })?;
            let duration = Duration::try_from_secs_f64(secs).map_err(|_| {
                AgentError::Validation(format!("wait duration {secs} is not a valid number of seconds"))
            })?;
            return Ok(Plan::Wait(duration));
        }
    };
    Ok(Plan::Physical(steps))
}

fn run_sequence(
    device: &dyn InputDevice,
    failsafe: &FailSafe,
    pause: Duration,
    interval: Duration,
    steps: &[Step],
) -> AgentResult<()> {
    let _guard = INPUT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    for step in steps {
        match step {
            Step::Settle(d) => {
                std::thread::sleep(*d);
                continue;
            }
            Step::Click(at) => {
                failsafe.check(device)?;
                device.click(at.x, at.y)?;
                tracing::debug!(x = at.x, y = at.y, "clicked");
            }
            Step::DoubleClick(at) => {
                failsafe.check(device)?;
                device.double_click(at.x, at.y)?;
                tracing::debug!(x = at.x, y = at.y, "double clicked");
            }
            Step::RightClick(at) => {
                failsafe.check(device)?;
                device.right_click(at.x, at.y)?;
                tracing::debug!(x = at.x, y = at.y, "right clicked");
            }
            Step::Type(text) => {
                let typed = type_text(device, failsafe, text, interval)?;
                tracing::debug!(chars = typed, "typed text");
            }
            Step::Scroll(amount) => {
                failsafe.check(device)?;
                device.scroll(*amount)?;
                tracing::debug!(amount, "scrolled");
            }
        }
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::{ActionTarget, ParamValue, Parameters};
    use crate::testing::{InputCall, RecordingDevice};
    use chrono::Utc;
    use uuid::Uuid;

    fn executor(device: &Arc<RecordingDevice>) -> ActionExecutor {
        ActionExecutor::new(device.clone(), ExecutorConfig::immediate())
    }

    fn action(kind: ActionKind, at: Option<(i32, i32)>) -> Action {
        Action {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            step_number: 1,
            action_type: kind,
            target: Some(ActionTarget {
                element: "Submit".into(),
                coordinates: at.map(|(x, y)| Coordinates::new(x, y)),
                confidence: 0.9,
            }),
            text: None,
            parameters: None,
            status: ActionStatus::Pending,
            execution_time_ms: None,
            timestamp: Utc::now(),
            error_message: None,
            retry_count: 0,
        }
    }

    fn with_param(mut action: Action, key: &str, value: ParamValue) -> Action {
        let mut params = Parameters::new();
        params.insert(key.into(), value);
        action.parameters = Some(params);
        action
    }

    #[tokio::test]
    async fn click_hits_exact_coordinates_once() {
        let device = Arc::new(RecordingDevice::new());
        let input = action(ActionKind::Click, Some((100, 200)));
        let out = executor(&device).execute(&input).await;

        assert_eq!(out.status, ActionStatus::Success);
        assert_eq!(device.calls(), vec![InputCall::Click(100, 200)]);
        assert!(out.execution_time_ms.is_some());
        assert_eq!(out.id, input.id);
        assert_eq!(out.session_id, input.session_id);
        assert_eq!(out.step_number, input.step_number);
    }

    #[tokio::test]
    async fn double_and_right_click_dispatch_to_their_primitives() {
        let device = Arc::new(RecordingDevice::new());
        let exec = executor(&device);
        exec.execute(&action(ActionKind::DoubleClick, Some((150, 250)))).await;
        exec.execute(&action(ActionKind::RightClick, Some((300, 400)))).await;
        assert_eq!(
            device.calls(),
            vec![InputCall::DoubleClick(150, 250), InputCall::RightClick(300, 400)]
        );
    }

    #[tokio::test]
    async fn pointer_actions_without_coordinates_fail_locally() {
        let device = Arc::new(RecordingDevice::new());
        let exec = executor(&device);
        for kind in [ActionKind::Click, ActionKind::DoubleClick, ActionKind::RightClick] {
            let out = exec.execute(&action(kind, None)).await;
            assert_eq!(out.status, ActionStatus::Failed);
            assert!(out.error_message.as_deref().unwrap().contains("coordinates"));
            assert!(out.execution_time_ms.is_some());
        }
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn type_clicks_to_focus_then_types() {
        let device = Arc::new(RecordingDevice::new());
        let mut input = action(ActionKind::Type, Some((10, 20)));
        input.text = Some("ok".into());
        let out = executor(&device).execute(&input).await;

        assert_eq!(out.status, ActionStatus::Success);
        assert_eq!(
            device.calls(),
            vec![InputCall::Click(10, 20), InputCall::Key('o'), InputCall::Key('k')]
        );
    }

    #[tokio::test]
    async fn type_without_text_names_the_field() {
        let device = Arc::new(RecordingDevice::new());
        let out = executor(&device).execute(&action(ActionKind::Type, None)).await;
        assert_eq!(out.status, ActionStatus::Failed);
        assert!(out.error_message.unwrap().contains("text"));
    }

    #[tokio::test]
    async fn type_with_empty_text_fails_without_focus_click() {
        let device = Arc::new(RecordingDevice::new());
        let mut input = action(ActionKind::Type, Some((5, 5)));
        input.text = Some(String::new());
        let out = executor(&device).execute(&input).await;
        assert_eq!(out.status, ActionStatus::Failed);
        assert!(out.error_message.unwrap().contains("type action requires text"));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn scroll_uses_signed_amount() {
        let device = Arc::new(RecordingDevice::new());
        let input = with_param(
            action(ActionKind::Scroll, Some((50, 60))),
            "amount",
            ParamValue::Number(-5.0),
        );
        let out = executor(&device).execute(&input).await;
        assert_eq!(out.status, ActionStatus::Success);
        assert_eq!(device.calls(), vec![InputCall::Click(50, 60), InputCall::Scroll(-5)]);
    }

    #[tokio::test]
    async fn scroll_amount_beyond_i32_saturates() {
        let device = Arc::new(RecordingDevice::new());
        let input = with_param(action(ActionKind::Scroll, None), "amount", ParamValue::Number(-1e12));
        let out = executor(&device).execute(&input).await;
        assert_eq!(out.status, ActionStatus::Success);
        assert_eq!(device.calls(), vec![InputCall::Scroll(i32::MIN)]);
    }

    #[tokio::test]
    async fn scroll_rejects_non_numeric_amount() {
        let device = Arc::new(RecordingDevice::new());
        let input = with_param(
            action(ActionKind::Scroll, None),
            "amount",
            ParamValue::Text("a lot".into()),
        );
        let out = executor(&device).execute(&input).await;
        assert_eq!(out.status, ActionStatus::Failed);
        assert!(out.error_message.unwrap().contains("amount"));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn wait_blocks_for_duration_without_input() {
        let device = Arc::new(RecordingDevice::new());
        let input = with_param(action(ActionKind::Wait, None), "duration", ParamValue::Number(0.05));
        let out = executor(&device).execute(&input).await;
        assert_eq!(out.status, ActionStatus::Success);
        assert!(out.execution_time_ms.unwrap() >= 50);
        assert!(device.calls().is_empty());

        let missing = executor(&device).execute(&action(ActionKind::Wait, None)).await;
        assert!(missing.error_message.unwrap().contains("duration"));

        let negative = with_param(action(ActionKind::Wait, None), "duration", ParamValue::Number(-1.0));
        let out = executor(&device).execute(&negative).await;
        assert_eq!(out.status, ActionStatus::Failed);
    }

    #[tokio::test]
    async fn device_failure_is_recorded_not_raised() {
        let device = Arc::new(RecordingDevice::new());
        device.break_device();
        let out = executor(&device).execute(&action(ActionKind::Click, Some((1, 1)))).await;
        assert_eq!(out.status, ActionStatus::Failed);
        assert!(out.error_message.unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn failsafe_aborts_between_focus_click_and_typing() {
        let device = Arc::new(RecordingDevice::new());
        device.jump_to_corner_after(1);
        let mut input = action(ActionKind::Type, Some((10, 20)));
        input.text = Some("secret".into());
        let out = executor(&device).execute(&input).await;

        assert_eq!(out.status, ActionStatus::Failed);
        assert!(out.error_message.unwrap().contains("fail-safe"));
        assert_eq!(device.calls(), vec![InputCall::Click(10, 20)]);
    }

    #[tokio::test]
    async fn failsafe_can_be_disabled_at_construction() {
        let device = Arc::new(RecordingDevice::new());
        device.set_pointer(0, 0);
        let config = ExecutorConfig {
            failsafe: false,
            ..ExecutorConfig::immediate()
        };
        let exec = ActionExecutor::new(device.clone(), config);
        let out = exec.execute(&action(ActionKind::Click, Some((5, 5)))).await;
        assert_eq!(out.status, ActionStatus::Success);
    }

    #[tokio::test]
    async fn concurrent_sequences_do_not_interleave() {
        let device = Arc::new(RecordingDevice::new());
        let exec = Arc::new(executor(&device));
        let mut first = action(ActionKind::Type, Some((1, 1)));
        first.text = Some("aaaa".into());
        let mut second = action(ActionKind::Type, Some((2, 2)));
        second.text = Some("bbbb".into());

        let (a, b) = tokio::join!(
            { let exec = exec.clone(); async move { exec.execute(&first).await } },
            { let exec = exec.clone(); async move { exec.execute(&second).await } },
        );
        assert_eq!(a.status, ActionStatus::Success);
        assert_eq!(b.status, ActionStatus::Success);

        let calls = device.calls();
        assert_eq!(calls.len(), 10);
        let (head, tail) = calls.split_at(5);
        for block in [head, tail] {
            let expected_key = match block[0] {
                InputCall::Click(1, 1) => 'a',
                InputCall::Click(2, 2) => 'b',
                ref other => panic!("sequence must start with its focus click, got {other:?}"),
            };
            assert!(block[1..].iter().all(|c| *c == InputCall::Key(expected_key)));
        }
    }
}
