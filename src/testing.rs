//! Test doubles for the input device and the model transport.
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{AgentError, AgentResult};
use crate::executor::input::InputDevice;
use crate::llm::provider::LlmProvider;
use crate::llm::types::CallConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum InputCall {
    Click(i32, i32),
    DoubleClick(i32, i32),
    RightClick(i32, i32),
    Key(char),
    Scroll(i32),
}

#[derive(Debug)]
struct DeviceState {
    calls: Vec<InputCall>,
    pointer: (i32, i32),
    display: (i32, i32),
    corner_after: Option<usize>,
    broken: bool,
}

/// Records every primitive instead of moving the real pointer.
#[derive(Debug)]
pub struct RecordingDevice {
    state: Mutex<DeviceState>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState {
                calls: Vec::new(),
                pointer: (400, 300),
                display: (1920, 1080),
                corner_after: None,
                broken: false,
            }),
        }
    }

    pub fn calls(&self) -> Vec<InputCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn set_pointer(&self, x: i32, y: i32) {
        self.state.lock().unwrap().pointer = (x, y);
    }

    /// The pointer lands in the top-left corner once `n` primitives have run.
    pub fn jump_to_corner_after(&self, n: usize) {
        self.state.lock().unwrap().corner_after = Some(n);
    }

    /// Every primitive fails as if the device were unavailable.
    pub fn break_device(&self) {
        self.state.lock().unwrap().broken = true;
    }

    fn record(&self, call: InputCall) -> AgentResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.broken {
            return Err(AgentError::ExecutionFailure("input device unavailable".into()));
        }
        state.calls.push(call);
        if state.corner_after == Some(state.calls.len()) {
            state.pointer = (0, 0);
        }
        Ok(())
    }
}

impl InputDevice for RecordingDevice {
    fn click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.record(InputCall::Click(x, y))
    }

    fn double_click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.record(InputCall::DoubleClick(x, y))
    }

    fn right_click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.record(InputCall::RightClick(x, y))
    }

    fn key_char(&self, ch: char) -> AgentResult<()> {
        self.record(InputCall::Key(ch))
    }

    fn scroll(&self, amount: i32) -> AgentResult<()> {
        self.record(InputCall::Scroll(amount))
    }

    fn pointer_position(&self) -> AgentResult<(i32, i32)> {
        Ok(self.state.lock().unwrap().pointer)
    }

    fn display_size(&self) -> AgentResult<(i32, i32)> {
        Ok(self.state.lock().unwrap().display)
    }
}

/// Replays canned completions in order; `Err` entries become transport failures.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, CallConfig)>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<(String, CallConfig)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _image_png: &[u8], cfg: &CallConfig) -> AgentResult<String> {
        self.prompts.lock().unwrap().push((prompt.to_string(), cfg.clone()));
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(msg)) => Err(AgentError::LlmProvider(msg)),
            None => Err(AgentError::LlmProvider("no scripted reply left".into())),
        }
    }
}
