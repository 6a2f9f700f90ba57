// Physical input simulation. Every call is blocking and must run off the async runtime.
use enigo::{Axis, Button, Coordinate, Direction, Enigo, InputError, Key, Keyboard, Mouse, Settings};

use crate::errors::{AgentError, AgentResult};

/// The primitive operations the executor drives. Implementations talk to the
/// real pointer/keyboard; tests substitute a recorder.
pub trait InputDevice: Send + Sync {
    fn click(&self, x: i32, y: i32) -> AgentResult<()>;
    fn double_click(&self, x: i32, y: i32) -> AgentResult<()>;
    fn right_click(&self, x: i32, y: i32) -> AgentResult<()>;
    fn key_char(&self, ch: char) -> AgentResult<()>;
    /// Positive scrolls up, negative scrolls down.
    fn scroll(&self, amount: i32) -> AgentResult<()>;
    fn pointer_position(&self) -> AgentResult<(i32, i32)>;
    fn display_size(&self) -> AgentResult<(i32, i32)>;
}

/// `enigo`-backed device. A connection is opened per primitive so the device
/// itself stays `Send + Sync` on every platform.
#[derive(Default)]
pub struct EnigoDevice {
    settings: Settings,
}

impl EnigoDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn connect(&self) -> AgentResult<Enigo> {
        Enigo::new(&self.settings)
            .map_err(|e| AgentError::ExecutionFailure(format!("input device unavailable: {e}")))
    }

    fn press(&self, x: i32, y: i32, button: Button, times: usize) -> AgentResult<()> {
        let mut enigo = self.connect()?;
        enigo.move_mouse(x, y, Coordinate::Abs).map_err(input_failure)?;
        for _ in 0..times {
            enigo.button(button, Direction::Click).map_err(input_failure)?;
        }
        Ok(())
    }
}

/// enigo treats positive lengths as "down"; callers use positive for "up".
fn wheel_length(amount: i32) -> i32 {
    amount.saturating_neg()
}

fn input_failure(e: InputError) -> AgentError {
    AgentError::ExecutionFailure(e.to_string())
}

impl InputDevice for EnigoDevice {
    fn click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.press(x, y, Button::Left, 1)
    }

    fn double_click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.press(x, y, Button::Left, 2)
    }

    fn right_click(&self, x: i32, y: i32) -> AgentResult<()> {
        self.press(x, y, Button::Right, 1)
    }

    fn key_char(&self, ch: char) -> AgentResult<()> {
        let mut enigo = self.connect()?;
        match ch {
            '\n' => enigo.key(Key::Return, Direction::Click),
            '\t' => enigo.key(Key::Tab, Direction::Click),
            c => enigo.key(Key::Unicode(c), Direction::Click),
        }
        .map_err(input_failure)
    }

    fn scroll(&self, amount: i32) -> AgentResult<()> {
        self.connect()?
            .scroll(wheel_length(amount), Axis::Vertical)
            .map_err(input_failure)
    }

    fn pointer_position(&self) -> AgentResult<(i32, i32)> {
        self.connect()?.location().map_err(input_failure)
    }

    fn display_size(&self) -> AgentResult<(i32, i32)> {
        self.connect()?.main_display().map_err(input_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_length_flips_direction_without_overflow() {
        assert_eq!(wheel_length(3), -3);
        assert_eq!(wheel_length(-7), 7);
        assert_eq!(wheel_length(i32::MIN), i32::MAX);
    }
}
