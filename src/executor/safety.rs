// Corner fail-safe: parking the pointer in any screen corner aborts physical input.
use crate::errors::{AgentError, AgentResult};
use crate::executor::input::InputDevice;

#[derive(Debug, Clone, Copy)]
pub struct FailSafe {
    enabled: bool,
    margin: i32,
}

impl FailSafe {
    pub fn new(enabled: bool, margin_px: u32) -> Self {
        Self {
            enabled,
            margin: i32::try_from(margin_px).unwrap_or(i32::MAX),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Must be called before every physical primitive, including each keystroke.
    pub fn check(&self, device: &dyn InputDevice) -> AgentResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let (x, y) = device.pointer_position()?;
        let (width, height) = device.display_size()?;
        if in_corner(x, y, width, height, self.margin) {
            tracing::warn!(x, y, "fail-safe triggered, aborting physical input");
            return Err(AgentError::ExecutionFailure(format!(
                "fail-safe triggered: pointer at ({x}, {y}) is in a screen corner"
            )));
        }
        Ok(())
    }
}

impl Default for FailSafe {
    fn default() -> Self {
        Self::new(true, 0)
    }
}

pub fn in_corner(x: i32, y: i32, width: i32, height: i32, margin: i32) -> bool {
    let horizontal = x <= margin || x >= width - 1 - margin;
    let vertical = y <= margin || y >= height - 1 - margin;
    horizontal && vertical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDevice;

    #[test]
    fn detects_all_four_corners() {
        for (x, y) in [(0, 0), (1919, 0), (0, 1079), (1919, 1079)] {
            assert!(in_corner(x, y, 1920, 1080, 0), "({x}, {y})");
        }
        assert!(!in_corner(0, 500, 1920, 1080, 0));
        assert!(!in_corner(960, 0, 1920, 1080, 0));
        assert!(in_corner(3, 2, 1920, 1080, 5));
    }

    #[test]
    fn check_blocks_only_when_enabled() {
        let device = RecordingDevice::new();
        device.set_pointer(0, 0);
        let err = FailSafe::default().check(&device).unwrap_err();
        assert!(err.to_string().contains("fail-safe"));
        assert!(FailSafe::new(false, 0).check(&device).is_ok());

        device.set_pointer(400, 300);
        assert!(FailSafe::default().check(&device).is_ok());
    }
}
