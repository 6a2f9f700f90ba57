// Text is emitted one keystroke at a time so the fail-safe can interrupt mid-word.
use std::time::Duration;

use crate::errors::AgentResult;
use crate::executor::input::InputDevice;
use crate::executor::safety::FailSafe;

pub fn type_text(
    device: &dyn InputDevice,
    failsafe: &FailSafe,
    text: &str,
    interval: Duration,
) -> AgentResult<usize> {
    let mut typed = 0;
    for ch in text.chars() {
        failsafe.check(device)?;
        device.key_char(ch)?;
        typed += 1;
        if !interval.is_zero() {
            std::thread::sleep(interval);
        }
    }
    Ok(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InputCall, RecordingDevice};

    #[test]
    fn emits_one_keystroke_per_char() {
        let device = RecordingDevice::new();
        let typed = type_text(&device, &FailSafe::default(), "hé!", Duration::ZERO).unwrap();
        assert_eq!(typed, 3);
        assert_eq!(
            device.calls(),
            vec![InputCall::Key('h'), InputCall::Key('é'), InputCall::Key('!')]
        );
    }

    #[test]
    fn stops_when_pointer_reaches_a_corner() {
        let device = RecordingDevice::new();
        device.jump_to_corner_after(2);
        let err = type_text(&device, &FailSafe::default(), "abcdef", Duration::ZERO).unwrap_err();
        assert!(err.to_string().contains("fail-safe"));
        assert_eq!(device.calls().len(), 2);
    }
}
