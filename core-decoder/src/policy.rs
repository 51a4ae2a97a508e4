//! Repeated-frame suppression.
//!
//! Some sensor variants report the same time-on value for consecutive frames
//! even though only the first one is real. While the stream length is still
//! unknown such a frame is dropped. The fixed-resolution sensor (32 pixels
//! wide) legitimately repeats time-on values and is exempt.

use bridge_traits::CptvFrameHeader;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRepeatPolicy {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Frame width that is never subject to suppression.
    #[serde(default = "default_exempt_width")]
    pub exempt_width: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_exempt_width() -> u32 {
    32
}

impl Default for FrameRepeatPolicy {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            exempt_width: default_exempt_width(),
        }
    }
}

impl FrameRepeatPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether frames like `frame` are tracked for repeats at all.
    pub fn applies_to(&self, frame: &CptvFrameHeader) -> bool {
        self.enabled && frame.image_data.width != self.exempt_width
    }

    /// `true` if `current` repeats `previous` and should not be delivered.
    pub fn is_spurious_repeat(
        &self,
        previous: Option<&CptvFrameHeader>,
        current: &CptvFrameHeader,
        total_frames_known: bool,
    ) -> bool {
        if !self.applies_to(current) || total_frames_known {
            return false;
        }
        previous.is_some_and(|prev| prev.time_on_ms == current.time_on_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ImageData;

    fn header(width: u32, time_on_ms: u32) -> CptvFrameHeader {
        CptvFrameHeader {
            time_on_ms,
            image_data: ImageData {
                width,
                height: 120,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_repeat_is_spurious_while_total_unknown() {
        let policy = FrameRepeatPolicy::default();
        let prev = header(160, 5000);

        assert!(policy.is_spurious_repeat(Some(&prev), &header(160, 5000), false));
        assert!(!policy.is_spurious_repeat(Some(&prev), &header(160, 5111), false));
        assert!(!policy.is_spurious_repeat(None, &header(160, 5000), false));
    }

    #[test]
    fn test_known_total_disables_suppression() {
        let policy = FrameRepeatPolicy::default();
        let prev = header(160, 5000);
        assert!(!policy.is_spurious_repeat(Some(&prev), &header(160, 5000), true));
    }

    #[test]
    fn test_fixed_size_sensor_is_exempt() {
        let policy = FrameRepeatPolicy::default();
        let prev = header(32, 60000);
        assert!(!policy.applies_to(&prev));
        assert!(!policy.is_spurious_repeat(Some(&prev), &header(32, 60000), false));
    }

    #[test]
    fn test_disabled_policy_never_suppresses() {
        let policy = FrameRepeatPolicy::disabled();
        let prev = header(160, 5000);
        assert!(!policy.is_spurious_repeat(Some(&prev), &header(160, 5000), false));
    }
}
