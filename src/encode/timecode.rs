use std::fmt;

/// Non-drop-frame SMPTE timecode, displayed as `HH:MM:SS:FF`.
///
/// Passed to the encoder so review tools show the sequence's true start
/// frame instead of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    hours: u64,
    minutes: u64,
    seconds: u64,
    frames: u64,
}

impl Timecode {
    /// Timecode of the given absolute frame at a frame rate.
    ///
    /// Fractional rates are rounded to their nominal integer rate; hours wrap
    /// at 24 like a clock.
    pub fn from_frame(frame: u64, framerate: f64) -> Self {
        let rate = framerate.round().max(1.0) as u64;

        let frames = frame % rate;
        let total_seconds = frame / rate;
        let seconds = total_seconds % 60;
        let minutes = (total_seconds / 60) % 60;
        let hours = (total_seconds / 3600) % 24;

        Self {
            hours,
            minutes,
            seconds,
            frames,
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_zero() {
        assert_eq!(Timecode::from_frame(0, 24.0).to_string(), "00:00:00:00");
    }

    #[test]
    fn test_typical_sequence_start() {
        // Frame 1001 at 24fps: 41 full seconds and 17 frames
        assert_eq!(Timecode::from_frame(1001, 24.0).to_string(), "00:00:41:17");
        // The same frame at 30fps lands earlier
        assert_eq!(Timecode::from_frame(1001, 30.0).to_string(), "00:00:33:11");
    }

    #[test]
    fn test_fractional_rate_uses_nominal() {
        // 23.976 counts like 24
        assert_eq!(
            Timecode::from_frame(1001, 23.976).to_string(),
            "00:00:41:17"
        );
    }

    #[test]
    fn test_minute_and_hour_rollover() {
        assert_eq!(Timecode::from_frame(24 * 60, 24.0).to_string(), "00:01:00:00");
        assert_eq!(
            Timecode::from_frame(24 * 3600, 24.0).to_string(),
            "01:00:00:00"
        );
        // Hours wrap at 24
        assert_eq!(
            Timecode::from_frame(24 * 3600 * 24, 24.0).to_string(),
            "00:00:00:00"
        );
    }
}
