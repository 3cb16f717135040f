use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::format::{CaptureFormat, FormatTag, TargetProcess};

/// Lower bound for the decoupling stage's cycle interval.
pub const MIN_CALLBACK_INTERVAL: Duration = Duration::from_millis(1);

/// Default decoupling stage cycle interval.
pub const DEFAULT_CALLBACK_INTERVAL: Duration = Duration::from_millis(100);

/// Audio skipped after a resume by default. Some devices replay a few
/// leftover frames when the stream is restarted.
pub const DEFAULT_RESUME_SKIP_SECS: f64 = 0.1;

/// Full set of capture settings, loadable from JSON.
///
/// Everything here maps onto one of the individual setters on
/// `LoopbackCapture`; `LoopbackCapture::configure` applies it in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Bits per sample (default: 16). Forced to 32 for `ieee_float`.
    pub bit_depth: u16,

    /// Channel count (default: 2).
    pub channels: u16,

    pub format_tag: FormatTag,

    /// Target process, or None to leave the target unset.
    pub process_id: Option<u32>,

    /// Include (true) or exclude (false) the target process tree.
    pub include_tree: bool,

    /// Decoupling stage cycle interval in milliseconds (default: 100).
    pub callback_interval_ms: u64,

    /// Deliver through the decoupling stage instead of the producer thread.
    pub intermediate_mode: bool,

    /// Seconds of audio discarded after `resume_capture_default` (default: 0.1).
    pub resume_skip_secs: f64,
}

impl CaptureConfiguration {
    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        serde_json::from_str(json).map_err(|e| CaptureError::Param(format!("invalid configuration: {e}")))
    }

    pub fn to_json(&self) -> Result<String, CaptureError> {
        serde_json::to_string_pretty(self).map_err(|e| CaptureError::Param(format!("unserializable configuration: {e}")))
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        self.capture_format()?;
        self.target()?;
        if !self.resume_skip_secs.is_finite() {
            return Err(CaptureError::Param("resume skip must be finite".into()));
        }
        Ok(())
    }

    pub fn capture_format(&self) -> Result<CaptureFormat, CaptureError> {
        CaptureFormat::new(self.sample_rate, self.bit_depth, self.channels, self.format_tag)
    }

    pub fn target(&self) -> Result<Option<TargetProcess>, CaptureError> {
        self.process_id
            .map(|pid| TargetProcess::new(pid, self.include_tree))
            .transpose()
    }

    pub fn callback_interval(&self) -> Duration {
        Duration::from_millis(self.callback_interval_ms).max(MIN_CALLBACK_INTERVAL)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bit_depth: 16,
            channels: 2,
            format_tag: FormatTag::Pcm,
            process_id: None,
            include_tree: true,
            callback_interval_ms: DEFAULT_CALLBACK_INTERVAL.as_millis() as u64,
            intermediate_mode: false,
            resume_skip_secs: DEFAULT_RESUME_SKIP_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CaptureConfiguration::default();
        config.validate().unwrap();
        assert_eq!(config.capture_format().unwrap().block_align(), 4);
        assert_eq!(config.target().unwrap(), None);
        assert_eq!(config.callback_interval(), Duration::from_millis(100));
        assert_relative_eq!(config.resume_skip_secs, 0.1);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = CaptureConfiguration::from_json(
            r#"{ "sample_rate": 44100, "format_tag": "ieee_float", "process_id": 4242, "include_tree": false }"#,
        )
        .unwrap();

        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 2);
        let format = config.capture_format().unwrap();
        assert_eq!(format.bit_depth(), 32);
        assert_eq!(
            config.target().unwrap(),
            Some(TargetProcess {
                process_id: 4242,
                include_tree: false
            })
        );
    }

    #[test]
    fn json_round_trip_preserves_settings() {
        let config = CaptureConfiguration {
            process_id: Some(7),
            intermediate_mode: true,
            callback_interval_ms: 20,
            ..Default::default()
        };
        let parsed = CaptureConfiguration::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn malformed_json_is_a_param_error() {
        assert!(matches!(
            CaptureConfiguration::from_json("{ sample_rate: }"),
            Err(CaptureError::Param(_))
        ));
        assert!(matches!(
            CaptureConfiguration::from_json(r#"{ "format_tag": "adpcm" }"#),
            Err(CaptureError::Param(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let zero_pid = CaptureConfiguration {
            process_id: Some(0),
            ..Default::default()
        };
        assert!(matches!(zero_pid.validate(), Err(CaptureError::Param(_))));

        let bad_rate = CaptureConfiguration {
            sample_rate: 10,
            ..Default::default()
        };
        assert!(matches!(bad_rate.validate(), Err(CaptureError::Param(_))));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = CaptureConfiguration {
            callback_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.callback_interval(), MIN_CALLBACK_INTERVAL);
    }
}
