use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Container format the source is opened as, e.g. "mp4". `None` lets FFmpeg probe.
    pub format_hint: Option<String>,
    pub encoder: EncoderSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format_hint: Some("mp4".to_string()),
            encoder: EncoderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Video encoder name. `None` uses the container's default video codec.
    pub codec: Option<String>,
    /// Audio encoder name. `None` uses the container's default audio codec.
    pub audio_codec: Option<String>,
    /// e.g. "yuv420p". `None` picks one suited to the codec.
    pub pixel_format: Option<String>,
    pub keyframe_interval: u32,
    /// bps; `None` leaves the codec default.
    pub bit_rate: Option<usize>,
    pub audio_bit_rate: usize,
    /// Try nvenc/vaapi/qsv variants of `codec` before the software encoder.
    pub prefer_hardware: bool,
    /// Passed to the video encoder when it is opened.
    pub options: BTreeMap<String, String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            codec: Some("libx264".to_string()),
            audio_codec: Some("aac".to_string()),
            pixel_format: None,
            keyframe_interval: 25,
            bit_rate: None,
            audio_bit_rate: 128_000,
            prefer_hardware: false,
            options: BTreeMap::new(),
        }
    }
}
