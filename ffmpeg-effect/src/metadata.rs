//! Summary of a media file's container and streams, logged before a transcode.

use std::fmt;

use serde::Serialize;

use crate::stream::AvStream;

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: usize,
    /// "video", "audio", "subtitle", ...
    pub kind: String,
    pub codec: String,
    pub time_base: (i32, i32),
    pub rate: (i32, i32),
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    /// e.g. "mov,mp4,m4a,3gp,3g2,mj2"
    pub container: String,
    /// None when the container does not know it (e.g. raw h264).
    pub duration_sec: Option<f64>,
    /// bps; 0 if unknown.
    pub bit_rate: i64,
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    pub fn video(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == "video")
    }

    pub fn audio(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind == "audio")
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.container)?;
        match self.duration_sec {
            Some(d) => write!(f, ", {:.3}s", d)?,
            None => write!(f, ", duration N/A")?,
        }
        write!(f, ", {} bps", self.bit_rate)?;
        for s in &self.streams {
            write!(f, "; #{} {} {}", s.index, s.kind, s.codec)?;
            if let (Some(w), Some(h)) = (s.width, s.height) {
                write!(f, " {}x{} @ {}/{}", w, h, s.rate.0, s.rate.1)?;
            }
            if let (Some(sr), Some(ch)) = (s.sample_rate, s.channels) {
                write!(f, " {} Hz {}ch", sr, ch)?;
            }
        }
        Ok(())
    }
}

pub fn probe(path: &str) -> anyhow::Result<MediaInfo> {
    let input = ffmpeg_next::format::input(&path)?;

    let container = input.format().name().to_string();
    let bit_rate = input.bit_rate();
    // duration is in 1/AV_TIME_BASE seconds
    let duration_sec = {
        let d = input.duration();
        if d == ffmpeg_next::ffi::AV_NOPTS_VALUE as i64 || d <= 0 {
            None
        } else {
            Some(d as f64 / ffmpeg_next::ffi::AV_TIME_BASE as f64)
        }
    };

    let streams = input
        .streams()
        .map(|stream| {
            let av_stream = AvStream::from(stream);
            let params = av_stream.parameters();
            let time_base = av_stream.time_base();
            let rate = av_stream.rate();

            let (width, height, sample_rate, channels) = if av_stream.is_video() {
                (Some(av_stream.width()), Some(av_stream.height()), None, None)
            } else if av_stream.is_audio() {
                let (sr, ch) = audio_params(params);
                (None, None, Some(sr), Some(ch))
            } else {
                (None, None, None, None)
            };

            StreamInfo {
                index: av_stream.index(),
                kind: format!("{:?}", params.medium()).to_lowercase(),
                codec: format!("{:?}", params.id()).to_lowercase(),
                time_base: (time_base.numerator(), time_base.denominator()),
                rate: (rate.numerator(), rate.denominator()),
                width,
                height,
                sample_rate,
                channels,
            }
        })
        .collect();

    Ok(MediaInfo {
        container,
        duration_sec,
        bit_rate,
        streams,
    })
}

/// Sample rate and channel count, which ffmpeg-next does not expose on parameters.
fn audio_params(params: &ffmpeg_next::codec::Parameters) -> (u32, u32) {
    unsafe {
        let ptr = params.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
        let sr = (*ptr).sample_rate;
        let ch = (*ptr).ch_layout.nb_channels;
        (sr.max(0) as u32, ch.max(0) as u32)
    }
}
