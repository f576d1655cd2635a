//! Contracts of the decoder and encoder collaborators a session drives.

use crate::{
    config::EncoderSettings,
    frame::{AudioSamples, Frame, Image},
    sink::FfmpegSink,
    source::FfmpegSource,
};

/// Stream properties read from the source at start, fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    /// 0 when the source has no audio.
    pub audio_channels: u16,
    pub audio_sample_rate: u32,
    /// numerator, denominator
    pub frame_rate: (i32, i32),
}

impl Geometry {
    pub const DEFAULT_FRAME_RATE: (i32, i32) = (30, 1);

    pub fn video(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            audio_channels: 0,
            audio_sample_rate: 0,
            frame_rate: Self::DEFAULT_FRAME_RATE,
        }
    }

    pub fn with_audio(mut self, channels: u16, sample_rate: u32) -> Self {
        self.audio_channels = channels;
        self.audio_sample_rate = sample_rate;
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio_channels > 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub trait MediaSource {
    fn geometry(&self) -> Geometry;

    /// `Ok(None)` at end of stream. Images come out in the decoder's native
    /// channel order.
    fn pull_frame(&mut self) -> anyhow::Result<Option<Frame>>;

    /// Stops decoding and releases the demuxer. Must tolerate repeated calls.
    fn close(&mut self) -> anyhow::Result<()>;
}

pub trait MediaSink {
    /// `image` is RGBA at the session geometry.
    fn write_image(&mut self, image: &Image) -> anyhow::Result<()>;

    fn write_audio(&mut self, samples: &AudioSamples) -> anyhow::Result<()>;

    /// Flushes buffered data and completes the container.
    fn finalize(&mut self) -> anyhow::Result<()>;

    /// Releases the encoders and the output. Never finalizes: buffered data of
    /// a sink that was not finalized is discarded and no trailer is written.
    /// Must tolerate repeated calls.
    fn close(&mut self) -> anyhow::Result<()>;
}

/// Opens the collaborators of a session.
pub trait Backend {
    type Source: MediaSource;
    type Sink: MediaSink;

    fn open_source(&self, path: &str, format_hint: Option<&str>) -> anyhow::Result<Self::Source>;

    fn open_sink(&self, path: &str, geometry: &Geometry) -> anyhow::Result<Self::Sink>;
}

/// Demuxes and decodes with libavformat/libavcodec, encodes with the
/// configured codecs.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    settings: EncoderSettings,
}

impl FfmpegBackend {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }
}

impl Backend for FfmpegBackend {
    type Source = FfmpegSource;
    type Sink = FfmpegSink;

    fn open_source(&self, path: &str, format_hint: Option<&str>) -> anyhow::Result<FfmpegSource> {
        FfmpegSource::open(path, format_hint)
    }

    fn open_sink(&self, path: &str, geometry: &Geometry) -> anyhow::Result<FfmpegSink> {
        FfmpegSink::open(path, geometry, &self.settings)
    }
}
