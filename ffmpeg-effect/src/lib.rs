/// Registers FFmpeg formats and codecs. Call once at startup before opening
/// any session.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod affinity;
pub mod audio;
pub mod backend;
pub mod config;
pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod frame;
pub mod hw;
pub mod input;
pub mod metadata;
pub mod output;
pub mod scaler;
pub mod session;
pub mod sink;
pub mod source;
pub mod stream;

pub use affinity::ThreadAffinity;
pub use backend::{Backend, FfmpegBackend, Geometry, MediaSink, MediaSource};
pub use config::{EncoderSettings, SessionConfig};
pub use error::{Result, TranscodeError};
pub use filter::{CpuFilter, FilterEngine, PixelEffect};
pub use frame::{AudioSamples, Frame, Image, PixelLayout};
pub use metadata::probe;
pub use session::{Session, SessionState, TranscodeReport};
