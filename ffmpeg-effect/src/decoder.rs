use ffmpeg_next::Rational;

use crate::{input::InputPacket, stream::AvStream};

/// A frame straight out of libavcodec, before any conversion.
pub enum DecodedFrame {
    Video(ffmpeg_next::frame::Video),
    Audio(ffmpeg_next::frame::Audio),
}

enum DecoderType {
    Video(ffmpeg_next::codec::decoder::Video),
    Audio(ffmpeg_next::codec::decoder::Audio),
}

impl DecoderType {
    fn send_packet(&mut self, packet: &ffmpeg_next::Packet) -> anyhow::Result<()> {
        match self {
            DecoderType::Video(video_decoder) => video_decoder.send_packet(packet)?,
            DecoderType::Audio(audio_decoder) => audio_decoder.send_packet(packet)?,
        }
        Ok(())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        match self {
            DecoderType::Video(video_decoder) => video_decoder.send_eof()?,
            DecoderType::Audio(audio_decoder) => audio_decoder.send_eof()?,
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> anyhow::Result<Option<DecodedFrame>> {
        match self {
            DecoderType::Video(video_decoder) => {
                let mut frame = ffmpeg_next::frame::Video::empty();
                match video_decoder.receive_frame(&mut frame) {
                    Ok(()) => Ok(Some(DecodedFrame::Video(frame))),
                    Err(err) if is_drained(&err) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            }
            DecoderType::Audio(audio_decoder) => {
                let mut frame = ffmpeg_next::frame::Audio::empty();
                match audio_decoder.receive_frame(&mut frame) {
                    Ok(()) => Ok(Some(DecodedFrame::Audio(frame))),
                    Err(err) if is_drained(&err) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }
}

/// EAGAIN (needs more input) and EOF (fully flushed) both mean "nothing
/// more right now".
fn is_drained(err: &ffmpeg_next::Error) -> bool {
    match err {
        ffmpeg_next::Error::Eof => true,
        ffmpeg_next::Error::Other { errno } => *errno == ffmpeg_next::util::error::EAGAIN,
        _ => false,
    }
}

/// Synchronous decoder for one input stream.
pub struct Decoder {
    stream: AvStream,
    inner: DecoderType,
    decoder_time_base: Rational,
    eof_sent: bool,
}

impl Decoder {
    pub fn new(stream: &AvStream) -> anyhow::Result<Self> {
        let mut decoder_ctx = ffmpeg_next::codec::Context::new();
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
        }
        decoder_ctx.set_parameters(stream.parameters().clone())?;

        let decoder = if stream.is_video() {
            let video_decoder = decoder_ctx.decoder().video()?;
            if video_decoder.format() == ffmpeg_next::format::Pixel::None
                || video_decoder.width() == 0
                || video_decoder.height() == 0
            {
                return Err(anyhow::anyhow!(
                    "missing codec parameters for video stream {}",
                    stream.index()
                ));
            }
            Self {
                stream: stream.clone(),
                decoder_time_base: video_decoder.time_base(),
                inner: DecoderType::Video(video_decoder),
                eof_sent: false,
            }
        } else if stream.is_audio() {
            let audio_decoder = decoder_ctx.decoder().audio()?;
            Self {
                stream: stream.clone(),
                decoder_time_base: audio_decoder.time_base(),
                inner: DecoderType::Audio(audio_decoder),
                eof_sent: false,
            }
        } else {
            return Err(anyhow::anyhow!(
                "unsupported stream type {:?}",
                stream.parameters().medium()
            ));
        };

        Ok(decoder)
    }

    pub fn send_packet(&mut self, mut input: InputPacket) -> anyhow::Result<()> {
        if self.decoder_time_base.numerator() > 0 {
            input
                .packet
                .rescale_ts(input.time_base, self.decoder_time_base);
        }
        self.inner.send_packet(&input.packet)
    }

    /// Enters draining mode. Only the first call reaches the codec.
    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        if self.eof_sent {
            return Ok(());
        }
        self.eof_sent = true;
        self.inner.send_eof()
    }

    pub fn receive_frame(&mut self) -> anyhow::Result<Option<DecodedFrame>> {
        self.inner.receive_frame()
    }

    pub fn stream_index(&self) -> usize {
        self.stream.index()
    }

    pub fn video(&self) -> Option<&ffmpeg_next::codec::decoder::Video> {
        match &self.inner {
            DecoderType::Video(video_decoder) => Some(video_decoder),
            DecoderType::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&ffmpeg_next::codec::decoder::Audio> {
        match &self.inner {
            DecoderType::Audio(audio_decoder) => Some(audio_decoder),
            DecoderType::Video(_) => None,
        }
    }
}
