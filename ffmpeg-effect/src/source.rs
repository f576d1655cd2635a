use std::collections::VecDeque;

use ffmpeg_next::media;

use crate::{
    backend::{Geometry, MediaSource},
    decoder::{DecodedFrame, Decoder},
    frame::{AudioSamples, Frame, Image, PixelLayout, channel_layout},
    input::AvInput,
    scaler::Scaler,
    stream::AvStream,
};

/// Decodes the best video stream (and the best audio stream, if any) of a
/// file. Video frames come out as packed BGR24 at the stream's size.
pub struct FfmpegSource {
    path: String,
    input: Option<AvInput>,
    video: Option<Decoder>,
    audio: Option<Decoder>,
    scaler: Scaler,
    geometry: Geometry,
    pending: VecDeque<Frame>,
    drained: bool,
}

impl FfmpegSource {
    pub fn open(path: &str, format_hint: Option<&str>) -> anyhow::Result<Self> {
        let input = AvInput::new(path, format_hint, None)?;

        let video_stream = input
            .best_stream(media::Type::Video)
            .cloned()
            .ok_or(anyhow::anyhow!("no video stream in {}", path))?;
        let video = Decoder::new(&video_stream)?;

        let (mut width, mut height) = (video_stream.width(), video_stream.height());
        if width == 0 || height == 0 {
            if let Some(decoder) = video.video() {
                width = decoder.width();
                height = decoder.height();
            }
        }
        let mut geometry = Geometry::video(width, height);
        geometry.frame_rate = video_stream.frame_rate_or(Geometry::DEFAULT_FRAME_RATE);

        // a broken audio stream is dropped rather than failing the whole source
        let audio = match input.best_stream(media::Type::Audio) {
            Some(stream) => match open_audio(stream) {
                Ok(decoder) => Some(decoder),
                Err(e) => {
                    log::warn!("ignoring audio stream {} of {}: {:#}", stream.index(), path, e);
                    None
                }
            },
            None => None,
        };
        if let Some(decoder) = audio.as_ref().and_then(|d| d.audio()) {
            geometry = geometry.with_audio(decoder.channels(), decoder.rate());
        }

        Ok(Self {
            path: path.to_string(),
            input: Some(input),
            video: Some(video),
            audio,
            scaler: Scaler::new(PixelLayout::Bgr24.pixel(), width, height),
            geometry,
            pending: VecDeque::new(),
            drained: false,
        })
    }

    fn drain(&mut self, video: bool) -> anyhow::Result<()> {
        let decoder = if video {
            self.video.as_mut()
        } else {
            self.audio.as_mut()
        };
        let Some(decoder) = decoder else {
            return Ok(());
        };

        while let Some(decoded) = decoder.receive_frame()? {
            match decoded {
                DecodedFrame::Video(frame) => {
                    let scaled = self.scaler.run(&frame)?;
                    let image = Image::from_video(&scaled, PixelLayout::Bgr24)?;
                    self.pending.push_back(Frame::Image(image));
                }
                DecodedFrame::Audio(frame) => {
                    self.pending
                        .push_back(Frame::Audio(AudioSamples::from(&frame)));
                }
            }
        }
        Ok(())
    }

    fn finish_decoding(&mut self) -> anyhow::Result<()> {
        if let Some(decoder) = self.video.as_mut() {
            decoder.send_eof()?;
        }
        self.drain(true)?;
        if let Some(decoder) = self.audio.as_mut() {
            decoder.send_eof()?;
        }
        self.drain(false)?;
        self.drained = true;
        log::debug!("source {} reached end of stream", self.path);
        Ok(())
    }
}

fn open_audio(stream: &AvStream) -> anyhow::Result<Decoder> {
    let decoder = Decoder::new(stream)?;
    let channels = decoder.audio().map(|d| d.channels()).unwrap_or(0);
    check_audio_channels(channels)?;
    Ok(decoder)
}

/// Frames are copied plane by plane, so only counts with a known layout
/// (1 to 8 channels) can be decoded and re-encoded.
fn check_audio_channels(channels: u16) -> anyhow::Result<()> {
    if channel_layout(channels).is_none() {
        anyhow::bail!("unsupported audio channel count {}", channels);
    }
    Ok(())
}

impl MediaSource for FfmpegSource {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn pull_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            if self.drained {
                return Ok(None);
            }

            let packet = {
                let input = self
                    .input
                    .as_mut()
                    .ok_or(anyhow::anyhow!("source {} is closed", self.path))?;
                input.read_packet()?
            };
            let Some(packet) = packet else {
                self.finish_decoding()?;
                continue;
            };

            let index = packet.stream_index;
            if self.video.as_ref().is_some_and(|d| d.stream_index() == index) {
                if let Some(decoder) = self.video.as_mut() {
                    decoder.send_packet(packet)?;
                }
                self.drain(true)?;
            } else if self.audio.as_ref().is_some_and(|d| d.stream_index() == index) {
                if let Some(decoder) = self.audio.as_mut() {
                    decoder.send_packet(packet)?;
                }
                self.drain(false)?;
            }
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if self.input.is_none() {
            return Ok(());
        }
        self.video = None;
        self.audio = None;
        self.input = None;
        self.pending.clear();
        self.drained = true;
        log::debug!("source {} closed", self.path);
        Ok(())
    }
}
