use crate::{
    audio::AudioEncoder,
    backend::{Geometry, MediaSink},
    config::EncoderSettings,
    encoder::VideoEncoder,
    frame::{AudioSamples, Image, PixelLayout},
    output::AvOutput,
};

/// Writes filtered images and forwarded audio to a file. The container is
/// chosen from the file extension; an audio stream is only created when the
/// source has audio.
pub struct FfmpegSink {
    path: String,
    geometry: Geometry,
    output: Option<AvOutput>,
    video: Option<VideoEncoder>,
    audio: Option<AudioEncoder>,
    finalized: bool,
}

impl FfmpegSink {
    pub fn open(path: &str, geometry: &Geometry, settings: &EncoderSettings) -> anyhow::Result<Self> {
        let mut output = AvOutput::new(path)?;
        let video = VideoEncoder::open(&mut output, geometry, settings)?;
        let audio = if geometry.has_audio() {
            Some(AudioEncoder::open(&mut output, geometry, settings)?)
        } else {
            None
        };
        output.write_header()?;
        log::debug!(
            "sink {} ready, video codec: {}, audio: {}",
            path,
            video.codec_name(),
            audio.is_some()
        );

        Ok(Self {
            path: path.to_string(),
            geometry: *geometry,
            output: Some(output),
            video: Some(video),
            audio,
            finalized: false,
        })
    }

    fn parts(&mut self) -> anyhow::Result<(&mut AvOutput, &mut VideoEncoder)> {
        match (self.output.as_mut(), self.video.as_mut()) {
            (Some(output), Some(video)) => Ok((output, video)),
            _ => Err(anyhow::anyhow!("sink {} is closed", self.path)),
        }
    }
}

impl MediaSink for FfmpegSink {
    fn write_image(&mut self, image: &Image) -> anyhow::Result<()> {
        if image.dimensions() != self.geometry.dimensions() {
            anyhow::bail!(
                "image is {}x{}, encoder expects {}x{}",
                image.width(),
                image.height(),
                self.geometry.width,
                self.geometry.height
            );
        }
        if image.layout() != PixelLayout::Rgba32 {
            anyhow::bail!("encoder expects RGBA, got {:?}", image.layout());
        }
        let (output, video) = self.parts()?;
        video.send_image(image, output)
    }

    fn write_audio(&mut self, samples: &AudioSamples) -> anyhow::Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            log::trace!("sink {} has no audio stream, dropping samples", self.path);
            return Ok(());
        };
        let output = self
            .output
            .as_mut()
            .ok_or(anyhow::anyhow!("sink {} is closed", self.path))?;
        audio.send_samples(samples, output)
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let (output, video) = self.parts()?;
        video.flush(output)?;
        let frames = video.frames_sent();
        if let (Some(audio), Some(output)) = (self.audio.as_mut(), self.output.as_mut()) {
            audio.flush(output)?;
        }
        if let Some(output) = self.output.as_mut() {
            output.finish()?;
        }
        log::debug!("sink {} finalized after {} video frames", self.path, frames);
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        if self.output.is_none() {
            return Ok(());
        }
        if !self.finalized {
            log::warn!(
                "sink {} closed before end of stream, output left incomplete",
                self.path
            );
        }
        self.video = None;
        self.audio = None;
        self.output = None;
        log::debug!("sink {} closed", self.path);
        Ok(())
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;
