use ffmpeg_next::{
    ChannelLayout, Codec, Dictionary, Rational,
    format::{Sample, sample},
    frame, media,
    software::resampling,
};

use crate::{
    backend::Geometry,
    config::EncoderSettings,
    encoder::receive_packet,
    frame::{AudioSamples, channel_layout},
    output::AvOutput,
};

/// Upper bound on samples the resampler still holds at end of stream.
const RESAMPLER_TAIL: usize = 8192;

/// Byte FIFO holding audio in the encoder's sample format, one buffer per
/// plane. Packed formats use a single plane with interleaved channels.
#[derive(Debug)]
pub struct SampleFifo {
    planes: Vec<Vec<u8>>,
    /// Bytes one sample occupies in each plane.
    unit: usize,
}

impl SampleFifo {
    pub fn new(format: Sample, channels: u16) -> Self {
        let (planes, unit) = if format.is_planar() {
            (channels.max(1) as usize, format.bytes())
        } else {
            (1, format.bytes() * channels.max(1) as usize)
        };
        Self {
            planes: vec![Vec::new(); planes],
            unit,
        }
    }

    /// Samples per channel currently buffered.
    pub fn len(&self) -> usize {
        self.planes.first().map(|p| p.len() / self.unit).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Appends `samples` samples from each plane slice.
    pub fn push(&mut self, planes: &[&[u8]], samples: usize) -> anyhow::Result<()> {
        if planes.len() != self.planes.len() {
            anyhow::bail!(
                "fifo holds {} planes, got {}",
                self.planes.len(),
                planes.len()
            );
        }
        let len = samples * self.unit;
        if let Some(short) = planes.iter().find(|src| src.len() < len) {
            anyhow::bail!("plane holds {} bytes, {} expected", short.len(), len);
        }
        for (dst, src) in self.planes.iter_mut().zip(planes) {
            dst.extend_from_slice(&src[..len]);
        }
        Ok(())
    }

    /// Removes up to `samples` samples. The returned planes are always
    /// `samples` long; missing samples are zero (silence for float and signed
    /// formats).
    pub fn pop(&mut self, samples: usize) -> Vec<Vec<u8>> {
        let take = samples.min(self.len()) * self.unit;
        self.planes
            .iter_mut()
            .map(|plane| {
                let mut out: Vec<u8> = plane.drain(..take).collect();
                out.resize(samples * self.unit, 0);
                out
            })
            .collect()
    }
}

/// Encodes forwarded audio into one stream of an [`AvOutput`]. Input in any
/// format, rate or channel count is resampled to what the codec accepts and
/// regrouped into frames of the codec's frame size.
pub struct AudioEncoder {
    encoder: ffmpeg_next::codec::encoder::Audio,
    stream_index: usize,
    time_base: Rational,
    format: Sample,
    rate: u32,
    layout: ChannelLayout,
    channels: u16,
    frame_size: usize,
    resampler: Option<Resampler>,
    fifo: SampleFifo,
    next_pts: i64,
    flushed: bool,
}

struct Resampler {
    context: resampling::Context,
    input: (Sample, u16, u32),
}

impl AudioEncoder {
    pub fn open(
        output: &mut AvOutput,
        geometry: &Geometry,
        settings: &EncoderSettings,
    ) -> anyhow::Result<Self> {
        let codec = match settings.audio_codec.as_deref() {
            Some(name) => ffmpeg_next::encoder::find_by_name(name)
                .ok_or(anyhow::anyhow!("audio codec not found: {}", name))?,
            None => output
                .default_codec(media::Type::Audio)
                .ok_or(anyhow::anyhow!("output format has no default audio codec"))?,
        };

        let format = sample_format_for(&codec);
        let rate = sample_rate_for(&codec, geometry.audio_sample_rate);
        let layout = channel_layout(geometry.audio_channels).ok_or(anyhow::anyhow!(
            "cannot encode {} audio channels",
            geometry.audio_channels
        ))?;
        let channels = layout.bits().count_ones() as u16;
        let time_base = Rational::new(1, rate as i32);

        let context = ffmpeg_next::codec::Context::new_with_codec(codec);
        let mut encoder = context.encoder().audio()?;
        encoder.set_rate(rate as i32);
        encoder.set_channel_layout(layout);
        encoder.set_format(format);
        encoder.set_bit_rate(settings.audio_bit_rate);
        encoder.set_time_base(time_base);
        if output.needs_global_header() {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_with(Dictionary::new())?;
        let frame_size = encoder.frame_size() as usize;
        log::info!(
            "audio encoder opened: {}, {} Hz, {} channels, {:?}, frame size {}",
            codec.name(),
            rate,
            channels,
            format,
            frame_size
        );

        let stream_index = output.add_stream(codec, (&encoder).into(), time_base)?;

        Ok(Self {
            encoder,
            stream_index,
            time_base,
            format,
            rate,
            layout,
            channels,
            frame_size,
            resampler: None,
            fifo: SampleFifo::new(format, channels),
            next_pts: 0,
            flushed: false,
        })
    }

    pub fn send_samples(
        &mut self,
        samples: &AudioSamples,
        output: &mut AvOutput,
    ) -> anyhow::Result<()> {
        if self.flushed {
            anyhow::bail!("audio encoder already flushed");
        }
        if samples.samples == 0 {
            return Ok(());
        }

        let input = (samples.format, samples.channels, samples.rate);
        if input == (self.format, self.channels, self.rate) {
            let planes: Vec<&[u8]> = samples.planes.iter().map(|p| p.as_ref()).collect();
            self.fifo.push(&planes, samples.samples)?;
        } else {
            let frame = samples.to_audio()?;
            let resampler = self.resampler_for(input)?;
            let mut resampled = frame::Audio::empty();
            resampler.context.run(&frame, &mut resampled)?;
            self.push_frame(&resampled)?;
        }
        self.encode_ready(output, false)
    }

    /// Drains the resampler and the FIFO, padding the last frame with
    /// silence, then flushes the codec. Only the first call does anything.
    pub fn flush(&mut self, output: &mut AvOutput) -> anyhow::Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;

        if let Some(resampler) = self.resampler.as_mut() {
            let mut tail = frame::Audio::new(self.format, RESAMPLER_TAIL, self.layout);
            tail.set_rate(self.rate);
            if resampler.context.flush(&mut tail).is_ok() && tail.samples() > 0 {
                self.push_frame(&tail)?;
            }
        }
        self.encode_ready(output, true)?;
        self.encoder.send_eof()?;
        self.write_packets(output)
    }

    fn resampler_for(&mut self, input: (Sample, u16, u32)) -> anyhow::Result<&mut Resampler> {
        if self.resampler.as_ref().is_none_or(|r| r.input != input) {
            let input_layout = channel_layout(input.1)
                .ok_or(anyhow::anyhow!("cannot resample {} audio channels", input.1))?;
            let context = resampling::Context::get(
                input.0,
                input_layout,
                input.2,
                self.format,
                self.layout,
                self.rate,
            )?;
            log::debug!(
                "audio resampler {:?} {}ch {} Hz -> {:?} {}ch {} Hz",
                input.0,
                input.1,
                input.2,
                self.format,
                self.channels,
                self.rate
            );
            self.resampler = Some(Resampler { context, input });
        }
        self.resampler
            .as_mut()
            .ok_or(anyhow::anyhow!("audio resampler unavailable"))
    }

    fn push_frame(&mut self, frame: &frame::Audio) -> anyhow::Result<()> {
        let samples = frame.samples();
        if samples == 0 {
            return Ok(());
        }
        let planes: Vec<&[u8]> = (0..self.fifo.plane_count())
            .map(|index| frame.data(index))
            .collect();
        self.fifo.push(&planes, samples)
    }

    /// Sends every full frame in the FIFO; with `tail` also the remainder.
    fn encode_ready(&mut self, output: &mut AvOutput, tail: bool) -> anyhow::Result<()> {
        loop {
            let available = self.fifo.len();
            let count = if self.frame_size == 0 {
                available
            } else if available >= self.frame_size || (tail && available > 0) {
                self.frame_size
            } else {
                0
            };
            if count == 0 || available == 0 {
                return Ok(());
            }

            let planes = self.fifo.pop(count);
            let mut frame = frame::Audio::new(self.format, count, self.layout);
            frame.set_rate(self.rate);
            frame.set_pts(Some(self.next_pts));
            for (index, plane) in planes.iter().enumerate() {
                let dst = frame.data_mut(index);
                let len = plane.len().min(dst.len());
                dst[..len].copy_from_slice(&plane[..len]);
            }
            self.next_pts += count as i64;

            self.encoder.send_frame(&frame)?;
            self.write_packets(output)?;
        }
    }

    fn write_packets(&mut self, output: &mut AvOutput) -> anyhow::Result<()> {
        while let Some(packet) = receive_packet(&mut self.encoder)? {
            output.write_packet(self.stream_index, packet, self.time_base)?;
        }
        Ok(())
    }
}

/// First sample format the codec lists, float planar when it lists none.
fn sample_format_for(codec: &Codec) -> Sample {
    codec
        .audio()
        .ok()
        .and_then(|audio| audio.formats().and_then(|mut formats| formats.next()))
        .unwrap_or(Sample::F32(sample::Type::Planar))
}

/// The source rate when the codec takes it, otherwise the closest rate it lists.
fn sample_rate_for(codec: &Codec, source_rate: u32) -> u32 {
    let source_rate = if source_rate == 0 { 48_000 } else { source_rate };
    let rates: Option<Vec<i32>> = codec
        .audio()
        .ok()
        .and_then(|audio| audio.rates().map(|rates| rates.collect()));
    match rates {
        Some(rates) if !rates.is_empty() => closest_rate(&rates, source_rate),
        _ => source_rate,
    }
}

fn closest_rate(rates: &[i32], wanted: u32) -> u32 {
    rates
        .iter()
        .filter(|r| **r > 0)
        .min_by_key(|r| (i64::from(**r) - i64::from(wanted)).abs())
        .map(|r| *r as u32)
        .unwrap_or(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fltp() -> Sample {
        Sample::F32(sample::Type::Planar)
    }

    #[test]
    fn test_fifo_planar_push_pop() -> anyhow::Result<()> {
        let mut fifo = SampleFifo::new(fltp(), 2);
        assert_eq!(fifo.plane_count(), 2);
        assert!(fifo.is_empty());

        let left = [1u8; 12];
        let right = [2u8; 12];
        fifo.push(&[&left, &right], 3)?;
        assert_eq!(fifo.len(), 3);

        let planes = fifo.pop(2);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], vec![1u8; 8]);
        assert_eq!(planes[1], vec![2u8; 8]);
        assert_eq!(fifo.len(), 1);
        Ok(())
    }

    #[test]
    fn test_fifo_pop_pads_with_silence() -> anyhow::Result<()> {
        let mut fifo = SampleFifo::new(Sample::I16(sample::Type::Packed), 2);
        assert_eq!(fifo.plane_count(), 1);

        fifo.push(&[&[7u8; 4]], 1)?;
        let planes = fifo.pop(3);
        assert_eq!(planes[0].len(), 12);
        assert_eq!(&planes[0][..4], &[7, 7, 7, 7]);
        assert!(planes[0][4..].iter().all(|b| *b == 0));
        assert!(fifo.is_empty());
        Ok(())
    }

    #[test]
    fn test_fifo_rejects_bad_input() {
        let mut fifo = SampleFifo::new(fltp(), 2);
        assert!(fifo.push(&[&[0u8; 8]], 2).is_err());
        assert!(fifo.push(&[&[0u8; 4], &[0u8; 4]], 2).is_err());
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_closest_rate() {
        let rates = [96_000, 48_000, 44_100, 22_050];
        assert_eq!(closest_rate(&rates, 48_000), 48_000);
        assert_eq!(closest_rate(&rates, 44_000), 44_100);
        assert_eq!(closest_rate(&[], 32_000), 32_000);
    }
}
