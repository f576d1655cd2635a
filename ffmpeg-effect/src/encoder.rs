use ffmpeg_next::{Codec, Dictionary, Packet, Rational, format::Pixel, media};

use crate::{
    backend::Geometry, config::EncoderSettings, frame::Image, hw, output::AvOutput,
    scaler::Scaler,
};

/// Receives one packet. EAGAIN and EOF both mean there is nothing to take.
pub(crate) fn receive_packet(
    encoder: &mut ffmpeg_next::codec::encoder::Encoder,
) -> anyhow::Result<Option<Packet>> {
    let mut packet = Packet::empty();
    match encoder.receive_packet(&mut packet) {
        Ok(()) => Ok(Some(packet)),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
            Ok(None)
        }
        Err(ffmpeg_next::Error::Eof) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Encodes RGBA images into one video stream of an [`AvOutput`].
///
/// Frames are numbered in a 1/fps time base, so the n-th image written gets
/// pts n regardless of the source timestamps.
pub struct VideoEncoder {
    encoder: ffmpeg_next::codec::encoder::Video,
    codec_name: String,
    stream_index: usize,
    time_base: Rational,
    frame_duration: i64,
    scaler: Scaler,
    frame_index: i64,
    flushed: bool,
}

impl VideoEncoder {
    pub fn open(
        output: &mut AvOutput,
        geometry: &Geometry,
        settings: &EncoderSettings,
    ) -> anyhow::Result<Self> {
        let software = match settings.codec.as_deref() {
            Some(name) => ffmpeg_next::encoder::find_by_name(name)
                .ok_or(anyhow::anyhow!("codec not found: {}", name))?,
            None => output
                .default_codec(media::Type::Video)
                .ok_or(anyhow::anyhow!("output format has no default video codec"))?,
        };

        let hardware = if settings.prefer_hardware {
            find_hw_encoder_for(&software, settings)
        } else {
            None
        };

        // Try the hardware encoder first; if it fails to open, retry with software.
        let (encoder, codec) = match hardware {
            Some(hw_codec) => match open_video(hw_codec, output, geometry, settings) {
                Ok(encoder) => (encoder, hw_codec),
                Err(e) => {
                    log::warn!(
                        "hardware encoder {} failed: {:#}, falling back to {}",
                        hw_codec.name(),
                        e,
                        software.name()
                    );
                    (open_video(software, output, geometry, settings)?, software)
                }
            },
            None => (open_video(software, output, geometry, settings)?, software),
        };
        log::info!(
            "video encoder opened: {}, {}x{} {:?}",
            codec.name(),
            encoder.width(),
            encoder.height(),
            encoder.format()
        );

        let time_base = frame_time_base(geometry.frame_rate);
        let stream_index = output.add_stream(codec, (&encoder).into(), time_base)?;

        Ok(Self {
            codec_name: codec.name().to_string(),
            stream_index,
            time_base,
            frame_duration: 1,
            scaler: Scaler::new(encoder.format(), geometry.width, geometry.height),
            encoder,
            frame_index: 0,
            flushed: false,
        })
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    pub fn frames_sent(&self) -> i64 {
        self.frame_index
    }

    pub fn send_image(&mut self, image: &Image, output: &mut AvOutput) -> anyhow::Result<()> {
        if self.flushed {
            anyhow::bail!("video encoder already flushed");
        }
        let frame = image.to_video();
        let mut converted = if frame.format() == self.scaler.output_format() {
            frame
        } else {
            self.scaler.run(&frame)?
        };
        converted.set_pts(Some(self.frame_index));
        self.encoder.send_frame(&converted)?;
        self.frame_index += 1;
        self.write_packets(output)
    }

    /// Sends EOF and writes everything the encoder still holds. Only the first
    /// call does anything.
    pub fn flush(&mut self, output: &mut AvOutput) -> anyhow::Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.flushed = true;
        self.encoder.send_eof()?;
        self.write_packets(output)
    }

    fn write_packets(&mut self, output: &mut AvOutput) -> anyhow::Result<()> {
        while let Some(mut packet) = receive_packet(&mut self.encoder)? {
            if packet.duration() == 0 {
                packet.set_duration(self.frame_duration);
            }
            output.write_packet(self.stream_index, packet, self.time_base)?;
        }
        Ok(())
    }
}

fn find_hw_encoder_for(software: &Codec, settings: &EncoderSettings) -> Option<Codec> {
    let name = settings.codec.as_deref().unwrap_or(software.name());
    hw::find_hw_encoder(name)
}

fn frame_time_base(frame_rate: (i32, i32)) -> Rational {
    let (num, den) = if frame_rate.0 > 0 && frame_rate.1 > 0 {
        frame_rate
    } else {
        Geometry::DEFAULT_FRAME_RATE
    };
    Rational::new(den, num)
}

fn is_x26x(codec_name: &str) -> bool {
    codec_name == "libx264" || codec_name == "libx265"
}

fn open_video(
    codec: Codec,
    output: &AvOutput,
    geometry: &Geometry,
    settings: &EncoderSettings,
) -> anyhow::Result<ffmpeg_next::codec::encoder::Video> {
    let pixel_format = match settings.pixel_format.as_deref() {
        Some(name) => name
            .parse::<Pixel>()
            .map_err(|_| anyhow::anyhow!("unknown pixel format: {}", name))?,
        None => hw::pixel_format_for_encoder(&codec),
    };
    let time_base = frame_time_base(geometry.frame_rate);

    let context = ffmpeg_next::codec::Context::new_with_codec(codec);
    let mut encoder = context.encoder().video()?;
    encoder.set_width(geometry.width);
    encoder.set_height(geometry.height);
    encoder.set_format(pixel_format);
    encoder.set_time_base(time_base);
    encoder.set_frame_rate(Some(Rational::new(
        time_base.denominator(),
        time_base.numerator(),
    )));
    encoder.set_gop(settings.keyframe_interval.max(1));
    if let Some(bit_rate) = settings.bit_rate {
        encoder.set_bit_rate(bit_rate);
    }
    if output.needs_global_header() {
        encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
    }

    let mut opts = Dictionary::new();
    for (key, value) in &settings.options {
        opts.set(key, value);
    }
    if is_x26x(codec.name()) && !settings.options.contains_key("preset") {
        opts.set("preset", "veryfast");
    }
    Ok(encoder.open_with(opts)?)
}
