use std::path::Path;

use ffmpeg_next::{Codec, Packet, Rational, codec::Parameters, media};

/// Muxer for the destination file. Streams are added up front; the header
/// is written once all of them are known.
pub struct AvOutput {
    path: String,
    inner: ffmpeg_next::format::context::Output,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl AvOutput {
    /// The container format is guessed from the file extension.
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let output = ffmpeg_next::format::output(&Path::new(path))?;
        Ok(Self {
            path: path.to_string(),
            inner: output,
            have_written_header: false,
            have_written_trailer: false,
        })
    }

    /// Whether encoders must put codec extradata in the container header.
    pub fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
    }

    /// The container's default encoder for the given media type, if FFmpeg has one.
    pub fn default_codec(&self, kind: media::Type) -> Option<Codec> {
        let id = self.inner.format().codec(&Path::new(&self.path), kind);
        if id == ffmpeg_next::codec::Id::None {
            return None;
        }
        ffmpeg_next::encoder::find(id)
    }

    /// Returns the index of the new stream.
    pub fn add_stream(
        &mut self,
        codec: Codec,
        parameters: Parameters,
        time_base: Rational,
    ) -> anyhow::Result<usize> {
        let mut writer_stream = self.inner.add_stream(codec)?;
        writer_stream.set_parameters(parameters);
        writer_stream.set_time_base(time_base);
        Ok(writer_stream.index())
    }

    pub fn write_header(&mut self) -> anyhow::Result<()> {
        if !self.have_written_header {
            self.inner.write_header()?;
            self.have_written_header = true;
        }
        Ok(())
    }

    /// Rescales `packet` from `time_base` to the stream's own time base, which
    /// the muxer may have changed when the header was written.
    pub fn write_packet(
        &mut self,
        stream_index: usize,
        mut packet: Packet,
        time_base: Rational,
    ) -> anyhow::Result<()> {
        self.write_header()?;
        let out_time_base = self
            .inner
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or(anyhow::anyhow!("output stream {} not found", stream_index))?;
        packet.set_stream(stream_index);
        packet.set_position(-1);
        packet.rescale_ts(time_base, out_time_base);
        packet.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    pub fn finish(&mut self) -> anyhow::Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
            log::debug!("trailer written: {}", self.path);
        }
        Ok(())
    }
}
