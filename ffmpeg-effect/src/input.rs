use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::{Dictionary, Packet, Rational, media};

use crate::stream::AvStream;

/// A demuxed packet together with the time base of the stream it came from.
pub struct InputPacket {
    pub stream_index: usize,
    pub time_base: Rational,
    pub packet: Packet,
}

pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    streams: HashMap<usize, AvStream>,
}

impl AvInput {
    /// Resolve input format by name (e.g. "mp4", "matroska") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn new(path: &str, format: Option<&str>, options: Option<Dictionary>) -> anyhow::Result<Self> {
        use ffmpeg_next::format::format::Format;

        let location = Path::new(path);
        let input = match (format, options) {
            (Some(fmt_name), options) => {
                let fmt = Self::find_input_format(fmt_name)?;
                let ctx = ffmpeg_next::format::open_with(
                    location,
                    &Format::Input(fmt),
                    options.unwrap_or_default(),
                )?;
                ctx.input()
            }
            (None, Some(opts)) => ffmpeg_next::format::input_with_dictionary(location, opts)?,
            (None, None) => ffmpeg_next::format::input(location)?,
        };

        let mut streams = HashMap::new();
        for stream in input.streams() {
            streams.insert(stream.index(), AvStream::from(stream));
        }
        log::debug!(
            "opened input {} ({}), {} streams",
            path,
            input.format().name(),
            streams.len()
        );

        Ok(Self {
            inner: input,
            streams,
        })
    }

    /// The stream FFmpeg considers the best of the given kind.
    pub fn best_stream(&self, kind: media::Type) -> Option<&AvStream> {
        let index = self.inner.streams().best(kind)?.index();
        self.streams.get(&index)
    }

    /// `Ok(None)` at end of file. Read errors are returned, not skipped.
    pub fn read_packet(&mut self) -> anyhow::Result<Option<InputPacket>> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.inner) {
            Ok(()) => {
                let stream_index = packet.stream();
                let time_base = self
                    .streams
                    .get(&stream_index)
                    .map(|s| s.time_base())
                    .ok_or(anyhow::anyhow!("packet for unknown stream {}", stream_index))?;
                Ok(Some(InputPacket {
                    stream_index,
                    time_base,
                    packet,
                }))
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
