use std::fmt::{Debug, Formatter};

use bytes::Bytes;
use ffmpeg_next::{ChannelLayout, format::Pixel, format::Sample};

use crate::error::{Result, TranscodeError};

/// Byte order of the channels in an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    Bgr24,
    Rgb24,
    Rgba32,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Bgr24 | PixelLayout::Rgb24 => 3,
            PixelLayout::Rgba32 => 4,
        }
    }

    pub fn pixel(self) -> Pixel {
        match self {
            PixelLayout::Bgr24 => Pixel::BGR24,
            PixelLayout::Rgb24 => Pixel::RGB24,
            PixelLayout::Rgba32 => Pixel::RGBA,
        }
    }
}

/// An 8-bit interleaved pixel buffer. Rows start every `stride` bytes and may
/// carry trailing padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    layout: PixelLayout,
    stride: usize,
    data: Vec<u8>,
}

impl Image {
    /// A zeroed, tightly packed image.
    pub fn new(width: u32, height: u32, layout: PixelLayout) -> Self {
        let stride = width as usize * layout.channels();
        Self {
            width,
            height,
            layout,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    pub fn from_raw(
        width: u32,
        height: u32,
        layout: PixelLayout,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TranscodeError::invalid_image(format!(
                "invalid image size {}x{}",
                width, height
            )));
        }
        let row_bytes = width as usize * layout.channels();
        if stride < row_bytes {
            return Err(TranscodeError::invalid_image(format!(
                "stride {} shorter than row of {} bytes",
                stride, row_bytes
            )));
        }
        let needed = stride * (height as usize - 1) + row_bytes;
        if data.len() < needed {
            return Err(TranscodeError::invalid_image(format!(
                "buffer of {} bytes, need {}",
                data.len(),
                needed
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            stride,
            data,
        })
    }

    pub fn from_packed(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Result<Self> {
        Self::from_raw(width, height, layout, width as usize * layout.channels(), data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of meaningful bytes per row, padding excluded.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.layout.channels()
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let row_bytes = self.row_bytes();
        &mut self.data[start..start + row_bytes]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub(crate) fn set_layout(&mut self, layout: PixelLayout) {
        debug_assert_eq!(layout.channels(), self.layout.channels());
        self.layout = layout;
    }

    /// Copies plane 0 of a packed FFmpeg frame, dropping its line padding.
    pub fn from_video(frame: &ffmpeg_next::frame::Video, layout: PixelLayout) -> anyhow::Result<Self> {
        if frame.format() != layout.pixel() {
            anyhow::bail!(
                "frame format {:?} does not match layout {:?}",
                frame.format(),
                layout
            );
        }
        let width = frame.width();
        let height = frame.height();
        let row_bytes = width as usize * layout.channels();
        let src_stride = frame.stride(0);
        let src = frame.data(0);

        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let start = y * src_stride;
            data.extend_from_slice(&src[start..start + row_bytes]);
        }
        Ok(Self::from_packed(width, height, layout, data)?)
    }

    /// Allocates an FFmpeg frame of the same layout and copies the rows in.
    pub fn to_video(&self) -> ffmpeg_next::frame::Video {
        let mut frame = ffmpeg_next::frame::Video::new(self.layout.pixel(), self.width, self.height);
        let dst_stride = frame.stride(0);
        let row_bytes = self.row_bytes();
        let dst = frame.data_mut(0);
        for y in 0..self.height {
            let start = y as usize * dst_stride;
            dst[start..start + row_bytes].copy_from_slice(self.row(y));
        }
        frame
    }
}

impl Debug for Image {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .field("stride", &self.stride)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Decoded audio, one buffer per plane. Planar formats carry one plane per
/// channel, packed formats a single interleaved plane.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    pub format: Sample,
    pub channels: u16,
    pub rate: u32,
    /// Samples per channel.
    pub samples: usize,
    pub pts: Option<i64>,
    pub planes: Vec<Bytes>,
}

impl AudioSamples {
    /// Bytes of meaningful data in each plane.
    pub fn plane_len(&self) -> usize {
        let per_sample = self.format.bytes();
        if self.format.is_planar() {
            self.samples * per_sample
        } else {
            self.samples * per_sample * self.channels as usize
        }
    }

    pub fn to_audio(&self) -> anyhow::Result<ffmpeg_next::frame::Audio> {
        let layout = channel_layout(self.channels).ok_or(anyhow::anyhow!(
            "no channel layout for {} channels",
            self.channels
        ))?;
        let mut frame = ffmpeg_next::frame::Audio::new(self.format, self.samples, layout);
        frame.set_rate(self.rate);
        frame.set_pts(self.pts);
        if frame.planes() != self.planes.len() {
            anyhow::bail!(
                "audio frame expects {} planes, got {}",
                frame.planes(),
                self.planes.len()
            );
        }
        for (index, plane) in self.planes.iter().enumerate() {
            let dst = frame.data_mut(index);
            let len = plane.len().min(dst.len());
            dst[..len].copy_from_slice(&plane[..len]);
        }
        Ok(frame)
    }
}

/// Default layout for a channel count. `None` for counts FFmpeg frames cannot
/// carry as planes (0, or more than 8).
pub fn channel_layout(channels: u16) -> Option<ChannelLayout> {
    let layout = match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        3 => ChannelLayout::_2POINT1,
        4 => ChannelLayout::QUAD,
        5 => ChannelLayout::_5POINT0,
        6 => ChannelLayout::_5POINT1,
        7 => ChannelLayout::_6POINT1,
        8 => ChannelLayout::_7POINT1,
        _ => return None,
    };
    Some(layout)
}

impl From<&ffmpeg_next::frame::Audio> for AudioSamples {
    fn from(frame: &ffmpeg_next::frame::Audio) -> Self {
        let mut samples = Self {
            format: frame.format(),
            channels: frame.channels(),
            rate: frame.rate(),
            samples: frame.samples(),
            pts: frame.pts(),
            planes: Vec::new(),
        };
        let plane_len = samples.plane_len();
        samples.planes = (0..frame.planes())
            .map(|index| {
                let data = frame.data(index);
                Bytes::copy_from_slice(&data[..plane_len.min(data.len())])
            })
            .collect();
        samples
    }
}

/// One decoded unit of media.
#[derive(Debug, Clone)]
pub enum Frame {
    Image(Image),
    Audio(AudioSamples),
}

impl Frame {
    pub fn is_image(&self) -> bool {
        matches!(self, Frame::Image(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Frame::Audio(_))
    }

    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Frame::Image(image) => Some(image),
            Frame::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioSamples> {
        match self {
            Frame::Audio(samples) => Some(samples),
            Frame::Image(_) => None,
        }
    }
}

impl From<Image> for Frame {
    fn from(image: Image) -> Self {
        Frame::Image(image)
    }
}

impl From<AudioSamples> for Frame {
    fn from(samples: AudioSamples) -> Self {
        Frame::Audio(samples)
    }
}
