use ffmpeg_next::{format::Pixel, frame, software::scaling};

/// Converts video frames to a fixed output format and size. The sws context
/// is rebuilt when the input format or size changes mid-stream.
pub struct Scaler {
    context: Option<scaling::Context>,
    input: (Pixel, u32, u32),
    output: (Pixel, u32, u32),
}

impl Scaler {
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            context: None,
            input: (Pixel::None, 0, 0),
            output: (format, width, height),
        }
    }

    pub fn output_format(&self) -> Pixel {
        self.output.0
    }

    /// Returns a new frame in the output format; pts is carried over.
    pub fn run(&mut self, src: &frame::Video) -> anyhow::Result<frame::Video> {
        let input = (src.format(), src.width(), src.height());
        if self.context.is_none() || self.input != input {
            let (format, width, height) = self.output;
            let context = scaling::Context::get(
                input.0,
                input.1,
                input.2,
                format,
                width,
                height,
                scaling::Flags::BILINEAR,
            )?;
            log::debug!(
                "scaler {:?} {}x{} -> {:?} {}x{}",
                input.0,
                input.1,
                input.2,
                format,
                width,
                height
            );
            self.context = Some(context);
            self.input = input;
        }

        let (format, width, height) = self.output;
        let mut dst = frame::Video::new(format, width, height);
        if let Some(context) = self.context.as_mut() {
            context.run(src, &mut dst)?;
        }
        dst.set_pts(src.pts());
        Ok(dst)
    }
}
