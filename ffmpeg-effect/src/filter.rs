use std::str::FromStr;

use crate::affinity::ThreadAffinity;
use crate::frame::{Image, PixelLayout};

/// An image filter the session hands every RGBA frame to.
///
/// Implementations are usually bound to the thread that created them (a GPU
/// context, for example). The session calls [`affinity`](FilterEngine::affinity)
/// before each call and refuses to drive the engine from any other thread.
pub trait FilterEngine {
    fn affinity(&self) -> ThreadAffinity;

    /// Loads the next input. The engine copies what it needs; the caller keeps
    /// ownership of `image`.
    fn set_input_image(&mut self, image: &Image) -> anyhow::Result<()>;

    /// Renders the current input with the active effect.
    fn filtered_image(&mut self) -> anyhow::Result<Image>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEffect {
    Passthrough,
    Grayscale,
    Invert,
    Sepia,
}

impl PixelEffect {
    pub fn name(self) -> &'static str {
        match self {
            PixelEffect::Passthrough => "passthrough",
            PixelEffect::Grayscale => "grayscale",
            PixelEffect::Invert => "invert",
            PixelEffect::Sepia => "sepia",
        }
    }

    fn apply(self, pixel: &mut [u8]) {
        let (r, g, b) = (pixel[0] as f32, pixel[1] as f32, pixel[2] as f32);
        match self {
            PixelEffect::Passthrough => {}
            PixelEffect::Grayscale => {
                // Rec. 601 luma
                let y = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
                pixel[0] = y;
                pixel[1] = y;
                pixel[2] = y;
            }
            PixelEffect::Invert => {
                pixel[0] = u8::MAX - pixel[0];
                pixel[1] = u8::MAX - pixel[1];
                pixel[2] = u8::MAX - pixel[2];
            }
            PixelEffect::Sepia => {
                pixel[0] = clamp(0.393 * r + 0.769 * g + 0.189 * b);
                pixel[1] = clamp(0.349 * r + 0.686 * g + 0.168 * b);
                pixel[2] = clamp(0.272 * r + 0.534 * g + 0.131 * b);
            }
        }
    }
}

fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

impl FromStr for PixelEffect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passthrough" | "none" => Ok(PixelEffect::Passthrough),
            "grayscale" | "gray" => Ok(PixelEffect::Grayscale),
            "invert" => Ok(PixelEffect::Invert),
            "sepia" => Ok(PixelEffect::Sepia),
            other => Err(anyhow::anyhow!("unknown effect: {}", other)),
        }
    }
}

/// A software [`FilterEngine`] applying a per-pixel effect to RGBA input.
pub struct CpuFilter {
    affinity: ThreadAffinity,
    effect: PixelEffect,
    input: Option<Image>,
}

impl CpuFilter {
    /// Binds the filter to the calling thread.
    pub fn new(effect: PixelEffect) -> Self {
        Self {
            affinity: ThreadAffinity::current(),
            effect,
            input: None,
        }
    }
}

impl FilterEngine for CpuFilter {
    fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    fn set_input_image(&mut self, image: &Image) -> anyhow::Result<()> {
        if image.layout() != PixelLayout::Rgba32 {
            anyhow::bail!("filter input must be RGBA, got {:?}", image.layout());
        }
        self.input = Some(image.clone());
        Ok(())
    }

    fn filtered_image(&mut self) -> anyhow::Result<Image> {
        let mut image = self
            .input
            .take()
            .ok_or(anyhow::anyhow!("no input image set"))?;
        if self.effect != PixelEffect::Passthrough {
            for y in 0..image.height() {
                for pixel in image.row_mut(y).chunks_exact_mut(4) {
                    self.effect.apply(pixel);
                }
            }
        }
        Ok(image)
    }
}
