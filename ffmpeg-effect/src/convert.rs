//! Channel-order conversions between the decoder's output and the RGBA buffers
//! filter engines work on.

use crate::error::{Result, TranscodeError};
use crate::frame::{Image, PixelLayout};

/// Swaps the blue and red channels of every pixel in place.
pub fn bgr_to_rgb(image: &mut Image) -> Result<()> {
    expect_layout(image, PixelLayout::Bgr24)?;
    for y in 0..image.height() {
        for pixel in image.row_mut(y).chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
    }
    image.set_layout(PixelLayout::Rgb24);
    Ok(())
}

/// Expands a 3-channel RGB image into packed RGBA with an opaque alpha channel.
pub fn rgb_to_rgba(image: &Image) -> Result<Image> {
    expect_layout(image, PixelLayout::Rgb24)?;
    let mut data = Vec::with_capacity(image.width() as usize * image.height() as usize * 4);
    for y in 0..image.height() {
        for pixel in image.row(y).chunks_exact(3) {
            data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], u8::MAX]);
        }
    }
    Image::from_packed(image.width(), image.height(), PixelLayout::Rgba32, data)
}

/// Brings any supported layout to RGBA, going through RGB for BGR input.
pub fn to_rgba(mut image: Image) -> Result<Image> {
    match image.layout() {
        PixelLayout::Rgba32 => Ok(image),
        PixelLayout::Rgb24 => rgb_to_rgba(&image),
        PixelLayout::Bgr24 => {
            bgr_to_rgb(&mut image)?;
            rgb_to_rgba(&image)
        }
    }
}

fn expect_layout(image: &Image, expected: PixelLayout) -> Result<()> {
    if image.layout() != expected {
        return Err(TranscodeError::invalid_image(format!(
            "expected {:?}, got {:?}",
            expected,
            image.layout()
        )));
    }
    Ok(())
}
