//! Hardware-accelerated encoder discovery and encoder pixel format selection.

use ffmpeg_next::{Codec, format::Pixel};

/// Try to find a hardware-accelerated encoder for the given software codec name.
/// Returns the first available hardware encoder, or None if none is found.
pub fn find_hw_encoder(codec_name: &str) -> Option<Codec> {
    let hw_names: &[&str] = match codec_name {
        "libx264" | "h264" => &["h264_nvenc", "h264_vaapi", "h264_qsv", "h264_v4l2m2m"],
        "libx265" | "hevc" | "h265" => &["hevc_nvenc", "hevc_vaapi", "hevc_qsv", "hevc_v4l2m2m"],
        "libvpx" | "libvpx-vp9" | "vp9" => &["vp9_vaapi", "vp9_qsv"],
        "libaom-av1" | "libsvtav1" | "av1" => &["av1_nvenc", "av1_vaapi", "av1_qsv"],
        _ => &[],
    };

    for name in hw_names {
        if let Some(codec) = ffmpeg_next::encoder::find_by_name(name) {
            log::info!("found hardware encoder: {}", name);
            return Some(codec);
        }
    }
    None
}

pub fn is_hardware(codec_name: &str) -> bool {
    codec_name.contains("nvenc")
        || codec_name.contains("vaapi")
        || codec_name.contains("qsv")
        || codec_name.contains("v4l2m2m")
}

/// Pixel format the encoder is fed with. Filtered frames are RGBA, which few
/// encoders take directly: software encoders get YUV420P, hardware encoders
/// NV12. When the codec advertises its formats and the choice is not among
/// them, the codec's first format wins.
pub fn pixel_format_for_encoder(codec: &Codec) -> Pixel {
    let preferred = if is_hardware(codec.name()) {
        Pixel::NV12
    } else {
        Pixel::YUV420P
    };

    let supported: Option<Vec<Pixel>> = codec
        .video()
        .ok()
        .and_then(|video| video.formats().map(|formats| formats.collect()));
    match supported {
        Some(formats) if !formats.is_empty() && !formats.contains(&preferred) => {
            if formats.contains(&Pixel::YUV420P) {
                Pixel::YUV420P
            } else {
                formats[0]
            }
        }
        _ => preferred,
    }
}
