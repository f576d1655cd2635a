use std::path::PathBuf;

use bytes::Bytes;
use ffmpeg_next::format::{Sample, sample};

use crate::affinity::ThreadAffinity;
use crate::backend::{Geometry, MediaSink, MediaSource};
use crate::config::{EncoderSettings, SessionConfig};
use crate::error::TranscodeError;
use crate::filter::{CpuFilter, FilterEngine, PixelEffect};
use crate::frame::{AudioSamples, Frame, Image, PixelLayout};
use crate::session::Session;
use crate::sink::FfmpegSink;
use crate::source::FfmpegSource;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const FPS: i32 = 10;
const RATE: u32 = 48_000;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("video-effect-{}-{}.mp4", std::process::id(), name))
}

/// Builtin codecs only, so the tests do not depend on libx264.
fn settings() -> EncoderSettings {
    EncoderSettings {
        codec: Some("mpeg4".to_string()),
        audio_codec: Some("aac".to_string()),
        ..Default::default()
    }
}

fn codecs_available() -> bool {
    ffmpeg_next::encoder::find_by_name("mpeg4").is_some()
        && ffmpeg_next::encoder::find_by_name("aac").is_some()
}

fn solid_rgba(rgba: [u8; 4]) -> Image {
    let mut image = Image::new(WIDTH, HEIGHT, PixelLayout::Rgba32);
    for pixel in image.data_mut().chunks_exact_mut(4) {
        pixel.copy_from_slice(&rgba);
    }
    image
}

fn silence(samples: usize) -> AudioSamples {
    AudioSamples {
        format: Sample::F32(sample::Type::Planar),
        channels: 2,
        rate: RATE,
        samples,
        pts: None,
        planes: vec![Bytes::from(vec![0u8; samples * 4]); 2],
    }
}

/// Writes `frames` solid frames (plus matching silence when `with_audio`).
fn write_source(path: &PathBuf, frames: usize, with_audio: bool) -> anyhow::Result<()> {
    let mut geometry = Geometry::video(WIDTH, HEIGHT);
    geometry.frame_rate = (FPS, 1);
    if with_audio {
        geometry = geometry.with_audio(2, RATE);
    }

    let mut sink = FfmpegSink::open(&path.to_string_lossy(), &geometry, &settings())?;
    for _ in 0..frames {
        sink.write_image(&solid_rgba([16, 128, 200, 255]))?;
        if with_audio {
            sink.write_audio(&silence((RATE / FPS as u32) as usize))?;
        }
    }
    sink.finalize()?;
    sink.close()
}

struct Decoded {
    geometry: Geometry,
    images: Vec<Image>,
    audio_frames: usize,
}

fn decode_all(path: &PathBuf) -> anyhow::Result<Decoded> {
    let mut source = FfmpegSource::open(&path.to_string_lossy(), None)?;
    let mut decoded = Decoded {
        geometry: source.geometry(),
        images: Vec::new(),
        audio_frames: 0,
    };
    while let Some(frame) = source.pull_frame()? {
        match frame {
            Frame::Image(image) => decoded.images.push(image),
            Frame::Audio(_) => decoded.audio_frames += 1,
        }
    }
    source.close()?;
    Ok(decoded)
}

/// Decoded image count, 0 when the file cannot be opened at all (an mp4
/// without its trailer has no index).
fn decodable_images(path: &PathBuf) -> usize {
    decode_all(path).map(|d| d.images.len()).unwrap_or(0)
}

/// Passes the first frame through and fails on the second.
struct SecondFrameFails {
    affinity: ThreadAffinity,
    input: Option<Image>,
    renders: usize,
}

impl FilterEngine for SecondFrameFails {
    fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    fn set_input_image(&mut self, image: &Image) -> anyhow::Result<()> {
        self.input = Some(image.clone());
        Ok(())
    }

    fn filtered_image(&mut self) -> anyhow::Result<Image> {
        self.renders += 1;
        if self.renders == 2 {
            anyhow::bail!("render failed");
        }
        self.input.take().ok_or(anyhow::anyhow!("no input"))
    }
}

fn session_config() -> SessionConfig {
    SessionConfig {
        format_hint: None,
        encoder: settings(),
    }
}

#[test]
fn test_transcode_inverts_frames() -> anyhow::Result<()> {
    crate::init()?;
    if !codecs_available() {
        eprintln!("skip: mpeg4/aac encoders not available");
        return Ok(());
    }
    let source_path = temp_path("invert-src");
    let output_path = temp_path("invert-out");
    write_source(&source_path, 3, false)?;

    let report = {
        let mut session = Session::with_config(
            &source_path.to_string_lossy(),
            &output_path.to_string_lossy(),
            session_config(),
        );
        let mut filter = CpuFilter::new(PixelEffect::Invert);
        session.process(&mut filter)?
    };
    assert_eq!(report.video_frames, 3);
    assert_eq!(report.audio_frames, 0);

    let decoded = decode_all(&output_path)?;
    assert_eq!(decoded.geometry.dimensions(), (WIDTH, HEIGHT));
    assert!(!decoded.geometry.has_audio());
    assert_eq!(decoded.images.len(), 3);

    // source RGB (16, 128, 200) inverted, read back as BGR
    let expected = [55i32, 127, 239];
    for image in &decoded.images {
        assert_eq!(image.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(image.layout(), PixelLayout::Bgr24);
        let center = &image.row(HEIGHT / 2)[(WIDTH / 2 * 3) as usize..][..3];
        for (got, want) in center.iter().zip(expected) {
            assert!(
                (*got as i32 - want).abs() <= 24,
                "pixel {:?} too far from {:?}",
                center,
                expected
            );
        }
    }

    let _ = std::fs::remove_file(&source_path);
    let _ = std::fs::remove_file(&output_path);
    Ok(())
}

#[test]
fn test_transcode_forwards_audio() -> anyhow::Result<()> {
    crate::init()?;
    if !codecs_available() {
        eprintln!("skip: mpeg4/aac encoders not available");
        return Ok(());
    }
    let source_path = temp_path("audio-src");
    let output_path = temp_path("audio-out");
    write_source(&source_path, 5, true)?;

    let mut session = Session::with_config(
        &source_path.to_string_lossy(),
        &output_path.to_string_lossy(),
        session_config(),
    );
    let geometry = session.start()?;
    assert_eq!(geometry.audio_channels, 2);
    assert_eq!(geometry.audio_sample_rate, RATE);

    let mut filter = CpuFilter::new(PixelEffect::Grayscale);
    let report = session.process(&mut filter)?;
    assert_eq!(report.video_frames, 5);
    assert!(report.audio_frames > 0);
    drop(session);

    let decoded = decode_all(&output_path)?;
    assert_eq!(decoded.images.len(), 5);
    assert_eq!(decoded.geometry.audio_channels, 2);
    assert!(decoded.audio_frames > 0);

    let _ = std::fs::remove_file(&source_path);
    let _ = std::fs::remove_file(&output_path);
    Ok(())
}

#[test]
fn test_sink_rejects_wrong_image() -> anyhow::Result<()> {
    crate::init()?;
    if !codecs_available() {
        eprintln!("skip: mpeg4/aac encoders not available");
        return Ok(());
    }
    let path = temp_path("reject");
    let mut sink = FfmpegSink::open(
        &path.to_string_lossy(),
        &Geometry::video(WIDTH, HEIGHT),
        &settings(),
    )?;

    let small = Image::new(WIDTH / 2, HEIGHT / 2, PixelLayout::Rgba32);
    assert!(sink.write_image(&small).is_err());
    let rgb = Image::new(WIDTH, HEIGHT, PixelLayout::Rgb24);
    assert!(sink.write_image(&rgb).is_err());

    // no audio stream: samples are dropped
    sink.write_audio(&silence(1024))?;

    sink.close()?;
    sink.close()?;
    assert!(sink.write_image(&solid_rgba([0, 0, 0, 255])).is_err());

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[test]
fn test_missing_source_fails_to_open() -> anyhow::Result<()> {
    crate::init()?;
    let missing = temp_path("does-not-exist");
    let mut session = Session::new(
        &missing.to_string_lossy(),
        &temp_path("never-written").to_string_lossy(),
    );
    let err = match session.start() {
        Ok(_) => anyhow::bail!("opening a missing file succeeded"),
        Err(e) => e,
    };
    assert!(err.is_startup());
    assert_eq!(session.state(), crate::session::SessionState::Idle);
    Ok(())
}

#[test]
fn test_close_without_finalize_writes_no_trailer() -> anyhow::Result<()> {
    crate::init()?;
    if !codecs_available() {
        eprintln!("skip: mpeg4/aac encoders not available");
        return Ok(());
    }
    let path = temp_path("unfinalized");
    let mut sink = FfmpegSink::open(
        &path.to_string_lossy(),
        &Geometry::video(WIDTH, HEIGHT),
        &settings(),
    )?;
    sink.write_image(&solid_rgba([10, 20, 30, 255]))?;
    sink.write_image(&solid_rgba([10, 20, 30, 255]))?;

    sink.close()?;
    assert!(!sink.finalized);
    assert!(sink.output.is_none());
    assert!(sink.video.is_none());
    // finalize after close has nothing left to flush
    assert!(sink.finalize().is_err());
    assert_eq!(decodable_images(&path), 0);

    let _ = std::fs::remove_file(&path);
    Ok(())
}

#[test]
fn test_aborted_transcode_is_not_flushed() -> anyhow::Result<()> {
    crate::init()?;
    if !codecs_available() {
        eprintln!("skip: mpeg4/aac encoders not available");
        return Ok(());
    }
    let source_path = temp_path("abort-src");
    let output_path = temp_path("abort-out");
    write_source(&source_path, 3, false)?;

    let mut session = Session::with_config(
        &source_path.to_string_lossy(),
        &output_path.to_string_lossy(),
        session_config(),
    );
    let mut filter = SecondFrameFails {
        affinity: ThreadAffinity::current(),
        input: None,
        renders: 0,
    };
    let result = session.process(&mut filter);
    assert!(matches!(result, Err(TranscodeError::Filter(_))));
    drop(session);

    assert_eq!(decodable_images(&output_path), 0);

    let _ = std::fs::remove_file(&source_path);
    let _ = std::fs::remove_file(&output_path);
    Ok(())
}
