use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{Backend, FfmpegBackend, Geometry, MediaSink, MediaSource},
    config::SessionConfig,
    convert,
    error::{Result, TranscodeError},
    filter::FilterEngine,
    frame::{Frame, Image, PixelLayout},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, nothing opened yet.
    Idle,
    Started,
    /// `process` reached end of stream and completed the output.
    Finished,
    /// `process` aborted; handles have been released.
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscodeReport {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub elapsed_ms: u64,
}

/// Re-encodes one source file into one output file, passing every image frame
/// through a [`FilterEngine`] and forwarding audio untouched.
///
/// A session is single-threaded: the filter engine must be driven from the
/// thread it was created on, which `process` checks before every filter call.
/// Decoder and encoder handles are released when `process` returns (success or
/// failure), on `stop`, or when the session is dropped, whichever comes first.
pub struct Session<B: Backend> {
    source_path: String,
    output_path: String,
    format_hint: Option<String>,
    backend: B,
    state: SessionState,
    geometry: Option<Geometry>,
    source: Option<B::Source>,
    sink: Option<B::Sink>,
    cancel: Option<CancellationToken>,
}

impl Session<FfmpegBackend> {
    pub fn new(source_path: &str, output_path: &str) -> Self {
        Self::with_config(source_path, output_path, SessionConfig::default())
    }

    pub fn with_config(source_path: &str, output_path: &str, config: SessionConfig) -> Self {
        let backend = FfmpegBackend::new(config.encoder);
        Self::with_backend(source_path, output_path, config.format_hint, backend)
    }
}

impl<B: Backend> Session<B> {
    pub fn with_backend(
        source_path: &str,
        output_path: &str,
        format_hint: Option<String>,
        backend: B,
    ) -> Self {
        Self {
            source_path: source_path.to_string(),
            output_path: output_path.to_string(),
            format_hint,
            backend,
            state: SessionState::Idle,
            geometry: None,
            source: None,
            sink: None,
            cancel: None,
        }
    }

    /// Checked before every frame; a cancelled session aborts with
    /// [`TranscodeError::Cancelled`].
    pub fn set_cancel_token(&mut self, cancel: CancellationToken) {
        self.cancel = Some(cancel);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Known once `start` succeeded.
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn output_path(&self) -> &str {
        &self.output_path
    }

    /// Opens the source, then the destination with the source's geometry.
    ///
    /// On failure nothing stays open and the session can be started again.
    pub fn start(&mut self) -> Result<Geometry> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Started => return self.geometry.ok_or(TranscodeError::NotStarted),
            _ => return Err(TranscodeError::Closed),
        }

        let mut source = self
            .backend
            .open_source(&self.source_path, self.format_hint.as_deref())
            .map_err(|source| TranscodeError::DecoderOpen {
                path: self.source_path.clone(),
                source,
            })?;

        let geometry = source.geometry();
        if geometry.width == 0 || geometry.height == 0 {
            if let Err(e) = source.close() {
                log::warn!("close source {} failed: {:#}", self.source_path, e);
            }
            return Err(TranscodeError::DecoderOpen {
                path: self.source_path.clone(),
                source: anyhow::anyhow!(
                    "invalid video size {}x{}",
                    geometry.width,
                    geometry.height
                ),
            });
        }
        log::info!(
            "source opened: {}, {}x{}, audio channels: {}, frame rate: {}/{}",
            self.source_path,
            geometry.width,
            geometry.height,
            geometry.audio_channels,
            geometry.frame_rate.0,
            geometry.frame_rate.1
        );

        let sink = match self.backend.open_sink(&self.output_path, &geometry) {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(close_err) = source.close() {
                    log::warn!("close source {} failed: {:#}", self.source_path, close_err);
                }
                return Err(TranscodeError::EncoderOpen {
                    path: self.output_path.clone(),
                    source: e,
                });
            }
        };
        log::info!("destination opened: {}", self.output_path);

        self.source = Some(source);
        self.sink = Some(sink);
        self.geometry = Some(geometry);
        self.state = SessionState::Started;
        Ok(geometry)
    }

    /// Runs the whole transcode, starting the session first if needed.
    pub fn process<F: FilterEngine + ?Sized>(&mut self, filter: &mut F) -> Result<TranscodeReport> {
        filter.affinity().check()?;
        if self.state == SessionState::Idle {
            self.start()?;
        }
        if self.state != SessionState::Started {
            return Err(TranscodeError::Closed);
        }

        let started = Instant::now();
        let mut report = TranscodeReport::default();
        match self.run(filter, &mut report) {
            Ok(()) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                self.state = SessionState::Finished;
                log::info!(
                    "transcode finished: {}, video frames: {}, audio frames: {}, {} ms",
                    self.output_path,
                    report.video_frames,
                    report.audio_frames,
                    report.elapsed_ms
                );
                Ok(report)
            }
            Err(e) => {
                log::error!(
                    "transcode {} aborted after {} video frames: {}",
                    self.output_path,
                    report.video_frames,
                    e
                );
                if let Err(release_err) = self.release() {
                    log::warn!("release after failure: {}", release_err);
                }
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    fn run<F: FilterEngine + ?Sized>(
        &mut self,
        filter: &mut F,
        report: &mut TranscodeReport,
    ) -> Result<()> {
        let geometry = self.geometry.ok_or(TranscodeError::NotStarted)?;
        loop {
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                return Err(TranscodeError::Cancelled);
            }

            match self.next_frame()? {
                None => {
                    let sink = self.sink.as_mut().ok_or(TranscodeError::Closed)?;
                    sink.finalize().map_err(TranscodeError::Encode)?;
                    // the output is complete; a release failure no longer affects it
                    if let Err(e) = self.release() {
                        log::warn!("release after finished transcode {}: {}", self.output_path, e);
                    }
                    return Ok(());
                }
                Some(Frame::Image(image)) => {
                    let filtered = apply_filter(filter, &image)?;
                    check_output(&filtered, &geometry)?;
                    let sink = self.sink.as_mut().ok_or(TranscodeError::Closed)?;
                    sink.write_image(&filtered).map_err(TranscodeError::Encode)?;
                    report.video_frames += 1;
                }
                Some(Frame::Audio(samples)) => {
                    let sink = self.sink.as_mut().ok_or(TranscodeError::Closed)?;
                    sink.write_audio(&samples).map_err(TranscodeError::Encode)?;
                    report.audio_frames += 1;
                }
            }
        }
    }

    /// Pulls one frame from the decoder. Images are returned as RGBA.
    ///
    /// `Ok(None)` means end of stream. A decode failure stops the decoder and is
    /// reported as [`TranscodeError::Decode`].
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let geometry = match self.state {
            SessionState::Started => self.geometry.ok_or(TranscodeError::NotStarted)?,
            SessionState::Idle => return Err(TranscodeError::NotStarted),
            _ => return Err(TranscodeError::Closed),
        };
        let source = self.source.as_mut().ok_or(TranscodeError::Closed)?;

        match source.pull_frame() {
            Ok(None) => Ok(None),
            Ok(Some(Frame::Audio(samples))) => Ok(Some(Frame::Audio(samples))),
            Ok(Some(Frame::Image(image))) => {
                log::trace!(
                    "image frame: {}x{}, channels: {}, layout: {:?}",
                    image.width(),
                    image.height(),
                    image.channels(),
                    image.layout()
                );
                if image.dimensions() != geometry.dimensions() {
                    return Err(TranscodeError::GeometryMismatch {
                        expected: geometry.dimensions(),
                        found: image.dimensions(),
                    });
                }
                Ok(Some(Frame::Image(convert::to_rgba(image)?)))
            }
            Err(e) => {
                if let Err(close_err) = source.close() {
                    log::warn!("stop decoder {} failed: {:#}", self.source_path, close_err);
                }
                Err(TranscodeError::Decode(e))
            }
        }
    }

    /// Releases the decoder and encoder. Safe to call any number of times.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        let result = self.release();
        self.state = SessionState::Stopped;
        result
    }

    /// Stop decoder, stop encoder, release encoder, release decoder. Every step
    /// runs; the first failure is returned.
    fn release(&mut self) -> Result<()> {
        let mut first_error: Option<anyhow::Error> = None;
        let mut record = |step: &str, result: anyhow::Result<()>| {
            if let Err(e) = result {
                log::warn!("{} failed: {:#}", step, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        };

        if let Some(source) = self.source.as_mut() {
            record("stop decoder", source.close());
        }
        if let Some(sink) = self.sink.as_mut() {
            record("stop encoder", sink.close());
        }
        drop(self.sink.take());
        drop(self.source.take());

        match first_error {
            Some(e) => Err(TranscodeError::Release(e)),
            None => Ok(()),
        }
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("release session {} failed: {}", self.output_path, e);
        }
    }
}

fn apply_filter<F: FilterEngine + ?Sized>(filter: &mut F, image: &Image) -> Result<Image> {
    filter.affinity().check()?;
    filter
        .set_input_image(image)
        .map_err(TranscodeError::Filter)?;
    filter.filtered_image().map_err(TranscodeError::Filter)
}

fn check_output(image: &Image, geometry: &Geometry) -> Result<()> {
    if image.dimensions() != geometry.dimensions() {
        return Err(TranscodeError::GeometryMismatch {
            expected: geometry.dimensions(),
            found: image.dimensions(),
        });
    }
    if image.layout() != PixelLayout::Rgba32 {
        return Err(TranscodeError::invalid_image(format!(
            "filter returned {:?}, expected RGBA",
            image.layout()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
