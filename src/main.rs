use ffmpeg_effect::{CpuFilter, PixelEffect, Session, TranscodeReport};
use tokio_util::sync::CancellationToken;

mod config;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("ffmpeg_effect", log::LevelFilter::Debug)
        .filter_module("video_effect", log::LevelFilter::Debug)
        .init();
}

fn usage() -> ! {
    eprintln!("usage: video-effect <source> <output> [passthrough|grayscale|invert|sepia]");
    std::process::exit(2);
}

/// Runs the whole transcode on the calling thread. The filter engine is
/// created here so it is bound to the same thread as the session.
fn transcode(
    source: &str,
    output: &str,
    effect: PixelEffect,
    cancel: CancellationToken,
) -> anyhow::Result<TranscodeReport> {
    let mut session = Session::with_config(source, output, config::config().session.clone());
    session.set_cancel_token(cancel);
    let mut filter = CpuFilter::new(effect);
    let report = session.process(&mut filter)?;
    session.stop()?;
    Ok(report)
}

async fn run() -> anyhow::Result<TranscodeReport> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 || args.len() > 3 {
        usage();
    }
    let source = args[0].clone();
    let output = args[1].clone();
    let effect: PixelEffect = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(config::config().effect.as_str())
        .parse()?;

    match ffmpeg_effect::probe(&source) {
        Ok(info) => log::info!("source {}: {}", source, info),
        Err(e) => log::warn!("probe {} failed: {}", source, e),
    }
    log::info!("applying {} to {} -> {}", effect.name(), source, output);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let mut handle =
        tokio::task::spawn_blocking(move || transcode(&source, &output, effect, cancel_clone));

    loop {
        tokio::select! {
            result = &mut handle => {
                return result?;
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                log::warn!("ctrl+c received, cancelling");
                cancel.cancel();
            },
        }
    }
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = ffmpeg_effect::init() {
        eprintln!("Error initializing ffmpeg: {}", e);
        std::process::exit(1);
    }

    match run().await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            log::error!("transcode failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
