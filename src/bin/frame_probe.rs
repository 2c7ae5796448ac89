//! frame_probe - open a camera url and report what it delivers.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crowdsense::{codec, SourceFactory, SourceOpener, SourceSettings};

#[derive(Parser, Debug)]
#[command(author, version, about = "Read frames from a camera url and print their size")]
struct Args {
    /// Camera url (stub://, http(s)://, rtsp://).
    url: String,
    /// Number of frames to read.
    #[arg(long, default_value_t = 10)]
    frames: u64,
    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    connect_timeout_ms: u64,
    /// Write the last frame read as JPEG.
    #[arg(long)]
    save: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let factory = SourceFactory::new(SourceSettings {
        connect_timeout: Duration::from_millis(args.connect_timeout_ms),
        ..SourceSettings::default()
    });
    let started = Instant::now();
    let mut source = factory
        .open(&args.url)
        .with_context(|| format!("failed to open {}", args.url))?;
    log::info!("opened {} in {:?}", args.url, started.elapsed());

    let mut last = None;
    let mut read = 0u64;
    while read < args.frames {
        match source.next_frame()? {
            Some(frame) => {
                read += 1;
                log::info!(
                    "frame {}: {}x{} ({} bytes)",
                    read,
                    frame.width,
                    frame.height,
                    frame.byte_len()
                );
                last = Some(frame);
            }
            None => {
                log::warn!("source ended after {} frame(s)", read);
                break;
            }
        }
    }
    let elapsed = started.elapsed().as_secs_f64();
    if read > 0 && elapsed > 0.0 {
        log::info!("{} frame(s), {:.1} fps", read, read as f64 / elapsed);
    }

    if let Some(path) = args.save {
        let frame = last.ok_or_else(|| anyhow!("no frame to save"))?;
        let jpeg = codec::encode_jpeg(&frame, 90)?;
        std::fs::write(&path, jpeg)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("saved last frame to {}", path.display());
    }
    Ok(())
}
