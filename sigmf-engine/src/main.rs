use anyhow::Context;
use clap::Parser;
use log::{debug, error, info, warn};
use miette::Result;
use sigmf_core::keys;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use sigmf_engine::annotate::AnnotationWriter;
use sigmf_engine::playback::SigmfSource;
use sigmf_engine::recording::{start_recording, CaptureTarget, SampleChunk, SigmfSink};
use sigmf_engine::tools::{crop, digest, DigestStatus};
use sigmf_engine::{AnnotateArgs, Cli, Command, CropArgs, HashArgs, PlayArgs, RecordArgs};

/// Samples per block read from the input or written to the output
const BLOCK_ITEMS: usize = 8192;

fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .format_timestamp_millis()
        .init();

    debug!("sigmf {}", sigmf_engine::VERSION);

    let result = match args.command {
        Command::Record(args) => record(args),
        Command::Play(args) => play(args),
        Command::Hash(args) => hash(args),
        Command::Crop(args) => crop_dataset(args),
        Command::Annotate(args) => annotate(args),
    };
    result.map_err(|e| miette::miette!("{:#}", e))
}

fn record(args: RecordArgs) -> anyhow::Result<()> {
    run_detached(record_async(args))
}

/// Run `future` to completion without waiting for blocking tasks it leaves
/// behind; the stdin reader may still be stuck in read()
fn run_detached<F: std::future::Future<Output = anyhow::Result<()>>>(
    future: F,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = runtime.block_on(future);
    runtime.shutdown_background();
    result
}

async fn record_async(args: RecordArgs) -> anyhow::Result<()> {
    let sink = Arc::new(
        SigmfSink::create(&args.output, args.sink_config())
            .with_context(|| format!("Failed to open {}", args.output.display()))?,
    );
    if let Some(freq) = args.frequency {
        sink.set_capture_meta(CaptureTarget::Index(0), keys::FREQUENCY, freq)?;
    }

    let block_size = sink.item_size() * BLOCK_ITEMS;
    let (chunks_tx, chunks_rx) = mpsc::channel(16);
    let recording = start_recording(sink.clone(), chunks_rx);

    let input = args.input.clone();
    let reader = tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
        let mut reader: Box<dyn Read + Send> = match &input {
            Some(path) => Box::new(
                File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
            ),
            None => Box::new(io::stdin()),
        };
        let mut total = 0u64;
        let mut buf = vec![0u8; block_size];
        loop {
            let n = read_block(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            total += n as u64;
            let chunk = SampleChunk {
                samples: buf[..n].to_vec(),
                tags: Vec::new(),
            };
            if chunks_tx.blocking_send(chunk).is_err() {
                break;
            }
            if n < buf.len() {
                break;
            }
        }
        Ok(total)
    });

    tokio::select! {
        result = reader => {
            let bytes = result??;
            debug!("Input finished after {} bytes", bytes);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, closing recording");
            recording.stop();
        }
    }

    recording.finished().await;
    Ok(())
}

/// Fill `buf` as far as the input allows; a short count means end of input
fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn play(args: PlayArgs) -> anyhow::Result<()> {
    let source = SigmfSource::open(&args.input, args.source_config())
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut output: BufWriter<Box<dyn Write>> = BufWriter::new(match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    });

    let interrupted = Arc::new(AtomicBool::new(false));
    if args.repeat {
        let flag = interrupted.clone();
        std::thread::spawn(move || {
            if let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        });
    }

    let mut samples = 0u64;
    while !interrupted.load(Ordering::SeqCst) {
        let Some(chunk) = source.work(BLOCK_ITEMS)? else {
            break;
        };
        if let Some(global) = &chunk.global {
            debug!("Global metadata: {} keys", global.len());
        }
        for tag in &chunk.tags {
            debug!("Tag {}", tag);
        }
        match output.write_all(&chunk.samples) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Err(e) => return Err(e.into()),
        }
        samples += chunk.items as u64;
    }
    output.flush()?;
    info!("Played {} samples from {}", samples, args.input.display());
    Ok(())
}

fn hash(args: HashArgs) -> anyhow::Result<()> {
    let mut mismatches = 0;
    for dataset in &args.datasets {
        if args.update {
            let computed = digest::update(dataset)
                .with_context(|| format!("Failed to hash {}", dataset.display()))?;
            info!("{}: {}", dataset.display(), computed);
            continue;
        }
        match digest::check(dataset)
            .with_context(|| format!("Failed to check {}", dataset.display()))?
        {
            DigestStatus::Missing => warn!("{}: no hash stored", dataset.display()),
            DigestStatus::Match => info!("{}: hash matches", dataset.display()),
            status @ DigestStatus::Mismatch { .. } => {
                error!("{}: {}", dataset.display(), status);
                mismatches += 1;
            }
        }
    }
    if mismatches > 0 {
        anyhow::bail!("{} dataset(s) failed the hash check", mismatches);
    }
    Ok(())
}

fn crop_dataset(args: CropArgs) -> anyhow::Result<()> {
    let paths = crop::crop(&args.input, &args.output, &args.request())
        .with_context(|| format!("Failed to crop {}", args.input.display()))?;
    info!("Wrote {}", paths.meta.display());
    Ok(())
}

fn annotate(args: AnnotateArgs) -> anyhow::Result<()> {
    let mut writer = AnnotationWriter::open(&args.dataset, args.filter(), args.time_mode())
        .with_context(|| format!("Failed to load {}", args.dataset.display()))?;
    writer.add(args.request()?)?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_blocked_reader_does_not_hold_exit() {
        let (_keep, never) = std_mpsc::channel::<()>();
        let started = Instant::now();
        run_detached(async move {
            let _reader = tokio::task::spawn_blocking(move || never.recv());
            Ok(())
        })
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
