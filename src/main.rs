//! Thin binary entry point: parse arguments, wire up the ring buffer,
//! serial source, and chunk writer, then run the ingest loop until a
//! termination signal or end of stream (spec §6).

use anyhow::Context;
use clap::Parser;
use ring_ingest::chunk_writer::ChunkWriter;
use ring_ingest::cli::Cli;
use ring_ingest::ingest::IngestLoop;
use ring_ingest::ring_buffer::writer::SegmentWriter;
use ring_ingest::serial;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("failed to register SIGTERM handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("failed to register SIGINT handler")?;

    let source = serial::open(&cli.device_spec).context("failed to open serial device")?;
    let writer = SegmentWriter::init(&cli.segment, cli.capacity, cli.max_slot_size)
        .context("failed to initialize ring buffer segment")?;
    let chunk_writer = cli.staging_dir.as_deref().map(ChunkWriter::new);

    let mut loop_ = IngestLoop::new(source, writer, chunk_writer);
    let completed = loop_.run(&shutdown).context("ingest loop failed")?;
    if let Some(path) = completed {
        println!("{}", path.display());
    }

    Ok(())
}
