//! End-to-end exercise of the ring buffer, COBS framing, and ingest loop
//! together, covering the literal scenarios in spec §8 that cross module
//! boundaries (a late-opening reader, a slow reader lapping and
//! resyncing, a dead writer, and a chunk-logged run). Placed at the crate
//! root per the DAQ workspace's own top-level `tests/*.rs` convention
//! (e.g. `tests/integration_test.rs`).

use ring_ingest::cobs::encode_frame;
use ring_ingest::error::OpenOutcome;
use ring_ingest::header::LoggingHeader;
use ring_ingest::ingest::IngestLoop;
use ring_ingest::ring_buffer::reader::{RecvOutcome, SegmentReader};
use ring_ingest::ring_buffer::writer::SegmentWriter;
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::tempdir;

fn unique_name(case: &str) -> String {
    format!("/ring_ingest_integration_{}_{}", case, std::process::id())
}

#[test]
fn late_reader_sees_only_packets_after_open() {
    let name = unique_name("late");
    let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();

    for i in 0..10u8 {
        writer.acquire()[0] = i;
        writer.send(1).unwrap();
    }

    let mut reader = match SegmentReader::open(&name).unwrap() {
        OpenOutcome::Found(r) => r,
        OpenOutcome::NotFound => panic!("writer is alive"),
    };
    assert!(matches!(reader.recv(), RecvOutcome::Empty));

    writer.acquire()[0] = 11;
    writer.send(1).unwrap();

    match reader.recv() {
        RecvOutcome::Frame(payload) => assert_eq!(payload, vec![11]),
        other => panic!("expected packet 11, got {other:?}"),
    }

    writer.close();
}

#[test]
fn dead_writer_is_observed_as_eof_by_reader() {
    let name = unique_name("dead");
    let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();
    for _ in 0..5 {
        writer.acquire()[0] = 0xAA;
        writer.send(1).unwrap();
    }

    let reader = match SegmentReader::open(&name).unwrap() {
        OpenOutcome::Found(r) => r,
        OpenOutcome::NotFound => panic!("writer is alive"),
    };

    // A crash leaves pid nonzero but the process gone; close() exercises
    // the clean-shutdown (pid == 0) half of the same eof() check.
    writer.close();
    assert!(reader.eof().unwrap());
}

#[test]
fn ingest_loop_decodes_cobs_frames_from_a_serial_like_source() {
    let name = unique_name("ingest_cobs");
    let writer = SegmentWriter::init(&name, 4096, 512).unwrap();
    let mut reader = match SegmentReader::open(&name).unwrap() {
        OpenOutcome::Found(r) => r,
        OpenOutcome::NotFound => panic!("writer just inited"),
    };

    let mut wire = Vec::new();
    wire.extend(encode_frame(b"alpha"));
    wire.extend(encode_frame(b"beta"));
    wire.extend(encode_frame(&[0xFFu8; 254]));

    let mut loop_ = IngestLoop::new(Cursor::new(wire), writer, None);
    let shutdown = Arc::new(AtomicBool::new(false));
    loop_.run(&shutdown).unwrap();

    for expected in [&b"alpha"[..], &b"beta"[..], &[0xFFu8; 254][..]] {
        match reader.recv() {
            RecvOutcome::Frame(blob) => {
                let header = LoggingHeader::decode(blob[..8].try_into().unwrap()).unwrap();
                assert_eq!(header.size as usize, expected.len());
                assert_eq!(&blob[8..], expected);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
    }
}

#[test]
fn ingest_loop_writes_chunk_file_and_reports_it_at_shutdown() {
    let dir = tempdir().unwrap();
    let name = unique_name("ingest_chunk");
    let writer = SegmentWriter::init(&name, 4096, 512).unwrap();
    let chunk_writer = ring_ingest::chunk_writer::ChunkWriter::new(dir.path());

    let wire = encode_frame(b"logged-packet");
    let mut loop_ = IngestLoop::new(Cursor::new(wire), writer, Some(chunk_writer));
    let shutdown = Arc::new(AtomicBool::new(false));

    let completed = loop_.run(&shutdown).unwrap();
    let path = completed.expect("the one open chunk should be emitted at end of stream");
    assert!(path.starts_with(dir.path()));

    let on_disk = std::fs::read(&path).unwrap();
    let header = LoggingHeader::decode(on_disk[..8].try_into().unwrap()).unwrap();
    assert_eq!(header.size as usize, b"logged-packet".len());
    assert_eq!(&on_disk[8..8 + b"logged-packet".len()], b"logged-packet");
}

#[test]
fn slow_reader_laps_then_resyncs_and_resumes() {
    let name = unique_name("lap");
    let mut writer = SegmentWriter::init(&name, 4096, 256).unwrap();
    let mut reader = match SegmentReader::open(&name).unwrap() {
        OpenOutcome::Found(r) => r,
        OpenOutcome::NotFound => panic!("writer just inited"),
    };

    let payload = vec![0x11u8; 240];
    for _ in 0..40 {
        writer.acquire()[..payload.len()].copy_from_slice(&payload);
        writer.send(payload.len()).unwrap();
    }

    let lapped_or_stale = match reader.recv() {
        RecvOutcome::Lapped => true,
        RecvOutcome::Frame(_) => !reader.has_kept_up(),
        RecvOutcome::Empty => false,
    };
    assert!(lapped_or_stale);

    reader.resync();
    writer.acquire()[0] = 0x22;
    writer.send(1).unwrap();
    match reader.recv() {
        RecvOutcome::Frame(payload) => assert_eq!(payload, vec![0x22]),
        other => panic!("expected the post-resync packet, got {other:?}"),
    }

    writer.close();
}
