//! Command-line surface of the `ingest` binary (spec §6).
//!
//! `ingest <serial-device>[,<baud>] [<staging-dir>]`: one positional
//! argument runs fanout-only (publish to the ring buffer, no disk chunks);
//! a second enables chunk logging into `<staging-dir>`. Grounded on
//! `crates/bin/src/main.rs`'s `#[derive(Parser)]` struct, trimmed from a
//! subcommand tree down to the flat positional surface this spec needs.

use clap::Parser;
use std::path::PathBuf;

/// Named shared-memory segment this binary publishes into. Fixed rather
/// than a flag: the spec names a single well-known segment per pipeline
/// (`/cobs_to_shm`, spec §6's example), and nothing in scope requires more
/// than one.
pub const DEFAULT_SEGMENT_NAME: &str = "/cobs_to_shm";

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "COBS-framed serial ingest into a shared-memory ring buffer", long_about = None)]
pub struct Cli {
    /// Serial device, optionally followed by a comma and baud rate
    /// (e.g. `/dev/ttyUSB0,115200`); baud defaults to 115200.
    pub device_spec: String,

    /// Directory to write ten-second rollover chunk files into. Omit for
    /// fanout-only mode.
    pub staging_dir: Option<PathBuf>,

    /// Named shared-memory segment to publish into.
    #[arg(long, default_value = DEFAULT_SEGMENT_NAME)]
    pub segment: String,

    /// Ring buffer capacity in bytes; must be a power of two.
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    pub capacity: u64,

    /// Maximum slot size in bytes (including the size-field prefix); must
    /// be a multiple of 16 (spec §3 Invariant 1).
    #[arg(long, default_value_t = 65536)]
    pub max_slot_size: u64,
}
