// FPGA String-Match Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # FPGA String-Match Accelerator Host Driver
//!
//! This crate drives the string-match (regex) action of a CAPI/SNAP FPGA
//! card from the host: it encodes patterns and packets into the binary
//! record format the hardware reads, sequences a scan through the action's
//! control/status registers, and decodes the matched packet identifiers the
//! hardware writes back.
//!
//! ## Layers
//!
//! - [`Encoder`], [`RecordBuffer`], [`DmaBuffer`]: 64-byte aligned records in
//!   page-aligned host memory
//! - [`ScanDriver`]: the `Configured -> CopyingPattern -> Scanning ->
//!   Flushing -> Done` register protocol for one scan
//! - [`JobDescriptor`]: one pattern over one packet stream, with per-phase
//!   timings and result harvesting
//! - [`EngineJob`], [`run_engines`]: one job stream per engine thread, all
//!   engines sharing one [`HardwareManager`]
//!
//! ## Platform Support
//!
//! | Platform | Card transport | Simulated action |
//! |----------|----------------|------------------|
//! | Linux    | [`MmioCard`]   | Supported        |
//! | Other    | Not available  | Supported        |
//!
//! ## Example
//!
//! ```rust
//! use strmatch_accel::{AccelConfig, AccelError, HardwareManager, JobDescriptor, SimulatedAction};
//!
//! fn literal(pattern: &str, width: usize) -> Result<Vec<u8>, AccelError> {
//!     Ok(pattern.bytes().take(width).collect())
//! }
//!
//! let hw = HardwareManager::new(SimulatedAction::new(1), AccelConfig::default());
//! let packets: [&[u8]; 2] = [b"foo", b"foobar123"];
//! let summary = JobDescriptor::new(&hw, 0)
//!     .execute(&literal, "foo", packets)
//!     .unwrap();
//! println!("{}", strmatch_accel::report::CSV_HEADER);
//! println!("{}", strmatch_accel::report::csv_line(&summary));
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and installs no logger. Phase
//! boundaries are logged at `debug`, individual status polls at `trace`,
//! hardware errors at `warn`.

// Module declarations
pub mod buffer;
pub mod config;
pub mod device;
pub mod driver;
pub mod encoder;
pub mod engine_job;
pub mod error;
pub mod hardware;
pub mod job;
pub mod record;
pub mod regs;
pub mod report;
pub mod results;
pub mod scheduler;
pub mod sim;
pub mod transport;
pub mod worker;

// Re-exports for convenient access
pub use buffer::{BufferDescriptor, DmaBuffer, RecordBuffer};
pub use config::AccelConfig;
pub use device::{discover_cards, is_card_available, CardInfo, MmioCard};
pub use driver::{PollPolicy, ScanDriver, ScanOutcome, ScanRequest, ScanState};
pub use encoder::{Encoder, PatternCompiler};
pub use engine_job::{EngineJob, JobStatus};
pub use error::{AccelError, AccelResult};
pub use hardware::HardwareManager;
pub use job::{JobDescriptor, JobFailure, JobState, JobSummary, PhaseTimings, Step};
pub use record::{RecordHeader, RecordKind, ResultSlot};
pub use results::decode_results;
pub use scheduler::{run_engines, EngineReport, JobOutcome};
pub use sim::{RegisterOp, SimulatedAction};
pub use transport::ActionTransport;
pub use worker::{BufferedWorker, Worker};
