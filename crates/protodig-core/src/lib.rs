//! # protodig-core
//!
//! A library for recovering `.proto` source from binary images that embed
//! serialized `FileDescriptorProto` metadata.
//!
//! This crate provides the core functionality for:
//! - Locating candidate descriptors in an unstructured address space
//! - Bounding and authoritatively decoding each candidate
//! - Rendering decoded descriptors as `.proto` text with highlight spans
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`memory`]: Address space search and read primitives
//! - [`scanner`]: Anchor search and wire format heuristics
//! - [`decoder`]: Trial decoding against the descriptor schema
//! - [`descriptor`]: Immutable decoded descriptor model
//! - [`proto`]: `.proto` rendering and highlighting
//! - [`session`]: The scan-and-reconstruct pipeline
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use protodig_core::{HighlightedLine, MemoryImage, Presenter, Session};
//!
//! struct Stdout;
//!
//! impl Presenter for Stdout {
//!     fn present(&mut self, name: &str, lines: Vec<HighlightedLine>) {
//!         println!("// {}", name);
//!         for line in lines {
//!             println!("{}", line.text);
//!         }
//!     }
//!
//!     fn notify(&mut self, message: &str) {
//!         eprintln!("{}", message);
//!     }
//! }
//!
//! let data = std::fs::read("./target/release/my_app")?;
//! let image = MemoryImage::new(&data);
//! let report = Session::new(&image, &mut Stdout).scan();
//! println!("{} files recovered", report.files.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`AddressSpace`]: Scan something other than an in-memory image
//! - [`ScanStrategy`]: Customize the candidate location algorithm
//! - [`ProtoWriter`]: Walk decoded descriptors for other outputs
//! - [`Presenter`]: Decide where reconstructed files go

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decoder;
pub mod descriptor;
pub mod error;
pub mod memory;
pub mod proto;
pub mod scanner;
pub mod session;

// Re-export primary types for convenience
pub use decoder::{DecodedDescriptor, DescriptorDecoder};
pub use descriptor::{FileDescriptor, Node};
pub use error::{Error, Result};
pub use memory::{AddressSpace, BytePattern, ByteWindow, MemoryImage};
pub use proto::{
    resolve_type, HighlightedLine, ProtoRenderer, ProtoWriter, RenderConfig, Span, SpanKind,
    StatsWriter,
};
pub use scanner::{Candidate, ScanStrategy, Scanner, ScannerConfig};
pub use session::{Presenter, ReconstructedProto, ScanReport, Session, NO_PROTOS_NOTICE};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read a file from disk, map it at `base` and scan it.
///
/// Only the read can fail; everything that goes wrong inside the scan is
/// handled per candidate.
pub fn scan_file<P: Presenter + ?Sized>(
    path: impl AsRef<std::path::Path>,
    base: u64,
    scanner: ScannerConfig,
    render: RenderConfig,
    presenter: &mut P,
) -> Result<ScanReport> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    tracing::debug!("Read {} bytes from {}", data.len(), path.display());

    let image = MemoryImage::with_base(base, &data);
    Ok(Session::new(&image, presenter)
        .scanner_config(scanner)
        .render_config(render)
        .scan())
}
