//! One reconstruction pass over an address space.
//!
//! A [`Session`] wires the locator, the decoder and the renderer together
//! and owns the per-scan state: the set of descriptor names already
//! reconstructed and the order in which files were handed to the
//! [`Presenter`]. It is consumed by [`Session::scan`], so nothing survives
//! from one scan to the next.

use crate::decoder::DescriptorDecoder;
use crate::error::Error;
use crate::memory::{AddressSpace, ByteWindow};
use crate::proto::{highlight, HighlightedLine, ProtoRenderer, RenderConfig, StatsWriter};
use crate::scanner::{ScanStrategy, Scanner, ScannerConfig};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Notice shown when a scan recovers nothing
pub const NO_PROTOS_NOTICE: &str = "No embedded proto files were discovered.";

/// Receives reconstructed files
pub trait Presenter {
    /// Show one reconstructed file. Called at most once per name per scan.
    fn present(&mut self, name: &str, lines: Vec<HighlightedLine>);

    /// Show a user-facing notice
    fn notify(&mut self, message: &str);
}

/// A reconstructed `.proto` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedProto {
    /// Descriptor file name
    pub name: String,
    /// Bytes the descriptor was decoded from
    pub window: ByteWindow,
    /// Rendered text
    pub text: String,
    /// Element counts
    pub stats: StatsWriter,
}

/// Outcome of a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Candidates produced by the locator
    pub candidates: usize,
    /// Candidates that decoded to a named descriptor
    pub decoded: usize,
    /// Decoded descriptors skipped because the name was already seen
    pub duplicates: usize,
    /// Reconstructed files in presentation order
    pub files: Vec<ReconstructedProto>,
}

impl ScanReport {
    /// Whether nothing was recovered
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A single scan-and-reconstruct invocation
pub struct Session<'a, P: Presenter + ?Sized> {
    space: &'a dyn AddressSpace,
    presenter: &'a mut P,
    strategy: Box<dyn ScanStrategy + 'a>,
    decoder: DescriptorDecoder,
    renderer: ProtoRenderer,
    seen: HashSet<String>,
}

impl<'a, P: Presenter + ?Sized> Session<'a, P> {
    /// Creates a session with default configuration
    pub fn new(space: &'a dyn AddressSpace, presenter: &'a mut P) -> Self {
        Self {
            space,
            presenter,
            strategy: Box::new(Scanner::new()),
            decoder: DescriptorDecoder::new(),
            renderer: ProtoRenderer::new(),
            seen: HashSet::new(),
        }
    }

    /// Uses the default scanner with a custom configuration
    pub fn scanner_config(self, config: ScannerConfig) -> Self {
        self.strategy(Scanner::with_config(config))
    }

    /// Uses a custom location strategy
    pub fn strategy(mut self, strategy: impl ScanStrategy + 'a) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Sets the render configuration
    pub fn render_config(mut self, config: RenderConfig) -> Self {
        self.renderer = ProtoRenderer::with_config(config);
        self
    }

    /// Scan the address space and reconstruct every embedded descriptor.
    ///
    /// Each new descriptor is rendered and handed to the presenter as soon
    /// as it is decoded. If nothing is found the presenter receives
    /// [`NO_PROTOS_NOTICE`].
    pub fn scan(mut self) -> ScanReport {
        let mut report = ScanReport::default();
        let space = self.space;

        for candidate in self.strategy.candidates(space) {
            report.candidates += 1;

            let decoded = match self.decoder.decode_candidate(space, &candidate) {
                Ok(decoded) => decoded,
                Err(e) if e.is_recoverable() => {
                    debug!("Discarding candidate at {:#x}: {}", candidate.window.start, e);
                    continue;
                }
                Err(e) => {
                    warn!("Unexpected failure at {:#x}: {}", candidate.window.start, e);
                    continue;
                }
            };
            report.decoded += 1;

            if !self.seen.insert(decoded.name().to_string()) {
                debug!("Skipping candidate: {}", Error::duplicate(decoded.name()));
                report.duplicates += 1;
                continue;
            }

            info!("Processing {}", decoded.name());
            let text = self.renderer.render(&decoded.descriptor);
            self.presenter.present(decoded.name(), highlight(&text));

            report.files.push(ReconstructedProto {
                name: decoded.descriptor.name.clone(),
                window: decoded.window,
                stats: StatsWriter::collect(&decoded.descriptor),
                text,
            });
        }

        if report.is_empty() {
            self.presenter.notify(NO_PROTOS_NOTICE);
        }

        debug!(
            "Scan complete: {} candidates, {} decoded, {} duplicates, {} files",
            report.candidates,
            report.decoded,
            report.duplicates,
            report.files.len()
        );
        report
    }
}
