//! Locating embedded `FileDescriptorProto` data in an address space.
//!
//! ## Algorithm Overview
//!
//! 1. Search the address space for the `.proto` byte sequence (the anchor)
//! 2. Backtrack up to 64 bytes looking for the `name` field that holds the
//!    anchored file name: a `0x0A` tag, a length that ends exactly after the
//!    anchor, and a plausible file name
//! 3. Walk the wire format forward to estimate the descriptor size
//! 4. Add a fixed slack so the estimate becomes an upper bound
//!
//! Candidates are produced lazily, one anchor at a time. The exact length is
//! settled later by [`DescriptorDecoder`](crate::decoder::DescriptorDecoder).
//!
//! ## Extensibility
//!
//! The [`ScanStrategy`] trait allows custom location algorithms:
//!
//! ```no_run
//! use protodig_core::memory::AddressSpace;
//! use protodig_core::scanner::{Candidate, ScanStrategy};
//!
//! struct NoCandidates;
//!
//! impl ScanStrategy for NoCandidates {
//!     fn candidates<'a>(
//!         &'a self,
//!         space: &'a dyn AddressSpace,
//!     ) -> Box<dyn Iterator<Item = Candidate> + 'a> {
//!         Box::new(std::iter::empty())
//!     }
//! }
//! ```

mod wire;

use crate::error::{Error, Result};
use crate::memory::{AddressSpace, BytePattern, ByteWindow};
use tracing::{debug, trace, warn};

pub use wire::{decode_varint, walk, WireType, NAME_FIELD_TAG};

/// Pattern to search for (file name suffix)
pub const PROTO_SUFFIX: &[u8] = b".proto";

/// How far before an anchor a descriptor may start
pub const DEFAULT_BACKWARD_WINDOW: usize = 64;

/// Largest block read for one candidate
pub const MAX_PROTOBUF_SIZE: usize = 0x10_0000;

/// Added to the walked size to absorb under-estimation
pub const DEFAULT_SIZE_SLACK: usize = 1024;

/// Characters accepted in an embedded file name (after ASCII lowercasing)
const FILENAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-_/$,.[]()";

/// A byte range believed to hold one serialized `FileDescriptorProto`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Candidate start and upper-bound length, clipped to readable memory
    pub window: ByteWindow,
    /// Address of the anchor that produced this candidate
    pub anchor: u64,
    /// Length of the embedded file name
    pub name_len: usize,
    /// Result of the wire walk, before slack
    pub probable_size: usize,
}

/// Configuration for the scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Byte sequence that seeds the backward search
    pub anchor: Vec<u8>,
    /// Number of backward offsets tried per anchor
    pub backward_window: usize,
    /// Maximum bytes read for one candidate
    pub max_protobuf_size: usize,
    /// Slack added to the walked size
    pub size_slack: usize,
    /// Anchor match alignment
    pub alignment: u64,
    /// Maximum number of candidates to produce (0 = unlimited)
    pub max_results: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            anchor: PROTO_SUFFIX.to_vec(),
            backward_window: DEFAULT_BACKWARD_WINDOW,
            max_protobuf_size: MAX_PROTOBUF_SIZE,
            size_slack: DEFAULT_SIZE_SLACK,
            alignment: 1,
            max_results: 0,
        }
    }
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the anchor byte sequence
    pub fn anchor(mut self, anchor: impl Into<Vec<u8>>) -> Self {
        self.anchor = anchor.into();
        self
    }

    /// Sets the backward search window
    pub fn backward_window(mut self, window: usize) -> Self {
        self.backward_window = window;
        self
    }

    /// Sets the maximum candidate block size
    pub fn max_protobuf_size(mut self, size: usize) -> Self {
        self.max_protobuf_size = size;
        self
    }

    /// Sets the size slack
    pub fn size_slack(mut self, slack: usize) -> Self {
        self.size_slack = slack;
        self
    }

    /// Sets the anchor alignment
    pub fn alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the maximum number of candidates
    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }
}

/// Trait for implementing custom location strategies
pub trait ScanStrategy {
    /// Lazily produce candidates found in `space`
    fn candidates<'a>(&'a self, space: &'a dyn AddressSpace)
        -> Box<dyn Iterator<Item = Candidate> + 'a>;

    /// Collect all candidates
    fn scan(&self, space: &dyn AddressSpace) -> Vec<Candidate> {
        self.candidates(space).collect()
    }
}

/// Anchor-driven candidate locator
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Iterate over candidates in address order
    pub fn iter<'a>(&'a self, space: &'a dyn AddressSpace) -> Candidates<'a> {
        Candidates {
            scanner: self,
            space,
            pattern: BytePattern::literal(self.config.anchor.clone()),
            cursor: space.start(),
            produced: 0,
        }
    }

    /// Try to build a candidate from one anchor match
    pub fn probe(&self, space: &dyn AddressSpace, anchor: u64) -> Result<Candidate> {
        let anchor_len = self.config.anchor.len();

        for j in 0..self.config.backward_window {
            let Some(start) = anchor
                .checked_sub(j as u64 + 1)
                .filter(|&start| start >= space.start())
            else {
                break;
            };

            let block = space.read(start, self.config.max_protobuf_size);
            let name_len = (j + anchor_len).saturating_sub(1);

            match check_name_field(&block, name_len) {
                Ok(true) => {
                    let probable_size = walk(&block);
                    let upper_bound = probable_size
                        .saturating_add(self.config.size_slack)
                        .min(block.len());

                    debug!(
                        "Candidate at {:#x} for anchor {:#x}: name {} bytes, walked {} bytes",
                        start, anchor, name_len, probable_size
                    );

                    return Ok(Candidate {
                        window: ByteWindow::new(start, upper_bound),
                        anchor,
                        name_len,
                        probable_size,
                    });
                }
                Ok(false) => {}
                Err(e) => trace!("Offset {} before {:#x}: {}", j, anchor, e),
            }
        }

        Err(Error::boundary_not_found(anchor, self.config.backward_window))
    }
}

impl ScanStrategy for Scanner {
    fn candidates<'a>(
        &'a self,
        space: &'a dyn AddressSpace,
    ) -> Box<dyn Iterator<Item = Candidate> + 'a> {
        Box::new(self.iter(space))
    }
}

/// Lazy iterator over candidates, see [`Scanner::iter`]
pub struct Candidates<'a> {
    scanner: &'a Scanner,
    space: &'a dyn AddressSpace,
    pattern: BytePattern,
    cursor: u64,
    produced: usize,
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let scanner = self.scanner;
        let config = &scanner.config;
        if config.max_results > 0 && self.produced >= config.max_results {
            return None;
        }

        loop {
            let Some(anchor) =
                self.space
                    .search(self.cursor, self.space.end(), &self.pattern, config.alignment)
            else {
                debug!("No more anchors after {:#x}", self.cursor);
                return None;
            };
            self.cursor = anchor + 1;
            trace!("Anchor found at {:#x}", anchor);

            match scanner.probe(self.space, anchor) {
                Ok(candidate) => {
                    self.produced += 1;
                    return Some(candidate);
                }
                Err(e) if e.is_recoverable() => debug!("Skipping anchor: {}", e),
                Err(e) => warn!("Skipping anchor after unexpected failure: {}", e),
            }
        }
    }
}

/// Checks that `block` starts with a `name` field of exactly `name_len`
/// bytes made of file name characters.
fn check_name_field(block: &[u8], name_len: usize) -> Result<bool> {
    let Some(&tag) = block.first() else {
        return Err(Error::truncated(0));
    };
    if tag != NAME_FIELD_TAG {
        return Ok(false);
    }

    let (length, consumed) = decode_varint(block, 1)?;
    if length != name_len as u64 {
        return Ok(false);
    }

    let name_start = 1 + consumed;
    let name = block
        .get(name_start..name_start + name_len)
        .ok_or(Error::truncated(block.len()))?;
    Ok(is_valid_filename(name))
}

/// Whether every byte is in the file name charset, ignoring ASCII case
pub fn is_valid_filename(name: &[u8]) -> bool {
    name.iter()
        .all(|b| FILENAME_CHARSET.contains(&b.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;

    fn embedded_name(prefix: &[u8], name: &[u8], suffix: &[u8]) -> Vec<u8> {
        let mut data = prefix.to_vec();
        data.push(NAME_FIELD_TAG);
        data.push(name.len() as u8);
        data.extend_from_slice(name);
        data.extend_from_slice(suffix);
        data
    }

    #[test]
    fn test_scanner_config_builder() {
        let config = ScannerConfig::new()
            .backward_window(32)
            .max_protobuf_size(4096)
            .size_slack(16)
            .alignment(4)
            .max_results(3);

        assert_eq!(config.anchor, b".proto");
        assert_eq!(config.backward_window, 32);
        assert_eq!(config.max_protobuf_size, 4096);
        assert_eq!(config.size_slack, 16);
        assert_eq!(config.alignment, 4);
        assert_eq!(config.max_results, 3);
    }

    #[test]
    fn test_is_valid_filename() {
        assert!(is_valid_filename(b"google/protobuf/any.proto"));
        assert!(is_valid_filename(b"v1/api_(x)[2],$.proto"));
        assert!(is_valid_filename(b"MixedCase.proto"));
        assert!(!is_valid_filename(b"with space.proto"));
        assert!(!is_valid_filename(b"quote\".proto"));
        assert!(!is_valid_filename(&[0xC3, 0xA9]));
    }

    #[test]
    fn test_probe_finds_tag_byte() {
        let data = embedded_name(b"\x00\x0A\x0Az", b"foo.proto", &[0xFF; 8]);
        let image = MemoryImage::new(&data);
        let tag_offset = 4;
        let anchor = (tag_offset + 2 + 3) as u64;
        assert_eq!(&data[anchor as usize..anchor as usize + 6], b".proto");

        let candidate = Scanner::new().probe(&image, anchor).unwrap();
        assert_eq!(candidate.window.start, tag_offset as u64);
        assert_eq!(candidate.name_len, 9);
        assert_eq!(candidate.anchor, anchor);
        // Walk stops at the 0xFF noise right after the name
        assert_eq!(candidate.probable_size, 10);
        assert_eq!(candidate.window.len, data.len() - tag_offset);
    }

    #[test]
    fn test_probe_rejects_other_offsets() {
        let data = embedded_name(b"", b"foo.proto", b"");
        let image = MemoryImage::new(&data);
        let anchor: usize = 5;

        for j in 0..DEFAULT_BACKWARD_WINDOW {
            let Some(start) = anchor.checked_sub(j + 1) else {
                break;
            };
            let block = image.read(start as u64, MAX_PROTOBUF_SIZE);
            let accepted = matches!(check_name_field(&block, j + 5), Ok(true));
            assert_eq!(accepted, start == 0, "offset {}", j);
        }
    }

    #[test]
    fn test_probe_rejects_bad_charset() {
        let data = embedded_name(b"", b"f o.proto", b"");
        let image = MemoryImage::new(&data);
        let result = Scanner::new().probe(&image, 5);
        assert!(matches!(result, Err(Error::BoundaryNotFound { .. })));
    }

    #[test]
    fn test_probe_near_start_of_space() {
        // Anchor with nothing before it
        let image = MemoryImage::with_base(0x1000, b".proto");
        assert!(Scanner::new().probe(&image, 0x1000).is_err());
    }

    #[test]
    fn test_candidates_skip_stray_anchors() {
        let mut data = b"stray .proto text ".to_vec();
        data.extend(embedded_name(b"", b"a/b.proto", &[0xFF; 4]));
        data.extend_from_slice(b" another.proto ");
        data.extend(embedded_name(b"", b"c.proto", &[0xFF; 4]));
        let image = MemoryImage::with_base(0x8000, &data);

        let candidates = Scanner::new().scan(&image);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].window.start, 0x8000 + 18);
        assert_eq!(candidates[0].name_len, 9);
        assert_eq!(candidates[1].name_len, 7);
    }

    #[test]
    fn test_max_results() {
        let mut data = embedded_name(b"", b"a.proto", &[0xFF]);
        data.extend(embedded_name(b"", b"b.proto", &[0xFF]));
        let image = MemoryImage::new(&data);

        let scanner = Scanner::with_config(ScannerConfig::new().max_results(1));
        assert_eq!(scanner.scan(&image).len(), 1);
        assert_eq!(Scanner::new().scan(&image).len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let image = MemoryImage::new(&[]);
        assert!(Scanner::new().scan(&image).is_empty());
    }
}
