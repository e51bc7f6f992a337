//! Authoritative descriptor decoding.
//!
//! A candidate only carries a heuristic upper bound on its length. The
//! decoder tries prefixes of decreasing length against the real
//! `FileDescriptorProto` schema until one parses and names a file. Any
//! trailing noise past the true end makes `prost` reject the prefix, and so
//! does a prefix that cuts a field in half, so the first prefix that decodes
//! is the real serialization.

use crate::descriptor::FileDescriptor;
use crate::error::{Error, Result};
use crate::memory::{AddressSpace, ByteWindow};
use crate::scanner::Candidate;
use prost::Message;
use prost_types::FileDescriptorProto;
use tracing::{debug, trace};

/// A successfully decoded candidate
#[derive(Debug, Clone)]
pub struct DecodedDescriptor {
    /// The decoded tree
    pub descriptor: FileDescriptor,
    /// The exact bytes that were decoded
    pub window: ByteWindow,
}

impl DecodedDescriptor {
    /// Descriptor file name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Trial decoder for candidate descriptors
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorDecoder;

impl DescriptorDecoder {
    /// Creates a new decoder
    pub fn new() -> Self {
        Self
    }

    /// Finds the longest prefix of `data`, at most `upper_bound` bytes, that
    /// decodes as a named `FileDescriptorProto`.
    ///
    /// Returns the decoded message and the prefix length.
    pub fn decode_prefix(
        &self,
        data: &[u8],
        upper_bound: usize,
    ) -> Option<(FileDescriptorProto, usize)> {
        let upper_bound = upper_bound.min(data.len());

        for k in (1..=upper_bound).rev() {
            match decode_one(&data[..k]) {
                Ok(proto) if !proto.name().is_empty() => return Some((proto, k)),
                Ok(_) => trace!("Prefix of {} bytes decodes without a name", k),
                Err(e) => trace!("Prefix of {} bytes rejected: {}", k, e),
            }
        }

        None
    }

    /// Decodes bytes at a known start address
    pub fn decode_at(&self, start: u64, data: &[u8], upper_bound: usize) -> Result<DecodedDescriptor> {
        let (proto, len) = self
            .decode_prefix(data, upper_bound)
            .ok_or(Error::DecodeExhausted { start, upper_bound })?;

        debug!("Decoded '{}' at {:#x} ({} bytes)", proto.name(), start, len);

        Ok(DecodedDescriptor {
            descriptor: FileDescriptor::from(&proto),
            window: ByteWindow::new(start, len),
        })
    }

    /// Reads and decodes a located candidate
    pub fn decode_candidate(
        &self,
        space: &dyn AddressSpace,
        candidate: &Candidate,
    ) -> Result<DecodedDescriptor> {
        let block = space.read(candidate.window.start, candidate.window.len);
        self.decode_at(candidate.window.start, &block, candidate.window.len)
    }
}

fn decode_one(data: &[u8]) -> Result<FileDescriptorProto> {
    Ok(FileDescriptorProto::decode(data)?)
}
