//! Address space abstraction.
//!
//! The scanner never touches a binary directly; it goes through
//! [`AddressSpace`], which offers the two primitives a disassembler host
//! usually provides: a masked byte-pattern search and a clipped read.
//! [`MemoryImage`] implements both over a byte slice that is mapped at a
//! chosen base address.

use memchr::memmem;
use std::borrow::Cow;

/// An immutable view `(start, len)` over an address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteWindow {
    /// First address of the window
    pub start: u64,
    /// Number of bytes covered
    pub len: usize,
}

impl ByteWindow {
    /// Creates a new window
    pub fn new(start: u64, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last address of the window
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.len as u64)
    }
}

/// A literal byte pattern with an optional per-byte mask
///
/// A mask byte of `0xFF` requires an exact match, `0x00` matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytePattern {
    bytes: Vec<u8>,
    mask: Option<Vec<u8>>,
}

impl BytePattern {
    /// Creates a pattern that must match exactly
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            mask: None,
        }
    }

    /// Creates a masked pattern. Returns `None` if the lengths differ.
    pub fn masked(bytes: impl Into<Vec<u8>>, mask: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        let mask = mask.into();
        if bytes.len() != mask.len() {
            return None;
        }
        // An all-ones mask is just a literal
        if mask.iter().all(|&m| m == 0xFF) {
            return Some(Self::literal(bytes));
        }
        Some(Self {
            bytes,
            mask: Some(mask),
        })
    }

    /// Pattern bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Pattern length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the pattern is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn matches_at(&self, window: &[u8]) -> bool {
        match &self.mask {
            None => window == self.bytes.as_slice(),
            Some(mask) => window
                .iter()
                .zip(&self.bytes)
                .zip(mask)
                .all(|((&b, &p), &m)| b & m == p & m),
        }
    }
}

/// Search and read access to a scanned address space
pub trait AddressSpace {
    /// First mapped address
    fn start(&self) -> u64;

    /// One past the last mapped address
    fn end(&self) -> u64;

    /// Returns the first address in `[start, end)` where `pattern` matches
    /// and the address is a multiple of `alignment`.
    fn search(&self, start: u64, end: u64, pattern: &BytePattern, alignment: u64) -> Option<u64>;

    /// Reads up to `len` bytes at `address`, clipped at the end of mapped
    /// memory. Unmapped addresses yield an empty view.
    fn read(&self, address: u64, len: usize) -> Cow<'_, [u8]>;
}

/// A byte image mapped at a base address
#[derive(Debug, Clone, Copy)]
pub struct MemoryImage<'a> {
    base: u64,
    data: &'a [u8],
}

impl<'a> MemoryImage<'a> {
    /// Maps `data` at address 0
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(0, data)
    }

    /// Maps `data` at `base`
    pub fn with_base(base: u64, data: &'a [u8]) -> Self {
        Self { base, data }
    }

    /// The underlying bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    fn offset_of(&self, address: u64) -> Option<usize> {
        let offset = address.checked_sub(self.base)?;
        let offset = usize::try_from(offset).ok()?;
        (offset <= self.data.len()).then_some(offset)
    }
}

impl AddressSpace for MemoryImage<'_> {
    fn start(&self) -> u64 {
        self.base
    }

    fn end(&self) -> u64 {
        self.base.saturating_add(self.data.len() as u64)
    }

    fn search(&self, start: u64, end: u64, pattern: &BytePattern, alignment: u64) -> Option<u64> {
        if pattern.is_empty() {
            return None;
        }
        let from = self.offset_of(start.max(self.base))?;
        let to = self.offset_of(end.min(AddressSpace::end(self)))?;
        if from >= to {
            return None;
        }

        let hay = &self.data[from..to];
        let alignment = alignment.max(1);
        let aligned = |pos: usize| (self.base + (from + pos) as u64) % alignment == 0;

        let found = match &pattern.mask {
            None => {
                let finder = memmem::Finder::new(pattern.bytes());
                finder.find_iter(hay).find(|&pos| aligned(pos))
            }
            Some(_) => hay
                .windows(pattern.len())
                .enumerate()
                .find(|&(pos, window)| aligned(pos) && pattern.matches_at(window))
                .map(|(pos, _)| pos),
        };

        found.map(|pos| self.base + (from + pos) as u64)
    }

    fn read(&self, address: u64, len: usize) -> Cow<'_, [u8]> {
        let Some(offset) = self.offset_of(address) else {
            return Cow::Borrowed(&[]);
        };
        let end = offset.saturating_add(len).min(self.data.len());
        Cow::Borrowed(&self.data[offset..end])
    }
}
