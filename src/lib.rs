//! Robust, DCT-based image fingerprints.
//!
//! A fingerprint is computed by shrinking an image to an `N x N` grayscale grid, running a
//! 2D DCT-II over it and keeping the lowest `M x M` frequencies. Every coefficient except the DC
//! term becomes one bit: `1` if it is above the mean of those coefficients, `0` otherwise.
//! Visually similar images yield fingerprints with a small Hamming distance.
//!
//! On top of that, [`batch`] compares every pair in a collection of images and [`scan`] walks
//! a video frame by frame looking for scene cuts.
//!
//! ### Example
//! Hash two images, then compute their distance.
//!
//! ```no_run
//! use robust_hash::HasherConfig;
//!
//! let image1 = image::open("image1.png").unwrap();
//! let image2 = image::open("image2.png").unwrap();
//!
//! // 32x32 grid, 8x8 low-frequency block: 63-bit fingerprints
//! let hasher = HasherConfig::new().to_hasher();
//!
//! let hash1 = hasher.hash_image(&image1).unwrap();
//! let hash2 = hasher.hash_image(&image2).unwrap();
//!
//! println!("Image1 hash: {}", hash1);
//! println!("Image2 hash: {}", hash2.to_base64());
//!
//! println!("Hamming distance: {}", hash1.dist(&hash2));
//! ```
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use image::imageops::FilterType;
use image::DynamicImage;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod columns;
pub mod dct;
mod error;
mod traits;

pub mod batch;
#[doc(hidden)]
pub mod cli;
pub mod scan;
pub mod video;

pub use crate::dct::{Coefficients, DctBlock, ImageBlock, OutputSize};
pub use crate::error::{DecodeError, Error};
pub use crate::traits::ImageSource;

use crate::traits::{hamming, BitsToWords};

/// Side length of the grayscale grid the DCT runs over.
pub const DEFAULT_GRID_SIZE: u32 = 32;

/// Side length of the low-frequency block that is encoded into bits.
pub const DEFAULT_HASH_SIZE: u32 = 8;

/// Largest grid size accepted by [`HasherConfig::validate()`].
pub const MAX_GRID_SIZE: u32 = 1024;

/// Coefficients within this margin of the mean count as ties and encode `0`.
///
/// Exact arithmetic gives zero for the AC terms of a flat grid; floating-point cosine sums leave
/// residues around `1e-12` instead.
pub const FLOAT_EQ_MARGIN: f64 = 1e-6;

/// Start here. Create and configure a [`Hasher`].
///
/// Only one `Hasher` needs to be built per configuration; it is cheap to clone and can be shared
/// between threads.
#[derive(Clone, Debug, PartialEq)]
pub struct HasherConfig {
    grid_size: u32,
    hash_size: u32,
    resize_filter: FilterType,
}

impl HasherConfig {
    /// Construct a new config with the default values:
    ///
    /// * `grid_size`: `32` (see [`DEFAULT_GRID_SIZE`])
    /// * `hash_size`: `8` (see [`DEFAULT_HASH_SIZE`])
    /// * `resize_filter`: `FilterType::Triangle`
    pub fn new() -> Self {
        HasherConfig {
            grid_size: DEFAULT_GRID_SIZE,
            hash_size: DEFAULT_HASH_SIZE,
            resize_filter: FilterType::Triangle,
        }
    }

    /// Set the side length `N` of the grid images are resized to before the DCT.
    pub fn grid_size(self, grid_size: u32) -> Self {
        HasherConfig { grid_size, ..self }
    }

    /// Set the side length `M` of the low-frequency block.
    ///
    /// Fingerprints will be `M * M - 1` bits long.
    pub fn hash_size(self, hash_size: u32) -> Self {
        HasherConfig { hash_size, ..self }
    }

    /// Set the filter used when resizing images to the grid.
    pub fn resize_filter(self, resize_filter: FilterType) -> Self {
        HasherConfig {
            resize_filter,
            ..self
        }
    }

    /// Check that `2 <= hash_size <= grid_size <= MAX_GRID_SIZE`.
    pub fn validate(&self) -> Result<(), Error> {
        if self.hash_size < 2 {
            return Err(Error::Config(format!(
                "hash size must be at least 2, got {}",
                self.hash_size
            )));
        }

        if self.hash_size > self.grid_size {
            return Err(Error::Config(format!(
                "hash size {} exceeds grid size {}",
                self.hash_size, self.grid_size
            )));
        }

        if self.grid_size > MAX_GRID_SIZE {
            return Err(Error::Config(format!(
                "grid size {} exceeds the maximum of {}",
                self.grid_size, MAX_GRID_SIZE
            )));
        }

        Ok(())
    }

    /// Validate this config, then precompute the DCT tables and create a `Hasher`.
    pub fn try_to_hasher(&self) -> Result<Hasher, Error> {
        self.validate()?;

        log::debug!(
            "precomputing {0}x{0} DCT coefficient table",
            self.grid_size
        );

        Ok(Hasher {
            coeffs: Arc::new(Coefficients::precompute(self.grid_size as usize)),
            hash_size: self.hash_size,
            resize_filter: self.resize_filter,
        })
    }

    /// Create a `Hasher` from this config.
    ///
    /// ## Panics
    /// If the config is invalid; see [`validate()`](Self::validate).
    pub fn to_hasher(&self) -> Hasher {
        match self.try_to_hasher() {
            Ok(hasher) => hasher,
            Err(e) => panic!("{}", e),
        }
    }
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates fingerprints. Create one with [`HasherConfig`].
///
/// Holds the precomputed DCT tables behind an `Arc`, so clones share them.
#[derive(Clone, Debug)]
pub struct Hasher {
    coeffs: Arc<Coefficients>,
    hash_size: u32,
    resize_filter: FilterType,
}

impl Hasher {
    /// The side length of the grid images are resized to.
    pub fn grid_size(&self) -> u32 {
        self.coeffs.size() as u32
    }

    /// The side length of the low-frequency block.
    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    /// The number of bits in every fingerprint this hasher produces.
    pub fn bit_len(&self) -> usize {
        let size = self.hash_size as usize;
        size * size - 1
    }

    /// The shared DCT tables.
    pub fn coefficients(&self) -> &Coefficients {
        &self.coeffs
    }

    /// Run the DCT over `block`, keeping only the low-frequency corner.
    ///
    /// ## Panics
    /// If `block` is not `grid_size x grid_size`.
    pub fn transform(&self, block: &ImageBlock) -> DctBlock {
        dct::transform(
            block,
            &self.coeffs,
            OutputSize::LowFrequency(self.hash_size as usize),
        )
    }

    /// Fingerprint a prepared grid.
    ///
    /// ## Panics
    /// If `block` is not `grid_size x grid_size`.
    pub fn hash_block(&self, block: &ImageBlock) -> Fingerprint {
        Fingerprint::encode(&self.transform(block))
    }

    /// Fingerprint a decoded image.
    pub fn hash_image(&self, image: &DynamicImage) -> Result<Fingerprint, Error> {
        self.hash_source(image)
    }

    /// Load `source`, reduce it to the grid and fingerprint it.
    pub fn hash_source<S: ImageSource + ?Sized>(&self, source: &S) -> Result<Fingerprint, Error> {
        let block = source.to_block(self.grid_size(), self.resize_filter)?;
        Ok(self.hash_block(&block))
    }
}

/// A fixed-length bit sequence summarizing the coarse structure of an image.
///
/// Bits are stored packed into `u32` words, most significant bit first; word `k` holds bits
/// `32k .. 32k + 32` and a short final word is right-aligned. The same bits are available as a
/// string of `'0'` and `'1'` through [`to_bit_string()`](Self::to_bit_string) or `Display`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    words: Box<[u32]>,
    len: usize,
}

impl Fingerprint {
    /// Encode a DCT block.
    ///
    /// Every coefficient except the DC term at `(0, 0)` is compared, in row-major order, against
    /// the mean of those same coefficients. A bit is `1` only if the coefficient is greater than
    /// the mean by more than [`FLOAT_EQ_MARGIN`].
    ///
    /// ## Panics
    /// If the block has only the DC term.
    pub fn encode(block: &DctBlock) -> Fingerprint {
        let ac = &block.as_slice()[1..];
        assert!(!ac.is_empty(), "a DCT block must have at least one AC coefficient");

        let mean = ac.iter().sum::<f64>() / ac.len() as f64;

        Fingerprint::from_bits(ac.iter().map(|&coeff| coeff - mean > FLOAT_EQ_MARGIN))
    }

    /// Collect a fingerprint from bits in order.
    pub fn from_bits<I: IntoIterator<Item = bool>>(bits: I) -> Fingerprint {
        let mut len = 0;
        let words = BitsToWords {
            iter: bits.into_iter(),
        }
        .map(|(word, count)| {
            len += count;
            word
        })
        .collect();

        Fingerprint { words, len }
    }

    /// Rebuild a fingerprint of `len` bits from its packed words.
    pub fn from_words(len: usize, words: &[u32]) -> Result<Fingerprint, DecodeError> {
        if words.len() != word_count(len) {
            return Err(DecodeError::Malformed("word count does not match bit length"));
        }

        let tail = len % 32;
        if tail != 0 && words[words.len() - 1] >> tail != 0 {
            return Err(DecodeError::Malformed("bits set beyond the fingerprint length"));
        }

        Ok(Fingerprint {
            words: words.into(),
            len,
        })
    }

    /// Parse a string of `'0'` and `'1'`.
    pub fn from_bit_string(bits: &str) -> Result<Fingerprint, DecodeError> {
        let bits = bits
            .chars()
            .enumerate()
            .map(|(index, character)| match character {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(DecodeError::InvalidCharacter { index, character }),
            })
            .collect::<Result<Vec<bool>, _>>()?;

        Ok(Fingerprint::from_bits(bits))
    }

    /// The number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if this fingerprint has no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packed words.
    pub fn as_words(&self) -> &[u32] {
        &self.words
    }

    /// The bit at `idx`.
    ///
    /// ## Panics
    /// If `idx >= self.len()`.
    pub fn bit(&self, idx: usize) -> bool {
        assert!(idx < self.len, "bit {} out of range for {}-bit fingerprint", idx, self.len);

        let word = idx / 32;
        let bits_in_word = (self.len - word * 32).min(32);
        let shift = bits_in_word - 1 - idx % 32;

        (self.words[word] >> shift) & 1 == 1
    }

    /// Iterate over the bits in order.
    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |idx| self.bit(idx))
    }

    /// The bits as a string of `'0'` and `'1'`.
    pub fn to_bit_string(&self) -> String {
        self.bits().map(|bit| if bit { '1' } else { '0' }).collect()
    }

    /// Calculate the Hamming distance between this and `other`.
    ///
    /// Counts the set bits of the XOR of the two fingerprints with a byte lookup table.
    ///
    /// ## Panics
    /// If `self` and `other` have different lengths.
    pub fn dist(&self, other: &Fingerprint) -> u32 {
        assert_eq!(
            self.len, other.len,
            "fingerprints must be the same length to be compared"
        );

        hamming(&self.words, &other.words)
    }

    /// Calculate the Hamming distance between `self` and `other`,
    /// then normalize it to `[0, 1]`, as a fraction of the total bits.
    ///
    /// ## Panics
    /// If `self` and `other` have different lengths.
    pub fn dist_ratio(&self, other: &Fingerprint) -> f32 {
        if self.len == 0 {
            return self.dist(other) as f32;
        }

        self.dist(other) as f32 / self.len as f32
    }

    /// Get a Base64 string of the bit length followed by the packed words, all big-endian.
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(4 + self.words.len() * 4);
        bytes.extend_from_slice(&(self.len as u32).to_be_bytes());
        for word in self.words.iter() {
            bytes.extend_from_slice(&word.to_be_bytes());
        }

        STANDARD.encode(bytes)
    }

    /// Parse a string produced by [`to_base64()`](Self::to_base64).
    pub fn from_base64(encoded: &str) -> Result<Fingerprint, DecodeError> {
        let bytes = STANDARD.decode(encoded)?;

        if bytes.len() < 4 || bytes.len() % 4 != 0 {
            return Err(DecodeError::Malformed("byte length is not a whole number of words"));
        }

        let (header, body) = bytes.split_at(4);
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > body.len() * 8 {
            return Err(DecodeError::Malformed("bit length exceeds the encoded words"));
        }

        let words: Vec<u32> = body
            .chunks_exact(4)
            .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
            .collect();

        Fingerprint::from_words(len, &words)
    }
}

fn word_count(bits: usize) -> usize {
    bits.div_ceil(32)
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl FromStr for Fingerprint {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::from_bit_string(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_bit_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        Fingerprint::from_bit_string(&bits).map_err(serde::de::Error::custom)
    }
}
