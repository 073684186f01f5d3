use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageError};

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::dct::ImageBlock;
use crate::error::Error;

/// Something that can produce a square grayscale [`ImageBlock`] for hashing.
///
/// Implemented for file paths (decoded with `image::open()`), decoded `DynamicImage`s and
/// already-prepared `ImageBlock`s.
pub trait ImageSource {
    /// A human-readable name for this source, used in error messages and logs.
    fn describe(&self) -> Cow<'_, str>;

    /// Grayscale and resize this source to a `size x size` grid.
    ///
    /// Only single-channel grayscale and 3-channel color sources are accepted; anything else
    /// is an [`Error::UnsupportedFormat`].
    fn to_block(&self, size: u32, filter: FilterType) -> Result<ImageBlock, Error>;
}

impl<T: ImageSource + ?Sized> ImageSource for &T {
    fn describe(&self) -> Cow<'_, str> {
        (**self).describe()
    }

    fn to_block(&self, size: u32, filter: FilterType) -> Result<ImageBlock, Error> {
        (**self).to_block(size, filter)
    }
}

impl ImageSource for Path {
    fn describe(&self) -> Cow<'_, str> {
        self.to_string_lossy()
    }

    fn to_block(&self, size: u32, filter: FilterType) -> Result<ImageBlock, Error> {
        let subject = || self.display().to_string();
        let image = image::open(self).map_err(|err| match err {
            ImageError::IoError(source) => Error::Io {
                subject: subject(),
                source,
            },
            source => Error::Decode {
                subject: subject(),
                source,
            },
        })?;

        prepare_image(&image, &self.describe(), size, filter)
    }
}

impl ImageSource for PathBuf {
    fn describe(&self) -> Cow<'_, str> {
        self.as_path().describe()
    }

    fn to_block(&self, size: u32, filter: FilterType) -> Result<ImageBlock, Error> {
        self.as_path().to_block(size, filter)
    }
}

impl ImageSource for DynamicImage {
    fn describe(&self) -> Cow<'_, str> {
        let (width, height) = self.dimensions();
        Cow::Owned(format!("<{}x{} image>", width, height))
    }

    fn to_block(&self, size: u32, filter: FilterType) -> Result<ImageBlock, Error> {
        prepare_image(self, &self.describe(), size, filter)
    }
}

impl ImageSource for ImageBlock {
    fn describe(&self) -> Cow<'_, str> {
        Cow::Owned(format!("<{0}x{0} block>", self.size()))
    }

    /// Prepared blocks are passed through untouched, so `size` must already match.
    fn to_block(&self, size: u32, _filter: FilterType) -> Result<ImageBlock, Error> {
        if self.size() != size as usize {
            return Err(Error::Config(format!(
                "{} cannot be used with a {1}x{1} grid",
                self.describe(),
                size
            )));
        }

        Ok(self.clone())
    }
}

/// Check the channel layout, then grayscale and resize to `size x size`.
pub(crate) fn prepare_image(
    image: &DynamicImage,
    subject: &str,
    size: u32,
    filter: FilterType,
) -> Result<ImageBlock, Error> {
    let channels = image.color().channel_count();
    if channels != 1 && channels != 3 {
        return Err(Error::UnsupportedFormat {
            subject: subject.to_owned(),
            channels,
        });
    }

    let gray = image.to_luma8();
    let resized = if gray.dimensions() == (size, size) {
        gray
    } else {
        imageops::resize(&gray, size, size, filter)
    };

    ImageBlock::from_raw(size as usize, resized.into_raw())
        .ok_or_else(|| Error::Config(format!("cannot build a {0}x{0} grid", size)))
}

/// Population count of every byte value.
pub(crate) static POPCOUNT: [u8; 256] = popcount_table();

const fn popcount_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 1;

    while i < 256 {
        table[i] = (i & 1) as u8 + table[i >> 1];
        i += 1;
    }

    table
}

/// Hamming distance between two packed bit sequences.
///
/// XORs word by word and sums the table popcount of all four bytes of each word.
pub(crate) fn hamming(left: &[u32], right: &[u32]) -> u32 {
    left.iter()
        .zip(right)
        .map(|(l, r)| {
            (l ^ r)
                .to_be_bytes()
                .iter()
                .map(|&byte| POPCOUNT[byte as usize] as u32)
                .sum::<u32>()
        })
        .sum()
}

/// Packs bits into `u32` words, MSB-first.
///
/// Each word takes up to 32 bits by shifting left, so a short final word is right-aligned.
pub(crate) struct BitsToWords<I> {
    pub(crate) iter: I,
}

impl<I> Iterator for BitsToWords<I>
where
    I: Iterator<Item = bool>,
{
    type Item = (u32, usize);

    /// Yields the packed word and the number of bits it holds.
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.by_ref().take(32).fold(None, |accum, bit| {
            let (word, count) = accum.unwrap_or((0u32, 0usize));
            Some(((word << 1) | bit as u32, count + 1))
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.iter.size_hint();
        (
            (lower + 31) / 32,
            upper.map(|upper| (upper + 31) / 32),
        )
    }
}
