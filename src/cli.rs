//! Common utilities for the command-line tools
//!
//! NOTE: not considered part of the crate's stable API
#![allow(missing_docs)]

use image::DynamicImage;

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::scan::SceneChange;
use crate::{Error, HasherConfig};

/// Hash settings shared by every tool.
#[derive(Clone, Debug, clap::Args)]
pub struct HashArgs {
    /// Side length of the grayscale grid images are resized to
    #[arg(long, default_value_t = crate::DEFAULT_GRID_SIZE)]
    pub grid_size: u32,

    /// Side length of the low-frequency DCT block (fingerprints have size^2 - 1 bits)
    #[arg(long, default_value_t = crate::DEFAULT_HASH_SIZE)]
    pub hash_size: u32,

    /// Increase log output on stderr (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl HashArgs {
    /// Set up logging and build a validated hasher config.
    pub fn init(&self) -> Result<HasherConfig, Error> {
        init_logging(self.verbose);

        let config = HasherConfig::new()
            .grid_size(self.grid_size)
            .hash_size(self.hash_size);
        config.validate()?;

        Ok(config)
    }
}

/// Install a stderr subscriber. `log` records from the library are forwarded to it.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing_subscriber::filter::LevelFilter::WARN,
        1 => tracing_subscriber::filter::LevelFilter::INFO,
        _ => tracing_subscriber::filter::LevelFilter::DEBUG,
    };

    // a second call (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .try_init();
}

/// Read image paths from a list file, one per line. Blank lines are skipped.
pub fn read_image_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>, Error> {
    let path = path.as_ref();
    let subject = || path.display().to_string();
    let file = File::open(path).map_err(|e| Error::io(subject(), e))?;

    let mut images = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(subject(), e))?;
        let line = line.trim();
        if !line.is_empty() {
            images.push(line.to_owned());
        }
    }

    Ok(images)
}

/// One batch-mode result line: `<pathA> <pathB> <distance>`.
pub fn write_pair_line<W: Write>(
    out: &mut W,
    left: &str,
    right: &str,
    distance: u32,
) -> io::Result<()> {
    writeln!(out, "{} {} {}", left, right, distance)
}

/// The single-pair result line: `<pathA> <pathB> dist = <distance>`.
pub fn format_single(left: &str, right: &str, distance: u32) -> String {
    format!("{} {} dist = {}", left, right, distance)
}

/// Create (or truncate) an output file for writing.
pub fn create_output<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>, Error> {
    let path = path.as_ref();
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| Error::io(path.display().to_string(), e))
}

/// Create the directory scene-cut frames are written to.
pub fn create_output_dir<P: AsRef<Path>>(dir: P) -> Result<(), Error> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|e| Error::io(dir.display().to_string(), e))
}

/// Write both frames of a scene change as `<dir>/<frame>.jpg`.
pub fn save_scene_pair(
    dir: &Path,
    change: &SceneChange,
    previous: &DynamicImage,
    current: &DynamicImage,
) -> Result<(PathBuf, PathBuf), Error> {
    let previous_path = dir.join(format!("{}.jpg", change.previous));
    let current_path = dir.join(format!("{}.jpg", change.current));

    save_jpeg(previous, &previous_path)?;
    save_jpeg(current, &current_path)?;

    Ok((previous_path, current_path))
}

fn save_jpeg(image: &DynamicImage, path: &Path) -> Result<(), Error> {
    // JPEG has no alpha, so normalize to 8-bit RGB first
    DynamicImage::ImageRgb8(image.to_rgb8())
        .save(path)
        .map_err(|source| Error::Decode {
            subject: path.display().to_string(),
            source,
        })
}

/// Overwrite the current stdout line with a progress counter.
pub fn print_progress(label: &str, done: usize, total: Option<usize>) {
    let mut stdout = io::stdout().lock();
    let _ = match total {
        Some(total) => write!(stdout, "\r{} {}/{}", label, done, total),
        None => write!(stdout, "\r{} {}", label, done),
    };
    let _ = stdout.flush();
}

/// End a progress line.
pub fn finish_progress() {
    println!();
}

#[cfg(test)]
mod test {
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn list_file_lines() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, "a.jpg\n\n  b.png \nc.bmp\r\nd.gif").unwrap();

        assert_eq!(read_image_list(&list).unwrap(), vec!["a.jpg", "b.png", "c.bmp", "d.gif"]);
        assert!(matches!(read_image_list(dir.path().join("missing.txt")), Err(Error::Io { .. })));
    }

    #[test]
    fn list_paths_keep_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        fs::write(&list, "photos/my cat.jpg\nb.png\n").unwrap();

        assert_eq!(read_image_list(&list).unwrap(), vec!["photos/my cat.jpg", "b.png"]);
    }

    #[test]
    fn output_formats() {
        let mut out = Vec::new();
        write_pair_line(&mut out, "x/a.jpg", "y/b.jpg", 17).unwrap();
        assert_eq!(out, b"x/a.jpg y/b.jpg 17\n");

        assert_eq!(format_single("a.jpg", "b.jpg", 3), "a.jpg b.jpg dist = 3");
    }

    #[test]
    fn scene_pair_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([9, 9, 9])));
        let change = SceneChange {
            previous: 41,
            current: 42,
            distance: 30,
        };

        let (previous, current) = save_scene_pair(dir.path(), &change, &image, &image).unwrap();

        assert_eq!(previous, dir.path().join("41.jpg"));
        assert_eq!(current, dir.path().join("42.jpg"));
        assert!(previous.is_file() && current.is_file());
    }
}
