//! Sources of decoded video frames, in stream order.
//!
//! Video files are decoded by an `ffmpeg` child process that streams raw RGB frames over a pipe;
//! `ffprobe` is asked for the frame size first. A directory of already-extracted frame images
//! can be read instead.
use image::{DynamicImage, RgbImage};

use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::Error;

/// A decoded frame and its position in the stream, starting at 0.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: u64,
    pub image: DynamicImage,
}

/// Frames from either a video file or a directory of images.
pub enum VideoFrames {
    Ffmpeg(FfmpegFrames),
    Sequence(ImageSequence),
}

impl Iterator for VideoFrames {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            VideoFrames::Ffmpeg(frames) => frames.next(),
            VideoFrames::Sequence(frames) => frames.next(),
        }
    }
}

/// Open `path` for scanning: a directory is read as an image sequence, anything else is
/// decoded with `ffmpeg`.
///
/// Fails before any frame is read if the path does not exist or cannot be probed.
pub fn open_video<P: AsRef<Path>>(path: P) -> Result<VideoFrames, Error> {
    let path = path.as_ref();
    let meta = fs::metadata(path).map_err(|e| Error::io(path.display().to_string(), e))?;

    if meta.is_dir() {
        ImageSequence::open(path).map(VideoFrames::Sequence)
    } else {
        FfmpegFrames::open(path).map(VideoFrames::Ffmpeg)
    }
}

/// Frames decoded by an `ffmpeg` child process.
///
/// Dropping this kills the child and waits for it, so abandoning a scan does not leave a
/// decoder running.
pub struct FfmpegFrames {
    subject: String,
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrames {
    /// Probe the first video stream of `path` and start decoding it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let subject = path.display().to_string();
        let (width, height) = probe_dimensions(path)?;

        log::info!("decoding {} ({}x{}) with ffmpeg", subject, width, height);

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::io("ffmpeg", e))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::video(subject, "ffmpeg stdout was not captured"));
            }
        };

        Ok(FfmpegFrames {
            subject,
            child,
            stdout: BufReader::new(stdout),
            width,
            height,
            next_index: 0,
            finished: false,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, Error> {
        let len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; len];
        let mut filled = 0;

        while filled < len {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(self.subject.clone(), e)),
            }
        }

        if filled == 0 {
            return self.check_exit().map(|_| None);
        }

        if filled < len {
            return Err(Error::video(
                self.subject.clone(),
                format!(
                    "truncated frame {}: got {} of {} bytes",
                    self.next_index, filled, len
                ),
            ));
        }

        Ok(RgbImage::from_raw(self.width, self.height, buf))
    }

    /// At end of stream, turn a failed decoder exit into an error.
    fn check_exit(&mut self) -> Result<(), Error> {
        let status = self
            .child
            .wait()
            .map_err(|e| Error::io(self.subject.clone(), e))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::video(
                self.subject.clone(),
                format!("ffmpeg exited with {}", status),
            ))
        }
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.read_frame();
        match result {
            Ok(Some(image)) => {
                let index = self.next_index;
                self.next_index += 1;
                Some(Ok(Frame {
                    index,
                    image: DynamicImage::ImageRgb8(image),
                }))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        // no-op if the child has already been reaped
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), Error> {
    let subject = path.display().to_string();

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::io("ffprobe", e))?;

    if !output.status.success() {
        return Err(Error::video(
            subject,
            format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| Error::video(subject, "no video stream found"))
}

/// Parse ffprobe's `WIDTHxHEIGHT` output.
fn parse_dimensions(probe: &str) -> Option<(u32, u32)> {
    let line = probe.lines().map(str::trim).find(|line| !line.is_empty())?;
    let (width, height) = line.split_once('x')?;
    let width: u32 = width.trim().parse().ok()?;
    // some containers append a trailing separator
    let height: u32 = height.trim().trim_end_matches('x').parse().ok()?;

    if width == 0 || height == 0 {
        return None;
    }

    Some((width, height))
}

const FRAME_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

/// Frames read from the image files of a directory, in file name order.
///
/// Each image is decoded only when its frame is requested.
pub struct ImageSequence {
    paths: std::vec::IntoIter<PathBuf>,
    next_index: u64,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref();
        let subject = || dir.display().to_string();

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| Error::io(subject(), e))? {
            let path = entry.map_err(|e| Error::io(subject(), e))?.path();

            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| {
                    FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                });

            if is_frame && path.is_file() {
                paths.push(path);
            }
        }

        paths.sort();
        log::info!("found {} frame images in {}", paths.len(), subject());

        Ok(ImageSequence {
            paths: paths.into_iter(),
            next_index: 0,
        })
    }

    /// Frames not yet read.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl Iterator for ImageSequence {
    type Item = Result<Frame, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let index = self.next_index;
        self.next_index += 1;

        Some(
            image::open(&path)
                .map(|image| Frame { index, image })
                .map_err(|source| Error::Decode {
                    subject: path.display().to_string(),
                    source,
                }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

#[cfg(test)]
mod test {
    use image::{GrayImage, Luma};

    use super::*;

    #[test]
    fn parse_probe_output() {
        assert_eq!(parse_dimensions("1920x1080\n"), Some((1920, 1080)));
        assert_eq!(parse_dimensions("\n 640x360x\n"), Some((640, 360)));
        assert_eq!(parse_dimensions(""), None);
        assert_eq!(parse_dimensions("0x0"), None);
        assert_eq!(parse_dimensions("N/A"), None);
    }

    #[test]
    fn missing_video_fails_at_open() {
        assert!(matches!(
            open_video("/no/such/video.mp4"),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn image_sequence_in_name_order() {
        let dir = tempfile::tempdir().unwrap();

        for (name, value) in [("002.png", 2u8), ("000.png", 0), ("001.png", 1)] {
            GrayImage::from_pixel(4, 4, Luma([value]))
                .save(dir.path().join(name))
                .unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let frames = match open_video(dir.path()).unwrap() {
            VideoFrames::Sequence(frames) => frames,
            VideoFrames::Ffmpeg(_) => panic!("a directory should open as an image sequence"),
        };
        assert_eq!(frames.remaining(), 3);

        let frames: Vec<Frame> = frames.collect::<Result<_, _>>().unwrap();
        for (expected, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index, expected as u64);
            assert_eq!(frame.image.to_luma8().get_pixel(0, 0)[0], expected as u8);
        }
    }

    #[test]
    fn unreadable_frame_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("000.png"), "definitely not a png").unwrap();

        let mut frames = ImageSequence::open(dir.path()).unwrap();
        assert!(matches!(frames.next(), Some(Err(Error::Decode { .. }))));
        assert!(frames.next().is_none());
    }
}
