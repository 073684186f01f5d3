//! Scene-cut detection over an ordered stream of video frames.
//!
//! [`FrameScanner`] is the state machine: it keeps the fingerprints of the last two frames and
//! flags each adjacent pair whose distance meets a [`Threshold`]. [`scan()`] drives it from a
//! frame iterator, hashing a bounded window of frames in parallel and feeding the results to
//! the scanner in stream order.
use image::DynamicImage;
use rayon::prelude::*;

use std::mem;

use crate::video::Frame;
use crate::{Error, Fingerprint, Hasher};

/// The default distance at which [`Threshold::AtLeast`] reports a scene change.
pub const DEFAULT_SCENE_THRESHOLD: u32 = 20;

/// The default number of decoded frames hashed ahead of the comparison step.
pub const DEFAULT_LOOKAHEAD: usize = 16;

/// When a distance between adjacent frames counts as a scene change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Threshold {
    /// Distance greater than or equal to the value.
    AtLeast(u32),
    /// Distance exactly equal to the value.
    Exactly(u32),
}

impl Threshold {
    /// `true` if `distance` meets this threshold.
    pub fn is_met(self, distance: u32) -> bool {
        match self {
            Threshold::AtLeast(min) => distance >= min,
            Threshold::Exactly(value) => distance == value,
        }
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Threshold::AtLeast(DEFAULT_SCENE_THRESHOLD)
    }
}

/// Settings for [`scan()`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanConfig {
    pub threshold: Threshold,
    /// The maximum number of decoded frames held while waiting to be hashed and compared.
    pub lookahead: usize,
}

impl ScanConfig {
    pub fn new() -> Self {
        ScanConfig {
            threshold: Threshold::default(),
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }

    pub fn threshold(self, threshold: Threshold) -> Self {
        ScanConfig { threshold, ..self }
    }

    /// Values below 1 are treated as 1.
    pub fn lookahead(self, lookahead: usize) -> Self {
        ScanConfig {
            lookahead: lookahead.max(1),
            ..self
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A detected transition between two adjacent frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneChange {
    /// Index of the last frame before the cut.
    pub previous: u64,
    /// Index of the first frame after the cut.
    pub current: u64,
    pub distance: u32,
}

/// Where a [`FrameScanner`] is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    AwaitingFirstFrame,
    Scanning,
    /// The stream ended after this many frames.
    Done { frames: u64 },
    /// The stream could not be read to the end.
    Failed,
}

/// A hashed frame held in the sliding window.
#[derive(Clone, Debug)]
pub struct Slot<P> {
    pub index: u64,
    pub fingerprint: Fingerprint,
    pub payload: P,
}

/// Compares each frame's fingerprint with the one before it.
///
/// Holds a two-slot window; `P` is whatever should be kept alongside each fingerprint (the
/// decoded image, for writing out cut frames, or `()`).
#[derive(Debug)]
pub struct FrameScanner<P = ()> {
    threshold: Threshold,
    state: ScanState,
    window: [Option<Slot<P>>; 2],
    /// Position of the most recent frame in `window`.
    newest: usize,
    frames: u64,
    comparisons: u64,
}

impl<P> FrameScanner<P> {
    pub fn new(threshold: Threshold) -> Self {
        FrameScanner {
            threshold,
            state: ScanState::AwaitingFirstFrame,
            window: [None, None],
            newest: 0,
            frames: 0,
            comparisons: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Frames pushed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Adjacent pairs compared so far; one less than `frames()` once scanning.
    pub fn comparisons(&self) -> u64 {
        self.comparisons
    }

    /// The older and newer frame of the window, once two frames have been pushed.
    pub fn window(&self) -> Option<(&Slot<P>, &Slot<P>)> {
        match (&self.window[1 - self.newest], &self.window[self.newest]) {
            (Some(previous), Some(current)) => Some((previous, current)),
            _ => None,
        }
    }

    /// Feed the next frame in stream order.
    ///
    /// The first frame only fills the window. Every later frame is compared with the one before
    /// it, and the comparison is returned if it meets the threshold. The oldest slot is dropped.
    ///
    /// ## Panics
    /// If the scanner is already `Done` or `Failed`, or the fingerprint length changes mid-stream.
    pub fn push(
        &mut self,
        index: u64,
        fingerprint: Fingerprint,
        payload: P,
    ) -> Option<SceneChange> {
        let slot = Slot {
            index,
            fingerprint,
            payload,
        };
        self.frames += 1;

        match self.state {
            ScanState::AwaitingFirstFrame => {
                self.window[self.newest] = Some(slot);
                self.state = ScanState::Scanning;
                None
            }
            ScanState::Scanning => {
                let oldest = 1 - self.newest;
                self.window[oldest] = Some(slot);
                self.newest = oldest;

                let (previous, current) = self.window()?;
                let distance = previous.fingerprint.dist(&current.fingerprint);
                let change = SceneChange {
                    previous: previous.index,
                    current: current.index,
                    distance,
                };
                self.comparisons += 1;

                log::debug!(
                    "frames {} -> {}: distance {}",
                    change.previous,
                    change.current,
                    distance
                );

                self.threshold.is_met(distance).then_some(change)
            }
            ScanState::Done { .. } | ScanState::Failed => {
                panic!("frame pushed to a finished scanner ({:?})", self.state)
            }
        }
    }

    /// Mark the stream as exhausted and release the window. Returns the number of frames seen.
    pub fn finish(&mut self) -> u64 {
        self.window = [None, None];
        self.state = ScanState::Done {
            frames: self.frames,
        };
        self.frames
    }

    /// Mark the stream as unreadable and release the window.
    pub fn fail(&mut self) {
        self.window = [None, None];
        self.state = ScanState::Failed;
    }
}

/// The outcome of a complete scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub frames: u64,
    pub comparisons: u64,
    pub events: Vec<SceneChange>,
}

/// A scan that stopped early. `partial` holds everything found before the failure.
#[derive(Debug, thiserror::Error)]
#[error("scan stopped after {} frames: {error}", .partial.frames)]
pub struct ScanFailure {
    #[source]
    pub error: Error,
    pub partial: ScanSummary,
}

/// Scan `frames` for scene changes, calling `on_change` with both frames of every cut.
///
/// Up to `config.lookahead` decoded frames are read, hashed in parallel and then compared in
/// stream order, so no frame is hashed twice and memory stays bounded. An error from the frame
/// source, from hashing a frame, or from `on_change` stops the scan.
pub fn scan<I, F>(
    hasher: &Hasher,
    frames: I,
    config: &ScanConfig,
    mut on_change: F,
) -> Result<ScanSummary, ScanFailure>
where
    I: IntoIterator<Item = Result<Frame, Error>>,
    F: FnMut(&SceneChange, &DynamicImage, &DynamicImage) -> Result<(), Error>,
{
    let mut frames = frames.into_iter();
    let mut scanner = FrameScanner::<DynamicImage>::new(config.threshold);
    let mut events = Vec::new();
    let lookahead = config.lookahead.max(1);

    let mut pending = Vec::with_capacity(lookahead);

    loop {
        let mut stream_error = None;

        while pending.len() < lookahead {
            match frames.next() {
                Some(Ok(frame)) => pending.push(frame),
                Some(Err(e)) => {
                    stream_error = Some(e);
                    break;
                }
                None => break,
            }
        }

        if pending.is_empty() && stream_error.is_none() {
            break;
        }

        let hashed: Vec<(Frame, Result<Fingerprint, Error>)> = mem::take(&mut pending)
            .into_par_iter()
            .map(|frame| {
                let hash = hasher.hash_image(&frame.image);
                (frame, hash)
            })
            .collect();

        for (frame, hash) in hashed {
            let result = hash.and_then(|hash| {
                match scanner.push(frame.index, hash, frame.image) {
                    Some(change) => {
                        if let Some((previous, current)) = scanner.window() {
                            on_change(&change, &previous.payload, &current.payload)?;
                        }
                        events.push(change);
                        Ok(())
                    }
                    None => Ok(()),
                }
            });

            if let Err(error) = result {
                return Err(fail(&mut scanner, error, events));
            }
        }

        if let Some(error) = stream_error {
            return Err(fail(&mut scanner, error, events));
        }
    }

    let comparisons = scanner.comparisons();
    let frames = scanner.finish();
    log::info!(
        "scanned {} frames, {} comparisons, {} scene changes",
        frames,
        comparisons,
        events.len()
    );

    Ok(ScanSummary {
        frames,
        comparisons,
        events,
    })
}

fn fail(
    scanner: &mut FrameScanner<DynamicImage>,
    error: Error,
    events: Vec<SceneChange>,
) -> ScanFailure {
    let partial = ScanSummary {
        frames: scanner.frames(),
        comparisons: scanner.comparisons(),
        events,
    };
    scanner.fail();

    log::warn!("scan failed after {} frames: {}", partial.frames, error);

    ScanFailure { error, partial }
}

#[cfg(test)]
mod test {
    use image::{GrayImage, Luma};

    use super::*;
    use crate::HasherConfig;

    fn flat(value: u8) -> Fingerprint {
        HasherConfig::new().to_hasher().hash_block(&crate::ImageBlock::uniform(32, value))
    }

    fn bits(ones: usize) -> Fingerprint {
        Fingerprint::from_bits((0..63).map(|i| i < ones))
    }

    /// Frames alternating between two shots, `run` frames each.
    fn shots(count: u64, run: u64) -> Vec<Result<Frame, Error>> {
        (0..count)
            .map(|index| {
                let image = if (index / run) % 2 == 0 {
                    GrayImage::from_fn(64, 64, |x, _| Luma([if x < 32 { 250 } else { 5 }]))
                } else {
                    GrayImage::from_fn(64, 64, |_, y| Luma([if y < 32 { 250 } else { 5 }]))
                };

                Ok(Frame {
                    index,
                    image: DynamicImage::ImageLuma8(image),
                })
            })
            .collect()
    }

    #[test]
    fn state_transitions() {
        let mut scanner = FrameScanner::new(Threshold::AtLeast(1));
        assert_eq!(scanner.state(), ScanState::AwaitingFirstFrame);

        assert_eq!(scanner.push(0, flat(10), ()), None);
        assert_eq!(scanner.state(), ScanState::Scanning);
        assert!(scanner.window().is_none());

        scanner.push(1, flat(200), ());
        assert_eq!(scanner.comparisons(), 1);
        let (previous, current) = scanner.window().unwrap();
        assert_eq!((previous.index, current.index), (0, 1));

        assert_eq!(scanner.finish(), 2);
        assert_eq!(scanner.state(), ScanState::Done { frames: 2 });
        assert!(scanner.window().is_none());
    }

    #[test]
    fn window_slides_by_one() {
        let mut scanner = FrameScanner::new(Threshold::AtLeast(0));

        scanner.push(0, bits(0), "a");
        let first = scanner.push(1, bits(5), "b").unwrap();
        let second = scanner.push(2, bits(12), "c").unwrap();

        assert_eq!(first, SceneChange { previous: 0, current: 1, distance: 5 });
        assert_eq!(second, SceneChange { previous: 1, current: 2, distance: 7 });

        let (previous, current) = scanner.window().unwrap();
        assert_eq!((previous.payload, current.payload), ("b", "c"));
    }

    #[test]
    fn exact_threshold() {
        let mut scanner = FrameScanner::new(Threshold::Exactly(5));

        scanner.push(0, bits(0), ());
        assert!(scanner.push(1, bits(5), ()).is_some());
        assert!(scanner.push(2, bits(11), ()).is_none());
        assert!(scanner.push(3, bits(16), ()).is_some());
    }

    #[test]
    #[should_panic(expected = "finished scanner")]
    fn push_after_finish_panics() {
        let mut scanner = FrameScanner::new(Threshold::default());
        scanner.push(0, bits(0), ());
        scanner.finish();
        scanner.push(1, bits(0), ());
    }

    #[test]
    fn threshold_zero_flags_every_comparison() {
        let hasher = HasherConfig::new().to_hasher();
        let config = ScanConfig::new().threshold(Threshold::AtLeast(0)).lookahead(3);

        let summary = scan(&hasher, shots(10, 3), &config, |_, _, _| Ok(())).unwrap();

        assert_eq!(summary.frames, 10);
        assert_eq!(summary.comparisons, 9);
        assert_eq!(summary.events.len(), 9);
        for (i, event) in summary.events.iter().enumerate() {
            assert_eq!((event.previous, event.current), (i as u64, i as u64 + 1));
        }
    }

    #[test]
    fn unreachable_threshold_flags_nothing() {
        let hasher = HasherConfig::new().to_hasher();
        let config = ScanConfig::new().threshold(Threshold::AtLeast(64));

        let summary = scan(&hasher, shots(10, 3), &config, |_, _, _| Ok(())).unwrap();

        assert_eq!(summary.comparisons, 9);
        assert!(summary.events.is_empty());
    }

    #[test]
    fn cuts_are_found_between_shots() {
        let hasher = HasherConfig::new().to_hasher();
        let config = ScanConfig::new().threshold(Threshold::AtLeast(1)).lookahead(4);
        let mut seen = Vec::new();

        let summary = scan(&hasher, shots(12, 4), &config, |change, previous, current| {
            assert_ne!(previous, current);
            seen.push(change.current);
            Ok(())
        })
        .unwrap();

        let cuts: Vec<u64> = summary.events.iter().map(|e| e.current).collect();
        assert_eq!(cuts, vec![4, 8]);
        assert_eq!(seen, cuts);
    }

    #[test]
    fn stream_error_keeps_earlier_events() {
        let hasher = HasherConfig::new().to_hasher();
        let config = ScanConfig::new().threshold(Threshold::AtLeast(1)).lookahead(2);

        let mut frames = shots(6, 3);
        frames.push(Err(Error::video("test.mp4", "truncated frame")));
        frames.extend(shots(3, 1));

        let failure = scan(&hasher, frames, &config, |_, _, _| Ok(())).unwrap_err();

        assert!(matches!(failure.error, Error::Video { .. }));
        assert_eq!(failure.partial.frames, 6);
        assert_eq!(failure.partial.comparisons, 5);
        assert_eq!(failure.partial.events.len(), 1);
        assert_eq!(failure.partial.events[0].current, 3);
    }

    #[test]
    fn empty_stream() {
        let hasher = HasherConfig::new().to_hasher();
        let frames = Vec::<Result<Frame, Error>>::new();
        let summary = scan(&hasher, frames, &ScanConfig::new(), |_, _, _| Ok(())).unwrap();

        assert_eq!(summary, ScanSummary::default());
    }
}
