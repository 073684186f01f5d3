//! All-pairs matching over a collection of images.
//!
//! Fingerprints are computed in parallel with `rayon`, collected in input order, and only then
//! compared pair by pair. An image that fails to load is reported on its own and left out of
//! the pairs; it never stops the rest of the batch.
use rayon::prelude::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, Fingerprint, Hasher, ImageSource};

/// The distance between two inputs, by index, with `left < right`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PairDistance {
    pub left: usize,
    pub right: usize,
    pub distance: u32,
}

/// An input that could not be fingerprinted.
#[derive(Debug)]
pub struct ItemFailure {
    pub index: usize,
    pub error: Error,
}

/// Which phase of a batch run a progress report refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Hashing,
    Matching,
}

/// Passed to the progress callback after each unit of work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub done: usize,
    pub total: usize,
}

/// Everything a batch run produced.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One slot per input, in input order; `None` where the input failed.
    pub fingerprints: Vec<Option<Fingerprint>>,
    /// Pair distances ordered by `(left, right)`.
    pub pairs: Vec<PairDistance>,
    /// Inputs that could not be fingerprinted, ordered by index.
    pub failures: Vec<ItemFailure>,
}

type ProgressFn<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Compares every unordered pair of a collection of images exactly once.
pub struct BatchMatcher<'a> {
    hasher: &'a Hasher,
    max_distance: Option<u32>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> BatchMatcher<'a> {
    pub fn new(hasher: &'a Hasher) -> Self {
        BatchMatcher {
            hasher,
            max_distance: None,
            progress: None,
        }
    }

    /// Only report pairs whose distance is at most `max_distance`.
    pub fn max_distance(self, max_distance: u32) -> Self {
        BatchMatcher {
            max_distance: Some(max_distance),
            ..self
        }
    }

    /// Call `progress` as fingerprints are computed and as each row of pairs is matched.
    ///
    /// May be called concurrently from worker threads; it has no effect on the results.
    pub fn on_progress<F>(self, progress: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'a,
    {
        BatchMatcher {
            progress: Some(Box::new(progress)),
            ..self
        }
    }

    /// Fingerprint every source, then compute the distance for every pair `i < j`.
    pub fn run<S: ImageSource + Sync>(&self, sources: &[S]) -> BatchReport {
        let fingerprints = self.hash_all(sources);

        let mut failures = Vec::new();
        let fingerprints: Vec<Option<Fingerprint>> = fingerprints
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(hash) => Some(hash),
                Err(error) => {
                    log::warn!("skipping input {}: {}", index, error);
                    failures.push(ItemFailure { index, error });
                    None
                }
            })
            .collect();

        let pairs = self.match_all(&fingerprints);

        log::info!(
            "matched {} inputs: {} pairs reported, {} failures",
            fingerprints.len(),
            pairs.len(),
            failures.len()
        );

        BatchReport {
            fingerprints,
            pairs,
            failures,
        }
    }

    fn hash_all<S: ImageSource + Sync>(&self, sources: &[S]) -> Vec<Result<Fingerprint, Error>> {
        let total = sources.len();
        let done = AtomicUsize::new(0);

        // indexed collect keeps input order regardless of which worker finishes first
        sources
            .par_iter()
            .map(|source| {
                let result = self.hasher.hash_source(source);
                log::debug!("hashed {}", source.describe());

                let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                self.report(Stage::Hashing, done, total);

                result
            })
            .collect()
    }

    fn match_all(&self, fingerprints: &[Option<Fingerprint>]) -> Vec<PairDistance> {
        let total = fingerprints.len();
        let done = AtomicUsize::new(0);
        let max_distance = self.max_distance.unwrap_or(u32::MAX);

        fingerprints
            .par_iter()
            .enumerate()
            .flat_map_iter(|(left, left_hash)| {
                let row: Vec<PairDistance> = match left_hash {
                    Some(left_hash) => fingerprints[left + 1..]
                        .iter()
                        .enumerate()
                        .filter_map(|(offset, right_hash)| {
                            let right_hash = right_hash.as_ref()?;
                            let distance = left_hash.dist(right_hash);

                            (distance <= max_distance).then(|| PairDistance {
                                left,
                                right: left + 1 + offset,
                                distance,
                            })
                        })
                        .collect(),
                    None => Vec::new(),
                };

                let done = done.fetch_add(1, Ordering::Relaxed) + 1;
                self.report(Stage::Matching, done, total);

                row
            })
            .collect()
    }

    fn report(&self, stage: Stage, done: usize, total: usize) {
        if let Some(ref progress) = self.progress {
            progress(Progress { stage, done, total });
        }
    }
}
