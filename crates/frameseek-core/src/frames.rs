//! Keyframe directory neighbor lookup
//!
//! Keyframes of one video live in one directory, named by frame number
//! (`000120.jpg`). Neighbors are the following frames at least
//! `min_distance` frame numbers apart from the previously selected one, so
//! a window of three spans a visible stretch of time instead of three
//! near-identical frames.

use crate::error::SearchError;
use crate::search::TemporalNeighborLookup;
use crate::types::CandidateImage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Default spacing between selected frames
pub const DEFAULT_MIN_DISTANCE: u64 = 25;

/// Neighbor lookup over `<video dir>/<frame number>.jpg` files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDirectoryNeighbors {
    min_distance: u64,
}

impl FrameDirectoryNeighbors {
    /// Create lookup with the given frame spacing
    #[inline]
    #[must_use]
    pub fn new(min_distance: u64) -> Self {
        Self { min_distance }
    }

    /// Frame spacing
    #[inline]
    #[must_use]
    pub fn min_distance(&self) -> u64 {
        self.min_distance
    }

    /// Up to `range` spaced frames on each side of `image_path`
    ///
    /// Earlier frames come first, in chronological order.
    ///
    /// # Errors
    /// [`SearchError`] if the directory cannot be read or the frame is not
    /// in it.
    pub async fn surrounding(
        &self,
        image_path: &str,
        range: usize,
    ) -> Result<Vec<CandidateImage>, SearchError> {
        let (frames, position) = locate(image_path).await?;
        let mut before = spaced(frames[..position].iter().rev(), frames[position].0, self.min_distance, range);
        before.reverse();
        let after = spaced(frames[position + 1..].iter(), frames[position].0, self.min_distance, range);
        Ok(before.into_iter().chain(after).map(to_candidate).collect())
    }
}

impl Default for FrameDirectoryNeighbors {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DISTANCE)
    }
}

#[async_trait]
impl TemporalNeighborLookup for FrameDirectoryNeighbors {
    async fn neighbors(
        &self,
        image_path: &str,
        count: usize,
    ) -> Result<Vec<CandidateImage>, SearchError> {
        let (frames, position) = locate(image_path).await?;
        let after = spaced(frames[position + 1..].iter(), frames[position].0, self.min_distance, count);
        Ok(after.into_iter().map(to_candidate).collect())
    }
}

type Frame = (u64, PathBuf);

/// Frames of the image's directory, plus the image's position among them
async fn locate(image_path: &str) -> Result<(Vec<Frame>, usize), SearchError> {
    let path = Path::new(image_path);
    let unknown = || SearchError::UnknownFrame(image_path.to_string());
    let number = frame_number(path).ok_or_else(unknown)?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let frames = list_frames(&dir).await?;
    let position = frames
        .binary_search_by_key(&number, |(n, _)| *n)
        .map_err(|_| unknown())?;
    Ok((frames, position))
}

/// `.jpg` frames in `dir`, sorted by frame number
async fn list_frames(dir: &Path) -> Result<Vec<Frame>, SearchError> {
    let io_error = |source| SearchError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
    let mut frames = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let path = entry.path();
        if let Some(number) = frame_number(&path) {
            frames.push((number, path));
        }
    }
    frames.sort_by_key(|(n, _)| *n);
    frames.dedup_by_key(|(n, _)| *n);
    Ok(frames)
}

fn frame_number(path: &Path) -> Option<u64> {
    let is_jpg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg"));
    if !is_jpg {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Take up to `limit` frames, each at least `min_distance` from the last taken
fn spaced<'a>(
    frames: impl Iterator<Item = &'a Frame>,
    origin: u64,
    min_distance: u64,
    limit: usize,
) -> Vec<&'a Frame> {
    let mut last = origin;
    let mut selected = Vec::new();
    for frame in frames {
        if selected.len() == limit {
            break;
        }
        if frame.0.abs_diff(last) >= min_distance {
            last = frame.0;
            selected.push(frame);
        }
    }
    selected
}

fn to_candidate(frame: &Frame) -> CandidateImage {
    CandidateImage::new(frame.1.to_string_lossy().into_owned())
}
