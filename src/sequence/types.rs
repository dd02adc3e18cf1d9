use std::path::{Path, PathBuf};

/// A single discovered frame file
///
/// Immutable once discovered; ordering is by frame index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    /// Full path to the frame file
    pub path: PathBuf,

    /// Numeric frame index parsed from the filename
    pub index: u64,

    /// Zero-padding width of the frame number as written on disk
    pub padding: usize,

    /// File extension, lowercase, without the dot
    pub extension: String,
}

impl FrameRef {
    pub fn new<P: Into<PathBuf>>(path: P, index: u64, padding: usize, extension: String) -> Self {
        Self {
            path: path.into(),
            index,
            padding,
            extension,
        }
    }
}

/// The pieces of a frame filename: everything before the frame number, the
/// number itself, anything between the number and the extension, and the
/// extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrameName {
    pub head: String,
    pub index: u64,
    pub padding: usize,
    pub tail: String,
    pub extension: String,
}

/// Split a filename around the last run of digits in its stem.
///
/// `shot_1001.exr` parses to head `shot_`, index 1001, padding 4. Filenames
/// without a digit run are not part of a numbered sequence and return `None`.
pub fn parse_frame_name(file_name: &str) -> Option<ParsedFrameName> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }

    let bytes = stem.as_bytes();
    let digits_end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let digits_start = bytes[..digits_end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|p| p + 1)
        .unwrap_or(0);

    let digits = &stem[digits_start..digits_end];
    let index: u64 = digits.parse().ok()?;

    Some(ParsedFrameName {
        head: stem[..digits_start].to_string(),
        index,
        padding: digits.len(),
        tail: stem[digits_end..].to_string(),
        extension: extension.to_ascii_lowercase(),
    })
}

/// An ordered, non-empty set of frames sharing one naming pattern
#[derive(Debug, Clone)]
pub struct ImageSequence {
    directory: PathBuf,
    head: String,
    tail: String,
    extension: String,
    padding: usize,
    frames: Vec<FrameRef>,
}

impl ImageSequence {
    /// Build a sequence from discovered frames. Frames are sorted by index;
    /// duplicate indices keep the first occurrence. Returns `None` when no
    /// frames are given.
    pub fn new(
        directory: PathBuf,
        head: String,
        tail: String,
        extension: String,
        mut frames: Vec<FrameRef>,
    ) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        frames.sort_by_key(|f| f.index);
        frames.dedup_by_key(|f| f.index);
        let padding = frames[0].padding;

        Some(Self {
            directory,
            head,
            tail,
            extension,
            padding,
            frames,
        })
    }

    /// Directory the frames live in
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Filename prefix shared by every frame
    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// First (lowest) frame index on disk
    pub fn start(&self) -> u64 {
        self.frames[0].index
    }

    /// Last (highest) frame index on disk
    pub fn end(&self) -> u64 {
        self.frames[self.frames.len() - 1].index
    }

    /// Number of frames in the sequence
    pub fn length(&self) -> usize {
        self.frames.len()
    }

    /// Lazy, restartable walk over the frames in ascending index order;
    /// iterating does not consume or mutate the sequence
    pub fn iter(&self) -> impl Iterator<Item = &FrameRef> + '_ {
        self.frames.iter()
    }

    pub fn frames(&self) -> &[FrameRef] {
        &self.frames
    }

    /// Sequence basename for output naming: the head with any trailing
    /// separator character removed (`shot_` becomes `shot`)
    pub fn basename(&self) -> &str {
        self.head.trim_end_matches(['_', '.', '-'])
    }

    /// Human-readable pattern, e.g. `shot_####.exr`
    pub fn pattern(&self) -> String {
        format!(
            "{}{}{}.{}",
            self.head,
            "#".repeat(self.padding.max(1)),
            self.tail,
            self.extension
        )
    }
}
