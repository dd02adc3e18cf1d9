use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SequenceError};
use crate::sequence::types::{parse_frame_name, FrameRef, ImageSequence, ParsedFrameName};

/// Frame file extensions eligible for sequence discovery
pub const INPUT_IMAGE_FORMATS: [&str; 11] = [
    "exr", "tif", "tiff", "png", "jpg", "jpeg", "iff", "tex", "tx", "jp2", "j2c",
];

/// Discovers image sequences from a directory, a single frame file, or a
/// numbered pattern like `shot_####.exr` / `shot_%04d.exr`
pub struct SequenceResolver;

impl SequenceResolver {
    /// Resolve an input path into zero or more image sequences.
    ///
    /// Finding nothing is reported as [`SequenceError::NotFound`]; callers
    /// treat it as a skip, not an abort.
    pub fn resolve<P: AsRef<Path>>(input: P) -> Result<Vec<ImageSequence>> {
        let input = input.as_ref();
        debug!("Resolving input path: {:?}", input);

        if input.is_dir() {
            Self::resolve_directory(input)
        } else if input.is_file() {
            Self::resolve_single_file(input)
        } else {
            Self::resolve_pattern(input)
        }
    }

    /// Recursively scan a directory tree; every directory level contributes
    /// one sequence per distinct (basename-pattern, extension) group found
    /// directly inside it
    fn resolve_directory(dir: &Path) -> Result<Vec<ImageSequence>> {
        let mut sequences = Vec::new();
        Self::scan_tree(dir, &mut sequences)?;

        if sequences.is_empty() {
            warn!("No image files found recursively in: {:?}", dir);
            return Err(SequenceError::NotFound {
                path: dir.display().to_string(),
            }
            .into());
        }
        Ok(sequences)
    }

    fn scan_tree(dir: &Path, sequences: &mut Vec<ImageSequence>) -> Result<()> {
        sequences.extend(Self::sequences_in_dir(dir)?);

        let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !Self::is_hidden(path))
            .collect();
        subdirs.sort();

        for subdir in subdirs {
            Self::scan_tree(&subdir, sequences)?;
        }
        Ok(())
    }

    /// Treat the input as the first frame of its sequence: strip the frame
    /// number and collect siblings with the same prefix/suffix/extension
    fn resolve_single_file(file: &Path) -> Result<Vec<ImageSequence>> {
        let not_found = || SequenceError::NotFound {
            path: file.display().to_string(),
        };

        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(not_found)?;
        let parsed = parse_frame_name(name).ok_or_else(not_found)?;

        if !Self::is_allowed_extension(&parsed.extension) {
            return Err(SequenceError::UnsupportedExtension {
                extension: parsed.extension,
            }
            .into());
        }

        let parent = file.parent().filter(|p| !p.as_os_str().is_empty());
        let parent = parent.unwrap_or_else(|| Path::new("."));

        let matching: Vec<ImageSequence> = Self::sequences_in_dir(parent)?
            .into_iter()
            .filter(|seq| seq.head() == parsed.head && seq.extension() == parsed.extension)
            .collect();

        if matching.is_empty() {
            return Err(not_found().into());
        }
        Ok(matching)
    }

    /// Treat the input as a `####` or `%0Nd` pattern and resolve it against
    /// its parent directory
    fn resolve_pattern(input: &Path) -> Result<Vec<ImageSequence>> {
        let parent = input.parent().filter(|p| !p.as_os_str().is_empty());
        let parent = parent.unwrap_or_else(|| Path::new("."));

        if !parent.is_dir() {
            return Err(SequenceError::MissingInput {
                path: input.display().to_string(),
            }
            .into());
        }

        let name = input.file_name().and_then(|n| n.to_str());
        let pattern = name.and_then(Self::parse_pattern);

        let sequences = Self::sequences_in_dir(parent)?;
        let sequences: Vec<ImageSequence> = match pattern {
            Some((head, _tail, extension)) => sequences
                .into_iter()
                .filter(|seq| seq.head() == head && seq.extension() == extension)
                .collect(),
            None => sequences,
        };

        if sequences.is_empty() {
            return Err(SequenceError::NotFound {
                path: input.display().to_string(),
            }
            .into());
        }
        Ok(sequences)
    }

    /// Group the allow-listed, numbered image files directly inside `dir`
    fn sequences_in_dir(dir: &Path) -> Result<Vec<ImageSequence>> {
        let mut groups: BTreeMap<(String, String, String), Vec<FrameRef>> = BTreeMap::new();

        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let path = entry.path();
            if !path.is_file() || Self::is_hidden(&path) {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(parsed) = parse_frame_name(name) else {
                debug!("Skipping unnumbered file: {:?}", path);
                continue;
            };
            if !Self::is_allowed_extension(&parsed.extension) {
                continue;
            }

            let ParsedFrameName {
                head,
                index,
                padding,
                tail,
                extension,
            } = parsed;
            groups
                .entry((head, tail, extension.clone()))
                .or_default()
                .push(FrameRef::new(path, index, padding, extension));
        }

        let sequences = groups
            .into_iter()
            .filter_map(|((head, tail, extension), frames)| {
                ImageSequence::new(dir.to_path_buf(), head, tail, extension, frames)
            })
            .collect();
        Ok(sequences)
    }

    /// Parse a `####` or `%0Nd` / `%d` style filename into
    /// (head, tail, extension)
    fn parse_pattern(name: &str) -> Option<(String, String, String)> {
        let (stem, extension) = name.rsplit_once('.')?;

        if let Some(start) = stem.find('#') {
            let run = stem[start..].bytes().take_while(|&b| b == b'#').count();
            return Some((
                stem[..start].to_string(),
                stem[start + run..].to_string(),
                extension.to_ascii_lowercase(),
            ));
        }

        if let Some(start) = stem.find('%') {
            let rest = &stem[start + 1..];
            let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
            if rest[digits..].starts_with('d') {
                return Some((
                    stem[..start].to_string(),
                    stem[start + 1 + digits + 1..].to_string(),
                    extension.to_ascii_lowercase(),
                ));
            }
        }

        None
    }

    fn is_allowed_extension(extension: &str) -> bool {
        INPUT_IMAGE_FORMATS.contains(&extension)
    }

    fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_directory_discovers_one_sequence() {
        let dir = tempdir().unwrap();
        for i in [1003, 1001, 1005, 1002, 1004] {
            touch(dir.path(), &format!("shot_{i}.exr"));
        }
        touch(dir.path(), "notes.txt");

        let sequences = SequenceResolver::resolve(dir.path()).unwrap();
        assert_eq!(sequences.len(), 1);

        let seq = &sequences[0];
        assert_eq!(seq.start(), 1001);
        assert_eq!(seq.length(), 5);
        assert_eq!(seq.extension(), "exr");
        assert_eq!(seq.basename(), "shot");

        let indices: Vec<u64> = seq.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1001, 1002, 1003, 1004, 1005]);
    }

    #[test]
    fn test_directory_splits_distinct_patterns() {
        let dir = tempdir().unwrap();
        for i in 1..=3 {
            touch(dir.path(), &format!("fg_{i:04}.png"));
            touch(dir.path(), &format!("bg_{i:04}.png"));
        }

        let sequences = SequenceResolver::resolve(dir.path()).unwrap();
        assert_eq!(sequences.len(), 2);
        let mut heads: Vec<&str> = sequences.iter().map(|s| s.head()).collect();
        heads.sort();
        assert_eq!(heads, vec!["bg_", "fg_"]);
    }

    #[test]
    fn test_directory_scans_subdirectories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("sq010").join("sh020");
        fs::create_dir_all(&nested).unwrap();
        for i in 1..=2 {
            touch(&nested, &format!("beauty_{i:04}.exr"));
        }

        let sequences = SequenceResolver::resolve(dir.path()).unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].directory(), nested.as_path());
    }

    #[test]
    fn test_single_file_infers_siblings() {
        let dir = tempdir().unwrap();
        for i in 1001..=1005 {
            touch(dir.path(), &format!("shot_{i}.exr"));
        }
        touch(dir.path(), "other_0001.exr");

        let sequences = SequenceResolver::resolve(dir.path().join("shot_1001.exr")).unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].length(), 5);
        assert_eq!(sequences[0].head(), "shot_");
    }

    #[test]
    fn test_hash_pattern_resolves_against_parent() {
        let dir = tempdir().unwrap();
        for i in 1001..=1003 {
            touch(dir.path(), &format!("shot_{i}.exr"));
        }
        touch(dir.path(), "other_0001.exr");

        let sequences = SequenceResolver::resolve(dir.path().join("shot_####.exr")).unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].head(), "shot_");
    }

    #[test]
    fn test_printf_pattern_resolves_against_parent() {
        let dir = tempdir().unwrap();
        for i in 1..=4 {
            touch(dir.path(), &format!("plate.{i:05}.tif"));
        }

        let sequences = SequenceResolver::resolve(dir.path().join("plate.%05d.tif")).unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].length(), 4);
    }

    #[test]
    fn test_pattern_with_missing_parent_is_reported() {
        let dir = tempdir().unwrap();
        let result =
            SequenceResolver::resolve(dir.path().join("nowhere").join("shot_####.exr"));
        assert!(result.is_err());
    }

    #[test]
    fn test_extension_allow_list() {
        let dir = tempdir().unwrap();
        for i in 1..=3 {
            touch(dir.path(), &format!("clip_{i:04}.mov"));
        }

        // Only disallowed extensions present: reported as not found
        assert!(SequenceResolver::resolve(dir.path()).is_err());

        touch(dir.path(), "clip_0001.exr");
        let sequences = SequenceResolver::resolve(dir.path()).unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].extension(), "exr");
    }

    #[test]
    fn test_empty_directory_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let err = SequenceResolver::resolve(dir.path()).unwrap_err();
        assert!(!err.is_run_fatal());
    }
}
