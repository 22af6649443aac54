use std::path::PathBuf;

use raoa_repo::BARE_SUFFIX;

use crate::error::{DirectoryError, DirectoryResult};

/// Root-relative path of a new bare album repository built from directory
/// segments; the last segment gets the `.git` suffix.
///
/// ```
/// use raoa_directory::album_relative_path;
///
/// let path = album_relative_path(&["2024", "Summer"]).unwrap();
/// assert_eq!(path, std::path::PathBuf::from("2024/Summer.git"));
/// assert!(album_relative_path(&["..", "x"]).is_err());
/// ```
pub fn album_relative_path<S: AsRef<str>>(segments: &[S]) -> DirectoryResult<PathBuf> {
    let joined = segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    let invalid = |reason: &str| DirectoryError::InvalidAlbumPath {
        path: joined.clone(),
        reason: reason.to_string(),
    };
    let Some((last, parents)) = segments.split_last() else {
        return Err(invalid("at least one segment is required"));
    };
    for segment in segments {
        let segment = segment.as_ref();
        if segment.is_empty() || segment.trim() != segment {
            return Err(invalid("segments must be non-empty and untrimmed"));
        }
        if segment.starts_with('.') {
            return Err(invalid("segments must not start with '.'"));
        }
        if segment.contains(['/', '\\', '\0']) {
            return Err(invalid("segments must not contain separators or NUL"));
        }
    }
    if last.as_ref().ends_with(BARE_SUFFIX) {
        return Err(invalid("the album name must not carry the repository suffix"));
    }

    let mut path: PathBuf = parents.iter().map(AsRef::as_ref).collect();
    path.push(format!("{}{BARE_SUFFIX}", last.as_ref()));
    Ok(path)
}
