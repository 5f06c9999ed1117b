//! Path helpers for matching recordings and naming their MP4 output.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Extension given to every remuxed file.
pub const MP4_EXTENSION: &str = "mp4";

/// Check whether `path` carries `extension`, ignoring ASCII case.
///
/// The extension is given without the leading dot.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tsremux_av::paths::has_extension;
///
/// assert!(has_extension(Path::new("/in/show.ts"), "ts"));
/// assert!(has_extension(Path::new("/in/SHOW.TS"), "ts"));
/// assert!(!has_extension(Path::new("/in/show.mp4"), "ts"));
/// ```
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Map a source recording to its MP4 path inside `dest_dir`.
///
/// Only the last extension of the file name is replaced, so `a.b.ts`
/// becomes `a.b.mp4` and a name without an extension gains one.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tsremux_av::paths::mp4_destination;
///
/// let dest = mp4_destination(Path::new("/in/episode.01.ts"), Path::new("/out"))?;
/// assert_eq!(dest, Path::new("/out/episode.01.mp4"));
/// # Ok::<(), tsremux_av::Error>(())
/// ```
pub fn mp4_destination(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("no file name in {:?}", source)))?;

    let mut output = dest_dir.join(file_name);
    output.set_extension(MP4_EXTENSION);
    Ok(output)
}

/// Find the first free variant of `path`: `a.mp4`, `a-1.mp4`, `a-2.mp4`, ...
///
/// `taken` decides whether a candidate is already in use.
pub fn uniquify(path: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !taken(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u32..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{}-{}.{}", stem, n, ext),
                None => format!("{}-{}", stem, n),
            };
            path.with_file_name(name)
        })
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}
