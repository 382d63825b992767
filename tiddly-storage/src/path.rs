//! Tiddler locations.
//!
//! A location is a `/`-separated path relative to a backend root:
//!
//! ```text
//! tiddlers/HelloThere.tid
//! tiddlers/$__config_tiddlyweb_host.tid
//! tiddlers/logo.png.meta   (header fields; body lives in tiddlers/logo.png)
//! ```
//!
//! # Examples
//!
//! ```
//! use tiddly_storage::path::{canonical_location, is_tiddler_file};
//!
//! assert_eq!(
//!     canonical_location("tiddlers", "$:/config/tiddlyweb/host"),
//!     "tiddlers/$__config_tiddlyweb_host.tid"
//! );
//! assert!(is_tiddler_file("tiddlers/logo.png.meta"));
//! assert!(!is_tiddler_file("tiddlers/.DS_Store"));
//! ```

/// Extension of line-encoded tiddler files.
pub const TIDDLER_EXTENSION: &str = ".tid";

/// Extension of header-only files paired with a raw body file.
pub const META_EXTENSION: &str = ".meta";

/// Known-corrupt files that are never indexed.
const EXCLUDED_FILES: &[&str] = &["$__plugins_tobibeer_rate_styles_imgfix.tid"];

/// Derive the file name a tiddler is stored under.
///
/// `/`, `:` and `"` become `_`. Distinct titles can map to the same name.
pub fn tiddler_filename(title: &str) -> String {
    format!("{}{}", body_filename(title), TIDDLER_EXTENSION)
}

/// File name of the raw body when a tiddler is stored as a `.meta` pair.
pub fn body_filename(title: &str) -> String {
    title.replace(['/', ':', '"'], "_")
}

/// Canonical location of a title inside `dir`.
pub fn canonical_location(dir: &str, title: &str) -> String {
    join(dir, &tiddler_filename(title))
}

/// Canonical `.meta` location of a title stored as a header/body pair.
pub fn meta_location(dir: &str, title: &str) -> String {
    join(dir, &format!("{}{}", body_filename(title), META_EXTENSION))
}

/// Join two location fragments with a single `/`.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (dir.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{}/{}", dir, name),
    }
}

/// Last component of a location.
pub fn file_name(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

/// Location of the raw body for a `.meta` location, if it is one.
pub fn body_location(location: &str) -> Option<&str> {
    location.strip_suffix(META_EXTENSION)
}

/// Whether a location should be indexed as a tiddler.
///
/// Hidden components (leading `.`) are skipped, as is anything that is not a
/// `.tid` or `.meta` file.
pub fn is_tiddler_file(location: &str) -> bool {
    if location
        .split('/')
        .any(|part| part.starts_with('.') && part != "." && part != "..")
    {
        return false;
    }

    let name = file_name(location);
    if !name.ends_with(TIDDLER_EXTENSION) && !name.ends_with(META_EXTENSION) {
        return false;
    }

    !EXCLUDED_FILES.contains(&name)
}
