//! VFS address parsing and sanitizing.
//!
//! An address is `prefix:/path/to/file`. The prefix names a mountpoint and
//! may only contain word characters and hyphens; any run of `:` separates it
//! from the path.

use super::error::{VfsError, VfsResult};

/// Longest segment we keep, in bytes.
const MAX_SEGMENT_BYTES: usize = 255;

/// Characters that are never allowed in a path segment.
const ILLEGAL_CHARS: &[char] = &['/', '?', '<', '>', '\\', ':', '*', '|', '"'];

/// Device names Windows refuses as filenames, with or without an extension.
const RESERVED_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com0", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt0", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8",
    "lpt9",
];

/// Sanitize a full address.
///
/// Every segment is cleaned independently; segments that clean to nothing
/// (`..`, `.`, `con`) collapse away with the surrounding slashes.
pub fn sanitize(address: &str) -> VfsResult<String> {
    let collapsed = collapse_slashes(address);
    let (prefix, rest) =
        split_address(&collapsed).ok_or_else(|| VfsError::invalid_path(address))?;

    let joined = rest
        .split('/')
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("/");

    Ok(format!("{}:{}", prefix, collapse_slashes(&joined)))
}

/// Sanitize a list of addresses element-wise.
pub fn sanitize_all<S: AsRef<str>>(addresses: &[S]) -> VfsResult<Vec<String>> {
    addresses.iter().map(|a| sanitize(a.as_ref())).collect()
}

/// Clean a single path segment so it is safe as a filename.
pub fn sanitize_segment(segment: &str) -> String {
    let mut end = segment.len().min(MAX_SEGMENT_BYTES);
    while !segment.is_char_boundary(end) {
        end -= 1;
    }

    let cleaned: String = segment[..end]
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    let cleaned = cleaned.trim_end_matches(['.', ' ']);

    let stem = cleaned.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        return String::new();
    }

    cleaned.to_string()
}

/// The mountpoint name of an address: everything before the first `:`.
pub fn get_prefix(address: &str) -> &str {
    address.split_once(':').map_or(address, |(prefix, _)| prefix)
}

/// The path part of an address, without the prefix and its colons.
pub fn relative(address: &str) -> &str {
    address
        .split_once(':')
        .map_or("", |(_, rest)| rest.trim_start_matches(':'))
}

/// Last non-empty path segment.
pub fn basename(address: &str) -> &str {
    relative(address)
        .rsplit('/')
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Address of the containing directory; the mount root is its own parent.
pub fn parent(address: &str) -> String {
    let prefix = get_prefix(address);
    let path = relative(address).trim_end_matches('/');
    match path.rfind('/') {
        Some(0) | None => format!("{}:/", prefix),
        Some(idx) => format!("{}:{}", prefix, &path[..idx]),
    }
}

/// Append a child name to a directory address.
pub fn join(address: &str, name: &str) -> String {
    format!("{}/{}", address.trim_end_matches('/'), name)
}

fn split_address(address: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = address.split_once(':')?;
    let valid = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then(|| (prefix, rest.trim_start_matches(':')))
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_slash = false;
    for c in s.chars() {
        if c == '/' {
            if !last_slash {
                out.push(c);
            }
            last_slash = true;
        } else {
            out.push(c);
            last_slash = false;
        }
    }
    out
}
