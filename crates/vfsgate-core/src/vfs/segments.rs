//! Mount root templates.
//!
//! A mount root such as `{vfs}/{username}` is expanded per request:
//!
//! | Segment      | Value                              | Dynamic |
//! |--------------|------------------------------------|---------|
//! | `{root}`     | working directory at boot          | no      |
//! | `{vfs}`      | configured VFS root                | no      |
//! | `{username}` | the session's user                 | yes     |
//!
//! Unknown segments expand to the empty string.

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

use super::error::{VfsError, VfsResult};
use super::mount::Mountpoint;
use super::path;
use crate::config::VfsConfig;
use crate::session::Session;

/// Known template segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Segment {
    Root,
    Vfs,
    Username,
}

/// A piece of a parsed root template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Literal(&'a str),
    Token(&'a str),
}

/// Split a template into literals and `{token}` placeholders.
pub(crate) fn parse_template(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let token_len = after.find('}').filter(|&len| {
            len > 0
                && after[..len]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });

        match token_len {
            Some(len) => {
                if open > 0 {
                    pieces.push(Piece::Literal(&rest[..open]));
                }
                pieces.push(Piece::Token(&after[..len]));
                rest = &after[len + 1..];
            }
            None => {
                pieces.push(Piece::Literal(&rest[..=open]));
                rest = after;
            }
        }
    }

    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }
    pieces
}

/// Static segment values, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SegmentTable {
    root: String,
    vfs: String,
}

impl SegmentTable {
    pub fn new(root: impl AsRef<Path>, vfs: impl AsRef<Path>) -> Self {
        let clean = |p: &Path| {
            let s = p.to_string_lossy();
            let trimmed = s.trim_end_matches('/');
            if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
        };
        Self {
            root: clean(root.as_ref()),
            vfs: clean(vfs.as_ref()),
        }
    }

    /// Build from config: `{root}` is the current directory, `{vfs}` the
    /// configured root resolved against it.
    pub fn from_config(config: &VfsConfig) -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        let vfs = if config.root.is_absolute() {
            config.root.clone()
        } else {
            cwd.join(&config.root)
        };
        Ok(Self::new(cwd, vfs))
    }

    /// Value of a segment for the given session.
    ///
    /// Session-derived values must already be safe filenames; anything that
    /// would change under sanitizing (or is empty) is rejected rather than
    /// spliced into a path.
    pub fn value(&self, segment: Segment, session: &Session) -> VfsResult<String> {
        match segment {
            Segment::Root => Ok(self.root.clone()),
            Segment::Vfs => Ok(self.vfs.clone()),
            Segment::Username => {
                let name = &session.username;
                if name.is_empty() || path::sanitize_segment(name) != *name {
                    return Err(VfsError::invalid_path(format!(
                        "unsafe value for {{username}} segment: {:?}",
                        name
                    )));
                }
                Ok(name.clone())
            }
        }
    }

    /// Expand every `{token}` in a template.
    pub fn expand(&self, template: &str, session: &Session) -> VfsResult<String> {
        let mut out = String::with_capacity(template.len());
        for piece in parse_template(template) {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Token(token) => {
                    if let Ok(segment) = Segment::from_str(token) {
                        out.push_str(&self.value(segment, session)?);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Expand static segments and replace dynamic ones with `*`.
    pub fn expand_wildcard(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        for piece in parse_template(template) {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Token(token) => match Segment::from_str(token) {
                    Ok(Segment::Root) => out.push_str(&self.root),
                    Ok(Segment::Vfs) => out.push_str(&self.vfs),
                    Ok(_) => out.push('*'),
                    Err(_) => {}
                },
            }
        }
        out
    }

    /// Expanded root directory of `mount` for this session.
    pub fn mount_root(&self, mount: &Mountpoint, session: &Session) -> VfsResult<PathBuf> {
        Ok(PathBuf::from(self.expand(&mount.root_template(), session)?))
    }

    /// Regex matching real paths below any instance of `template`, plus the
    /// names of the dynamic segments it captures (in capture order). The last
    /// capture group is the path relative to the mount root.
    pub(crate) fn watch_pattern(&self, template: &str) -> (String, Vec<String>) {
        let mut pattern = String::from("^");
        let mut names = Vec::new();
        for piece in parse_template(template) {
            match piece {
                Piece::Literal(s) => pattern.push_str(&regex::escape(s)),
                Piece::Token(token) => match Segment::from_str(token) {
                    Ok(Segment::Root) => pattern.push_str(&regex::escape(&self.root)),
                    Ok(Segment::Vfs) => pattern.push_str(&regex::escape(&self.vfs)),
                    Ok(segment) => {
                        pattern.push_str("([^/]*)");
                        names.push(segment.to_string());
                    }
                    Err(_) => {}
                },
            }
        }
        pattern.push_str("/(.*)$");
        (pattern, names)
    }

    /// Real backend location of `address` within `mount`.
    ///
    /// The address is expected to be sanitized; anything that is not a plain
    /// path component is still refused.
    pub fn real_path(
        &self,
        mount: &Mountpoint,
        session: &Session,
        address: &str,
    ) -> VfsResult<PathBuf> {
        let root = self.mount_root(mount, session)?;
        let relative = path::relative(address).trim_start_matches('/');

        if Path::new(relative)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(VfsError::path_escapes_root(address));
        }

        Ok(if relative.is_empty() { root } else { root.join(relative) })
    }
}
