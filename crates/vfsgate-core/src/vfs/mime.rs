//! MIME type resolution for descriptors and `Content-Type`.

use std::collections::HashMap;

use crate::config::MimeConfig;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Resolves a filename to a MIME type.
///
/// Lookup order: configured filenames, configured extensions, `mime_guess`,
/// then `application/octet-stream`.
#[derive(Debug, Clone, Default)]
pub struct MimeResolver {
    extensions: HashMap<String, String>,
    filenames: HashMap<String, String>,
}

impl MimeResolver {
    pub fn new(config: &MimeConfig) -> Self {
        let extensions = config
            .define
            .iter()
            .flat_map(|(mime, exts)| {
                exts.iter().map(move |ext| {
                    (ext.trim_start_matches('.').to_ascii_lowercase(), mime.clone())
                })
            })
            .collect();

        Self {
            extensions,
            filenames: config.filenames.clone().into_iter().collect(),
        }
    }

    /// MIME type for a filename or path; only the final component is used.
    pub fn resolve(&self, name: &str) -> String {
        let filename = name.rsplit('/').next().unwrap_or(name);

        if let Some(mime) = self.filenames.get(filename) {
            return mime.clone();
        }

        if let Some((_, ext)) = filename.rsplit_once('.') {
            if let Some(mime) = self.extensions.get(&ext.to_ascii_lowercase()) {
                return mime.clone();
            }
        }

        mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or(DEFAULT_MIME)
            .to_string()
    }
}
