// ABOUTME: Temporary media files owned by whoever holds the value.
// ABOUTME: The file is deleted when the TempMedia is dropped.
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

/// File extension for a downloaded image, from its content type
pub fn image_extension(content_type: &str) -> &'static str {
    if content_type.contains("png") {
        ".png"
    } else if content_type.contains("webp") {
        ".webp"
    } else {
        ".jpg"
    }
}

#[derive(Debug)]
pub struct TempMedia {
    path: TempPath,
}

impl TempMedia {
    /// Write bytes to a fresh temp file with the given suffix (e.g. ".jpg")
    pub fn write(bytes: &[u8], suffix: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("jarvis-media-")
            .suffix(suffix)
            .tempfile()
            .context("Failed to create temp media file")?;
        file.write_all(bytes)
            .context("Failed to write temp media file")?;
        file.flush().context("Failed to flush temp media file")?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_follows_content_type() {
        assert_eq!(image_extension("image/png"), ".png");
        assert_eq!(image_extension("image/webp"), ".webp");
        assert_eq!(image_extension("image/jpeg"), ".jpg");
        assert_eq!(image_extension(""), ".jpg");
    }

    #[test]
    fn file_is_removed_on_drop() {
        let media = TempMedia::write(b"\x89PNG", ".png").unwrap();
        let path = media.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG");

        drop(media);
        assert!(!path.exists());
    }
}
