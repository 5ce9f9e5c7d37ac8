//! Content items and the sources that enumerate them.

use crate::error::{NarratorError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One unit of source content, identified by a stable slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: String,
    pub raw_text: String,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// Trait for anything that can enumerate content items.
///
/// Implementations must return items in a stable order.
pub trait ContentSource: Send + Sync {
    fn load(&self) -> Result<Vec<ContentItem>>;
}

/// Static list of items, mostly for tests and embedding.
impl ContentSource for Vec<ContentItem> {
    fn load(&self) -> Result<Vec<ContentItem>> {
        Ok(self.clone())
    }
}

/// Reads Markdown/MDX documents from a directory.
///
/// Recognizes `<dir>/<slug>.<ext>` and `<dir>/<slug>/index.<ext>`.
/// Items are sorted by slug.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            extensions,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn index_file(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("index.{ext}")))
            .find(|candidate| candidate.is_file())
    }
}

impl ContentSource for DirectorySource {
    fn load(&self) -> Result<Vec<ContentItem>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| NarratorError::ContentSource {
            message: format!("Failed to read {}: {}", self.dir.display(), e),
        })?;

        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();

            let (slug, file) = if path.is_dir() {
                match self.index_file(&path) {
                    Some(index) => (path.file_name(), index),
                    None => continue,
                }
            } else if self.has_extension(&path) {
                (path.file_stem(), path.clone())
            } else {
                continue;
            };

            let Some(slug) = slug.and_then(|s| s.to_str()) else {
                tracing::warn!(path = %path.display(), "Skipping content with non-UTF-8 name");
                continue;
            };

            match fs::read_to_string(&file) {
                Ok(raw_text) => found.push((ContentItem::new(slug, raw_text), file)),
                Err(e) => tracing::warn!(path = %file.display(), "Skipping unreadable content: {e}"),
            }
        }

        // `post.md` sorts before `post/index.md` and wins
        found.sort_by(|(a, a_path), (b, b_path)| a.id.cmp(&b.id).then_with(|| a_path.cmp(b_path)));

        let mut items: Vec<ContentItem> = Vec::with_capacity(found.len());
        for (item, file) in found {
            if items.last().is_some_and(|last| last.id == item.id) {
                tracing::warn!(
                    slug = %item.id,
                    path = %file.display(),
                    "Ignoring duplicate content item"
                );
                continue;
            }
            items.push(item);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> DirectorySource {
        DirectorySource::new(dir.path(), vec!["md".to_string(), "mdx".to_string()])
    }

    #[test]
    fn test_loads_flat_files_sorted_by_slug() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("zebra.md"), "Z").unwrap();
        fs::write(dir.path().join("apple.mdx"), "A").unwrap();

        let items = source(&dir).load().unwrap();

        assert_eq!(
            items,
            vec![ContentItem::new("apple", "A"), ContentItem::new("zebra", "Z")]
        );
    }

    #[test]
    fn test_loads_index_files_from_subdirectories() {
        let dir = TempDir::new().unwrap();
        let post = dir.path().join("my-post");
        fs::create_dir(&post).unwrap();
        fs::write(post.join("index.mdx"), "Body").unwrap();

        let items = source(&dir).load().unwrap();

        assert_eq!(items, vec![ContentItem::new("my-post", "Body")]);
    }

    #[test]
    fn test_ignores_other_files_and_empty_dirs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "no").unwrap();
        fs::write(dir.path().join("cover.png"), [0u8; 4]).unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();

        assert!(source(&dir).load().unwrap().is_empty());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("LOUD.MD"), "x").unwrap();

        let items = source(&dir).load().unwrap();
        assert_eq!(items[0].id, "LOUD");
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.md"), "fine").unwrap();
        fs::write(dir.path().join("binary.md"), [0xffu8, 0xfe, 0x00, 0x80]).unwrap();

        let items = source(&dir).load().unwrap();

        assert_eq!(items, vec![ContentItem::new("good", "fine")]);
    }

    #[test]
    fn test_duplicate_slug_keeps_flat_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("post.md"), "flat").unwrap();
        fs::create_dir(dir.path().join("post")).unwrap();
        fs::write(dir.path().join("post/index.md"), "nested").unwrap();

        let items = source(&dir).load().unwrap();

        assert_eq!(items, vec![ContentItem::new("post", "flat")]);
    }

    #[test]
    fn test_missing_directory_is_content_source_error() {
        let dir = TempDir::new().unwrap();
        let missing = DirectorySource::new(dir.path().join("nope"), vec!["md".into()]);

        match missing.load() {
            Err(NarratorError::ContentSource { message }) => assert!(message.contains("nope")),
            other => panic!("Expected ContentSource error, got: {:?}", other),
        }
    }
}
