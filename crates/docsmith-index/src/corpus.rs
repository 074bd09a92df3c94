//! Documentation file discovery.

use std::path::{Component, Path, PathBuf};

use crate::error::{IndexError, Result};

/// A documentation file found under the corpus root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// Path relative to the corpus root, `/`-separated.
    pub relative_path: String,
}

/// Files found by [`discover_documents`] plus entries the walker could not read.
#[derive(Debug, Default)]
pub struct Discovery {
    pub documents: Vec<Document>,
    pub errors: Vec<String>,
}

/// Walk `root` for files whose extension is in `extensions`, sorted by relative path.
///
/// Hidden files and gitignored paths are skipped. Extensions match without
/// regard to ASCII case and may be given with or without the leading dot.
///
/// # Errors
///
/// Returns an error if `root` does not exist or is not a directory.
pub fn discover_documents(root: &Path, extensions: &[String]) -> Result<Discovery> {
    let meta = std::fs::metadata(root)?;
    if !meta.is_dir() {
        return Err(IndexError::Config(format!(
            "corpus root {} is not a directory",
            root.display()
        )));
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut discovery = Discovery::default();
    for entry in ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .build()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                discovery.errors.push(e.to_string());
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) || !has_extension(entry.path(), &wanted)
        {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        discovery.documents.push(Document {
            relative_path: slash_path(relative),
            path: entry.into_path(),
        });
    }

    discovery
        .documents
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(discovery)
}

fn has_extension(path: &Path, wanted: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| wanted.iter().any(|w| w.eq_ignore_ascii_case(ext)))
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md() -> Vec<String> {
        vec!["md".into()]
    }

    #[test]
    fn finds_markdown_recursively_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("guide/deep")).unwrap();
        std::fs::write(dir.path().join("z.md"), "z").unwrap();
        std::fs::write(dir.path().join("guide/deep/b.MD"), "b").unwrap();
        std::fs::write(dir.path().join("guide/a.md"), "a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let found = discover_documents(dir.path(), &md()).unwrap();
        let paths: Vec<_> = found.documents.iter().map(|d| d.relative_path.as_str()).collect();
        assert_eq!(paths, ["guide/a.md", "guide/deep/b.MD", "z.md"]);
        assert!(found.errors.is_empty());
    }

    #[test]
    fn hidden_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".draft.md"), "x").unwrap();
        std::fs::create_dir(dir.path().join(".hidden")).unwrap();
        std::fs::write(dir.path().join(".hidden/in.md"), "x").unwrap();
        std::fs::write(dir.path().join("shown.md"), "x").unwrap();

        let found = discover_documents(dir.path(), &md()).unwrap();
        assert_eq!(found.documents.len(), 1);
        assert_eq!(found.documents[0].relative_path, "shown.md");
    }

    #[test]
    fn extension_with_dot_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rst"), "x").unwrap();
        let found = discover_documents(dir.path(), &[".rst".to_owned()]).unwrap();
        assert_eq!(found.documents.len(), 1);
    }

    #[test]
    fn missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_documents(&dir.path().join("absent"), &md()).unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
    }

    #[test]
    fn file_root_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.md");
        std::fs::write(&file, "x").unwrap();
        let err = discover_documents(&file, &md()).unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
    }
}
