//! Photo discovery for batch ingestion and authorization.

use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Every image under `root` paired with its identity label.
///
/// Files in a subdirectory take the name of the directory that holds them;
/// files at the root take their own file stem.
pub fn labelled_images(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut out = Vec::new();
    for path in list_images(root)? {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.push((path.clone(), stem.to_string()));
        }
    }

    // Popped from the back, so sort descending to visit in path order.
    let mut stack = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            stack.push(path);
        }
    }
    stack.sort_by(|a, b| b.cmp(a));
    while let Some(dir) = stack.pop() {
        let Some(label) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        entries.sort();
        for path in entries {
            if path.is_dir() {
                stack.push(path);
            } else if is_image(&path) {
                out.push((path, label.clone()));
            }
        }
    }

    tracing::debug!(root = %root.display(), images = out.len(), "ingest scan");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a.jpg")));
        assert!(is_image(Path::new("a.JPEG")));
        assert!(is_image(Path::new("dir/a.png")));
        assert!(!is_image(Path::new("a.gif")));
        assert!(!is_image(Path::new("README")));
    }

    #[test]
    fn test_list_images_skips_other_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.png"));
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/c.jpg"));
        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_labels_from_subdir_or_stem() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("carol.jpg"));
        touch(&dir.path().join("alice/1.jpg"));
        touch(&dir.path().join("alice/2.png"));
        touch(&dir.path().join("alice/old/3.jpeg"));
        touch(&dir.path().join("bob/x.jpg"));
        touch(&dir.path().join("bob/skip.txt"));

        let mut labels: Vec<String> = labelled_images(dir.path())
            .unwrap()
            .into_iter()
            .map(|(_, label)| label)
            .collect();
        labels.sort();
        assert_eq!(labels, vec!["alice", "alice", "bob", "carol", "old"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        assert!(labelled_images(Path::new("/nonexistent/facegate-photos")).is_err());
    }
}
