use std::fs;
use std::path::{Path, PathBuf};

use batch_converter_core::format::InputFormat;
use batch_converter_core::intake::FileDescriptor;
use walkdir::WalkDir;

use crate::error::IoError;

/// Collect candidate files from one input path.
/// A file is returned as-is so intake can count it if unsupported; a
/// directory contributes only files with a supported extension.
pub fn collect_files(input: &Path, recursive: bool) -> Result<Vec<PathBuf>, IoError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    if !input.is_dir() {
        return Err(IoError::ReadFile {
            path: input.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a file or directory"),
        });
    }

    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(input).max_depth(max_depth).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        if InputFormat::from_path(&path).is_some() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Collect from several inputs, preserving argument order.
pub fn collect_all(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, IoError> {
    let mut files = Vec::new();
    for input in inputs {
        files.extend(collect_files(input, recursive)?);
    }
    Ok(files)
}

/// Read a file into a descriptor named after its file name. The type is
/// left to extension detection.
pub fn read_descriptor(path: &Path) -> Result<FileDescriptor, IoError> {
    let bytes = read_file(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(FileDescriptor::new(name, bytes))
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, IoError> {
    fs::read(path).map_err(|e| IoError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write file contents, creating parent directories as needed.
pub fn write_file(path: &Path, data: &[u8]) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| IoError::WriteFile {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(path, data).map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_filters_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"x").unwrap();
        fs::write(dir.path().join("a.mov"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.gif"), b"x").unwrap();

        let flat = collect_files(dir.path(), false).unwrap();
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.mov", "b.png"]);

        let deep = collect_files(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_explicit_file_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"x").unwrap();
        assert_eq!(collect_files(&path, false).unwrap(), vec![path]);
    }

    #[test]
    fn test_missing_input() {
        let err = collect_files(Path::new("/definitely/not/here"), false).unwrap_err();
        assert!(matches!(err, IoError::ReadFile { .. }));
    }

    #[test]
    fn test_read_descriptor_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.bmp");
        fs::write(&path, b"12345").unwrap();

        let desc = read_descriptor(&path).unwrap();
        assert_eq!(desc.name, "pic.bmp");
        assert_eq!(desc.bytes.len(), 5);

        let out = dir.path().join("out").join("pic.png");
        write_file(&out, b"png").unwrap();
        assert_eq!(fs::read(out).unwrap(), b"png");
    }
}
