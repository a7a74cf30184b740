use bytes::Bytes;

use crate::format::{InputFormat, MediaKind};

/// A file as handed over by the caller, before validation.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub name: String,
    /// Declared MIME type, if the caller knows it.
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// A validated queue entry.
#[derive(Debug, Clone)]
pub struct QueuedFile {
    pub name: String,
    pub byte_size: u64,
    pub format: InputFormat,
    pub raw_bytes: Bytes,
}

impl QueuedFile {
    pub fn kind(&self) -> MediaKind {
        self.format.kind()
    }

    /// Cheap identity proxy: `(name, byte_size)`. Not a content hash.
    pub fn dedup_key(&self) -> (&str, u64) {
        (&self.name, self.byte_size)
    }
}

/// Outcome of one intake call. Rejections are only counted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntakeReport {
    pub accepted: usize,
    pub unsupported: usize,
    pub duplicates: usize,
}

impl IntakeReport {
    pub fn rejected(&self) -> usize {
        self.unsupported + self.duplicates
    }
}

/// Ordered conversion queue. Entries stay after a batch so they can be
/// converted again to another format.
#[derive(Debug, Default)]
pub struct FileQueue {
    files: Vec<QueuedFile>,
}

impl FileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[QueuedFile] {
        &self.files
    }

    fn contains(&self, name: &str, byte_size: u64) -> bool {
        self.files.iter().any(|f| f.dedup_key() == (name, byte_size))
    }

    /// Validate and append in input order. Existing entries are untouched.
    /// Duplicates inside `descriptors` itself are caught too, since accepted
    /// files are appended before the next one is checked.
    pub fn add_files(&mut self, descriptors: impl IntoIterator<Item = FileDescriptor>) -> IntakeReport {
        let mut report = IntakeReport::default();

        for desc in descriptors {
            let Some(format) = InputFormat::detect(desc.mime_type.as_deref(), &desc.name) else {
                log::debug!("Rejecting {}: unsupported type {:?}", desc.name, desc.mime_type);
                report.unsupported += 1;
                continue;
            };

            let byte_size = desc.bytes.len() as u64;
            if self.contains(&desc.name, byte_size) {
                log::debug!("Rejecting {}: already queued ({} bytes)", desc.name, byte_size);
                report.duplicates += 1;
                continue;
            }

            self.files.push(QueuedFile {
                name: desc.name,
                byte_size,
                format,
                raw_bytes: desc.bytes,
            });
            report.accepted += 1;
        }

        report
    }

    pub fn remove(&mut self, index: usize) -> Option<QueuedFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }
}

/// Human-readable size with 1024-based units, e.g. `1.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

/// Shorten long names for display, keeping the total at `max_len` chars.
pub fn truncate_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }
    let keep: String = name.chars().take(max_len.saturating_sub(3)).collect();
    format!("{keep}...")
}
