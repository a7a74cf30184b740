use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ConversionError;
use crate::format::OutputFormat;
use crate::notify::{Notifier, Severity};
use crate::pipeline::ConversionResult;

pub const ARCHIVE_NAME: &str = "converted_files.zip";
pub const ARCHIVE_MIME: &str = "application/zip";

/// A downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub name: String,
    pub mime_type: &'static str,
    pub bytes: Bytes,
}

/// Packs named entries into one archive.
pub trait Archiver: Send + Sync {
    fn archive(&self, entries: &[Download]) -> Result<Vec<u8>, ConversionError>;
}

/// Zip container, entries stored as-is (they are already compressed images).
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn archive(&self, entries: &[Download]) -> Result<Vec<u8>, ConversionError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in entries {
            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| ConversionError::Archive(format!("{}: {}", entry.name, e)))?;
            zip.write_all(&entry.bytes)
                .map_err(|e| ConversionError::Archive(format!("{}: {}", entry.name, e)))?;
        }

        let cursor = zip
            .finish()
            .map_err(|e| ConversionError::Archive(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Downloads offered for one batch.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    /// One per successful result, in batch order.
    pub downloads: Vec<Download>,
    /// Present when two or more results succeeded and archiving worked.
    pub archive: Option<Download>,
    pub archive_error: Option<ConversionError>,
}

impl Bundle {
    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }

    /// The single artifact to hand out: the archive if there is one,
    /// otherwise the only download.
    pub fn primary(&self) -> Option<&Download> {
        self.archive
            .as_ref()
            .or_else(|| (self.downloads.len() == 1).then(|| &self.downloads[0]))
    }
}

pub struct ResultBundler {
    archiver: Arc<dyn Archiver>,
}

impl Default for ResultBundler {
    fn default() -> Self {
        Self::new(Arc::new(ZipArchiver))
    }
}

impl ResultBundler {
    pub fn new(archiver: Arc<dyn Archiver>) -> Self {
        Self { archiver }
    }

    /// Archive failures are reported once through `notifier` and never retried.
    pub fn bundle(&self, results: &[ConversionResult], notifier: &dyn Notifier) -> Bundle {
        let downloads = unique_names(
            results
                .iter()
                .filter(|r| r.is_success())
                .map(|r| Download {
                    name: r.output_name.clone(),
                    mime_type: r.target_format.mime_type(),
                    bytes: r.encoded_bytes.clone(),
                })
                .collect(),
        );

        let mut bundle = Bundle {
            downloads,
            ..Bundle::default()
        };
        if bundle.downloads.len() < 2 {
            return bundle;
        }

        match self.archiver.archive(&bundle.downloads) {
            Ok(bytes) => {
                log::debug!(
                    "Archived {} files into {} ({} bytes)",
                    bundle.downloads.len(),
                    ARCHIVE_NAME,
                    bytes.len()
                );
                bundle.archive = Some(Download {
                    name: ARCHIVE_NAME.to_string(),
                    mime_type: ARCHIVE_MIME,
                    bytes: Bytes::from(bytes),
                });
            }
            Err(e) => {
                log::warn!("Could not build {}: {}", ARCHIVE_NAME, e);
                notifier.notify(
                    Severity::Warning,
                    &format!("Bundle download unavailable: {}", e),
                );
                bundle.archive_error = Some(e);
            }
        }
        bundle
    }
}

/// `a.png` and `a.jpg` both become `a.jpeg`; later collisions get ` (n)`.
fn unique_names(mut downloads: Vec<Download>) -> Vec<Download> {
    let mut seen = HashSet::new();
    for download in &mut downloads {
        if seen.insert(download.name.clone()) {
            continue;
        }
        let (stem, ext) = match download.name.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
            None => (download.name.clone(), String::new()),
        };
        let mut n = 1;
        let mut candidate = format!("{stem} ({n}){ext}");
        while !seen.insert(candidate.clone()) {
            n += 1;
            candidate = format!("{stem} ({n}){ext}");
        }
        download.name = candidate;
    }
    downloads
}

/// Extension-to-MIME lookup for callers holding only a file name.
pub fn mime_for_name(name: &str) -> &'static str {
    if name.ends_with(".zip") {
        return ARCHIVE_MIME;
    }
    name.rsplit_once('.')
        .and_then(|(_, ext)| ext.parse::<OutputFormat>().ok())
        .map(|f| f.mime_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollectingNotifier;
    use crate::pipeline::Outcome;
    use std::io::Read;

    fn ok(name: &str, body: &[u8]) -> ConversionResult {
        ConversionResult {
            source_name: name.to_string(),
            target_format: OutputFormat::Png,
            output_name: crate::format::output_name(name, OutputFormat::Png),
            encoded_bytes: Bytes::copy_from_slice(body),
            byte_size: body.len() as u64,
            outcome: Outcome::Success,
        }
    }

    fn failed(name: &str) -> ConversionResult {
        ConversionResult {
            outcome: Outcome::Failure(ConversionError::Decode("bad".into())),
            encoded_bytes: Bytes::new(),
            byte_size: 0,
            ..ok(name, b"")
        }
    }

    struct BrokenArchiver;

    impl Archiver for BrokenArchiver {
        fn archive(&self, _: &[Download]) -> Result<Vec<u8>, ConversionError> {
            Err(ConversionError::Archive("archiving unavailable".into()))
        }
    }

    #[test]
    fn test_single_success_has_no_archive() {
        let notifier = CollectingNotifier::new();
        let bundle = ResultBundler::default().bundle(&[ok("a.bmp", b"A"), failed("b.bmp")], &notifier);
        assert_eq!(bundle.downloads.len(), 1);
        assert!(bundle.archive.is_none());
        assert_eq!(bundle.primary().map(|d| d.name.as_str()), Some("a.png"));
        assert_eq!(bundle.primary().map(|d| d.mime_type), Some("image/png"));
    }

    #[test]
    fn test_archive_contains_every_success() {
        let notifier = CollectingNotifier::new();
        let bundle = ResultBundler::default().bundle(
            &[ok("a.bmp", b"AAA"), failed("x.gif"), ok("b.tiff", b"BB")],
            &notifier,
        );
        let archive = bundle.archive.as_ref().unwrap();
        assert_eq!(archive.name, "converted_files.zip");
        assert_eq!(bundle.primary(), Some(archive));

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes.to_vec())).unwrap();
        assert_eq!(zip.len(), 2);
        let mut content = Vec::new();
        zip.by_name("b.png").unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"BB");
        assert!(notifier.snapshot().is_empty());
    }

    #[test]
    fn test_colliding_names_are_disambiguated() {
        let notifier = CollectingNotifier::new();
        let bundle = ResultBundler::default().bundle(
            &[ok("a.bmp", b"1"), ok("a.gif", b"2"), ok("a.tiff", b"3")],
            &notifier,
        );
        let names: Vec<_> = bundle.downloads.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a.png", "a (1).png", "a (2).png"]);
        let zip = zip::ZipArchive::new(Cursor::new(bundle.archive.unwrap().bytes.to_vec())).unwrap();
        assert_eq!(zip.len(), 3);
    }

    #[test]
    fn test_archive_failure_is_a_warning() {
        let notifier = CollectingNotifier::new();
        let bundle = ResultBundler::new(Arc::new(BrokenArchiver))
            .bundle(&[ok("a.bmp", b"1"), ok("b.bmp", b"2")], &notifier);
        assert!(bundle.archive.is_none());
        assert_eq!(bundle.downloads.len(), 2);
        assert!(bundle.archive_error.is_some());
        let notes = notifier.snapshot();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].severity, Severity::Warning);
    }

    #[test]
    fn test_nothing_to_bundle() {
        let bundle = ResultBundler::default().bundle(&[failed("a.png")], &CollectingNotifier::new());
        assert!(bundle.is_empty());
        assert!(bundle.primary().is_none());
    }

    #[test]
    fn test_mime_for_name() {
        assert_eq!(mime_for_name("x.jpeg"), "image/jpeg");
        assert_eq!(mime_for_name("converted_files.zip"), "application/zip");
        assert_eq!(mime_for_name("x.bin"), "application/octet-stream");
    }
}
