//! Batch conversion of images and video frames into one output format.
//!
//! Files enter through [`intake`], are converted one at a time by
//! [`pipeline`] (with [`video`] frame extraction and [`encoder`]), and are
//! driven and accounted for by [`batch::Converter`]. Successful outputs are
//! packaged by [`bundle`]; [`history`] and [`stats`] persist through a
//! [`store::KeyValueStore`].

pub mod batch;
pub mod bundle;
pub mod config;
pub mod encoder;
pub mod error;
pub mod format;
pub mod history;
pub mod intake;
pub mod notify;
pub mod pipeline;
pub mod stats;
pub mod store;
pub mod video;

pub use batch::{BatchRun, BatchState, Converter, ConverterParts, Progress};
pub use config::{ConversionConfig, Quality};
pub use error::ConversionError;
pub use format::{InputFormat, MediaKind, OutputFormat};
pub use intake::{FileDescriptor, IntakeReport, QueuedFile};
pub use pipeline::{ConversionResult, Outcome};
