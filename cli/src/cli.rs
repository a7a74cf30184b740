use std::path::PathBuf;
use std::time::Duration;

use batch_converter_core::config::{ConversionConfig, Quality};
use batch_converter_core::format::OutputFormat;
use clap::{Parser, Subcommand};

/// Convert batches of images and video frames into one image format
#[derive(Debug, Parser)]
#[command(name = "batch_converter", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// State file holding conversion history and usage counters
    #[arg(
        long,
        global = true,
        env = "BATCH_CONVERTER_STATE",
        default_value = "batch_converter_state.json"
    )]
    pub state: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert images (png, jpeg, gif, bmp, tiff) and videos (webm, mp4, avi, mov)
    Convert {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target format (png, jpg, jpeg, gif, bmp, tiff, webp)
        #[arg(long, short = 't', value_name = "FORMAT")]
        to: OutputFormat,

        /// Quality for lossy formats (0-100)
        #[arg(short, long, default_value_t = 92, value_parser = clap::value_parser!(u8).range(0..=100))]
        quality: u8,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Process directories recursively
        #[arg(short, long)]
        recursive: bool,

        /// Give up on a video's frame after this many milliseconds
        #[arg(long, default_value_t = 10_000)]
        frame_timeout_ms: u64,

        /// Do not write converted_files.zip for multi-file batches
        #[arg(long)]
        no_archive: bool,
    },

    /// Show recent conversions
    History {
        /// Forget all recorded conversions
        #[arg(long)]
        clear: bool,
    },

    /// Show cumulative usage counters
    Stats,
}

impl Command {
    /// Batch settings carried by `convert`; other commands have none.
    pub fn to_config(&self) -> Option<ConversionConfig> {
        match self {
            Command::Convert {
                to,
                quality,
                frame_timeout_ms,
                ..
            } => Some(ConversionConfig {
                target: *to,
                quality: Quality::new(*quality),
                frame_timeout: Duration::from_millis(*frame_timeout_ms),
                ..ConversionConfig::default()
            }),
            Command::History { .. } | Command::Stats => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "batch_converter",
            "convert",
            "a.png",
            "clips",
            "--to",
            "jpg",
            "-q",
            "75",
        ])
        .unwrap();
        match cli.command {
            Command::Convert { inputs, to, quality, frame_timeout_ms, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(to, OutputFormat::Jpeg);
                assert_eq!(quality, 75);
                assert_eq!(frame_timeout_ms, 10_000);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_format_and_bad_quality() {
        assert!(Cli::try_parse_from(["batch_converter", "convert", "a.png", "--to", "avif"]).is_err());
        assert!(
            Cli::try_parse_from(["batch_converter", "convert", "a.png", "--to", "png", "-q", "101"]).is_err()
        );
    }

    #[test]
    fn test_to_config() {
        let cli = Cli::try_parse_from([
            "batch_converter",
            "convert",
            "clip.mp4",
            "--to",
            "webp",
            "-q",
            "40",
            "--frame-timeout-ms",
            "250",
        ])
        .unwrap();
        let config = cli.command.to_config().unwrap();
        assert_eq!(config.target, OutputFormat::Webp);
        assert_eq!(config.quality.value(), 40);
        assert_eq!(config.frame_timeout, Duration::from_millis(250));
        assert_eq!(config.history_limit, 20);

        let stats = Cli::try_parse_from(["batch_converter", "stats"]).unwrap();
        assert!(stats.command.to_config().is_none());
    }
}
