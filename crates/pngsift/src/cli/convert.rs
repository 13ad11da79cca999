//! The conversion command: open the files, stream the image, print a report.

use anyhow::Context;
use clap::Args;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use pngsift_core::{shrink_png, Config, SiftOptions, SiftReport};

/// Arguments for a conversion run.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input PNG file
    pub input: PathBuf,

    /// Output PNG file
    pub output: PathBuf,

    /// Integer sample stride; keeps every Nth pixel of every Nth row
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub sample_rate: u32,

    /// I/O chunk buffer size in bytes (defaults to the config value)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Report format printed to stdout after a successful run
    #[arg(long, value_enum, default_value = "text")]
    pub report: ReportFormat,
}

/// Report output formats.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// One human-readable summary line
    Text,
    /// Pretty-printed JSON report
    Json,
}

/// Execute the conversion.
pub fn execute(args: ConvertArgs, config: &Config) -> anyhow::Result<()> {
    let options = SiftOptions {
        sample_rate: args.sample_rate,
        chunk_size: args.chunk_size.unwrap_or(config.io.chunk_size),
    };

    let source = File::open(&args.input)
        .with_context(|| format!("cannot open input file {:?}", args.input))?;
    let sink = File::create(&args.output)
        .with_context(|| format!("cannot create output file {:?}", args.output))?;

    tracing::info!(
        "converting {:?} -> {:?} at sample rate {}",
        args.input,
        args.output,
        options.sample_rate
    );

    let report = match shrink_png(BufReader::new(source), BufWriter::new(sink), &options) {
        Ok(report) => report,
        Err(e) => {
            // Rows are flushed as they are written, so the sink may hold a
            // truncated image; don't leave it behind.
            if std::fs::remove_file(&args.output).is_ok() {
                tracing::warn!("removed partial output {:?}", args.output);
            }
            return Err(e).with_context(|| format!("failed to convert {:?}", args.input));
        }
    };

    tracing::info!(
        "wrote {:?}: {}x{} from {}x{}",
        args.output,
        report.output_width,
        report.output_height,
        report.source_width,
        report.source_height
    );
    print_report(&args.report, &report)?;
    Ok(())
}

fn print_report(format: &ReportFormat, report: &SiftReport) -> anyhow::Result<()> {
    match format {
        ReportFormat::Text => {
            println!(
                "{}x{} -> {}x{} (rate {}, {} rows, {} bytes in, {} bytes out)",
                report.source_width,
                report.source_height,
                report.output_width,
                report.output_height,
                report.sample_rate,
                report.rows_written,
                report.bytes_read,
                report.bytes_written
            );
        }
        ReportFormat::Json => {
            println!("{}", report.to_json(true)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pngsift_core::codec::{ImageHeader, RowEncoder};
    use std::path::Path;

    /// Write a small RGB fixture with the core encoder.
    fn write_fixture(path: &Path, width: u32, height: u32) {
        let header = ImageHeader {
            width,
            height,
            bit_depth: 8,
            color_type: 2,
            compression: 0,
            filter: 0,
            interlace: 0,
        };
        let file = File::create(path).unwrap();
        let mut encoder = RowEncoder::new(file, &header).unwrap();
        let row_bytes = (width * 3) as usize;
        for y in 0..height {
            let row: Vec<u8> = (0..row_bytes).map(|x| (x as u32 + y) as u8).collect();
            encoder.write_row(&row).unwrap();
        }
        encoder.finish().unwrap();
    }

    fn args(input: &Path, output: &Path, sample_rate: u32) -> ConvertArgs {
        ConvertArgs {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            sample_rate,
            chunk_size: None,
            report: ReportFormat::Text,
        }
    }

    #[test]
    fn test_execute_converts_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_fixture(&input, 8, 6);

        execute(args(&input, &output, 2), &Config::default()).unwrap();
        assert!(output.exists());

        // The output is itself a convertible PNG
        let next = dir.path().join("out2.png");
        execute(args(&output, &next, 1), &Config::default()).unwrap();
        assert!(next.exists());
    }

    #[test]
    fn test_execute_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("absent.png");
        let output = dir.path().join("out.png");
        let err = execute(args(&input, &output, 2), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("cannot open input file"));
    }

    #[test]
    fn test_partial_output_removed_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bad.png");
        let output = dir.path().join("out.png");
        std::fs::write(&input, b"this is not a png at all").unwrap();

        let result = execute(args(&input, &output, 2), &Config::default());
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_sample_rate_beyond_image_fails_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_fixture(&input, 4, 4);

        let result = execute(args(&input, &output, 9), &Config::default());
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_chunk_size_override() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_fixture(&input, 16, 16);

        let mut convert_args = args(&input, &output, 4);
        convert_args.chunk_size = Some(16);
        execute(convert_args, &Config::default()).unwrap();
        assert!(output.exists());
    }
}
