// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lossless image optimization via the usual external tools
//!
//! GIFs go through `gifsicle`, PNGs through `pngcrush`, JPEGs through
//! `jpegtran` (progressive mode for files of 10 KB and up, where it
//! typically compresses better). The filename is kept; only the bytes
//! shrink. The tools must be installed on the host — a missing tool fails
//! the chain and the file lands on the retry path like any other error.

use super::{ProcessContext, Processor, ProcessorError};
use std::path::{Path, PathBuf};
use std::process::Command;

const PROGRESSIVE_JPEG_THRESHOLD: u64 = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageFormat {
    Gif,
    Png,
    Jpeg,
}

/// Identify the actual image format from the file's magic bytes; the
/// extension lies often enough that the original sniffed too.
fn sniff_format(path: &Path) -> Result<Option<ImageFormat>, ProcessorError> {
    let bytes = std::fs::read(path)?;
    Ok(match bytes.as_slice() {
        [0x89, b'P', b'N', b'G', ..] => Some(ImageFormat::Png),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
        _ => None,
    })
}

fn optimize_command(format: ImageFormat, input: &Path, output: &Path, size: u64) -> Command {
    match format {
        ImageFormat::Gif => {
            // gifsicle handles static and animated GIFs alike.
            let mut command = Command::new("gifsicle");
            command.arg("-O2").arg("-o").arg(output).arg(input);
            command
        }
        ImageFormat::Png => {
            let mut command = Command::new("pngcrush");
            command.arg("-rem").arg("alla").arg("-reduce").arg(input).arg(output);
            command
        }
        ImageFormat::Jpeg => {
            let mut command = Command::new("jpegtran");
            command.arg("-copy").arg("none");
            if size >= PROGRESSIVE_JPEG_THRESHOLD {
                command.arg("-progressive");
            }
            command.arg("-optimize").arg("-outfile").arg(output).arg(input);
            command
        }
    }
}

/// Optimizes GIF, PNG and JPEG files in place, keeping the basename.
pub struct KeepFilename;

impl Processor for KeepFilename {
    fn name(&self) -> &'static str {
        "image_optimizer.KeepFilename"
    }

    fn valid_extensions(&self) -> &'static [&'static str] {
        &["gif", "png", "jpg", "jpeg"]
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        let format = match sniff_format(ctx.input_file)? {
            Some(format) => format,
            // Not actually an image: pass it through untouched.
            None => return Ok(ctx.input_file.to_path_buf()),
        };
        let size = std::fs::metadata(ctx.input_file)?.len();
        let output = ctx.output_path(&ctx.basename())?;

        // The tools refuse to write onto their input, so an in-place pass
        // (input already in the working directory) goes through a sibling.
        let target = if output == ctx.input_file {
            output.with_extension("optimizing")
        } else {
            output.clone()
        };

        let result = optimize_command(format, ctx.input_file, &target, size)
            .output()
            .map_err(|e| ProcessorError::Failed(format!("cannot run the optimizer: {}", e)))?;
        if !result.status.success() {
            let _ = std::fs::remove_file(&target);
            return Err(ProcessorError::Failed(format!(
                "optimizer exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        if target != output {
            std::fs::rename(&target, &output)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
#[path = "image_optimizer_tests.rs"]
mod tests;
