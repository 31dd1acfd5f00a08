// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-hash basenames for far-future-expires caching
//!
//! `logo.gif` becomes `logo_<md5 of content>.gif`: every content change
//! yields a new artifact name, so destinations can serve the old one with
//! unbounded cache lifetimes while the new one propagates.

use super::{ProcessContext, Processor, ProcessorError};
use md5::Digest;
use std::io::Read;
use std::path::PathBuf;

pub struct Md5;

impl Processor for Md5 {
    fn name(&self) -> &'static str {
        "unique_filename.Md5"
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        let digest = hash_file(ctx.input_file)?;
        let (stem, ext) = ctx.name_parts();
        let output = ctx.output_path(&format!("{}_{}{}", stem, digest, ext))?;
        if output != ctx.input_file {
            std::fs::copy(ctx.input_file, &output)?;
        }
        Ok(output)
    }
}

fn hash_file(path: &std::path::Path) -> Result<String, ProcessorError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = md5::Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
