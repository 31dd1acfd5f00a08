// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basename canonicalizers: replace awkward characters in filenames

use super::{ProcessContext, Processor, ProcessorError};
use std::path::PathBuf;

fn replace_in_basename(
    ctx: &ProcessContext<'_>,
    from: char,
    to: char,
) -> Result<PathBuf, ProcessorError> {
    let basename = ctx.basename().replace(from, &to.to_string());
    let output = ctx.output_path(&basename)?;
    if output != ctx.input_file {
        std::fs::copy(ctx.input_file, &output)?;
    }
    Ok(output)
}

/// `my file.png` becomes `my_file.png`.
pub struct SpacesToUnderscores;

impl Processor for SpacesToUnderscores {
    fn name(&self) -> &'static str {
        "filename.SpacesToUnderscores"
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        replace_in_basename(ctx, ' ', '_')
    }
}

/// `my file.png` becomes `my-file.png`.
pub struct SpacesToDashes;

impl Processor for SpacesToDashes {
    fn name(&self) -> &'static str {
        "filename.SpacesToDashes"
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        replace_in_basename(ctx, ' ', '-')
    }
}
