// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sequential execution of a processor chain

use super::{would_process, ProcessContext, Processor, ProcessorError};
use std::path::{Path, PathBuf};

/// Run the processors in order and return the final output path.
///
/// Each step reads the previous step's output. A processor that does not
/// accept the input's extension (or whose input vanished) is skipped and the
/// chain continues with the same file. After a successful step the previous
/// intermediate output is deleted, unless it is the original input file.
/// [`ProcessorError::DocumentRootAndBasePathRequired`] skips the processor
/// non-fatally; a requeue request or any other error aborts the chain.
#[allow(clippy::too_many_arguments)]
pub fn run_chain(
    processors: &[&'static dyn Processor],
    input_file: &Path,
    document_root: Option<&Path>,
    base_path: Option<&str>,
    process_for_server: Option<&str>,
    working_dir: &Path,
    synced_files_db: &Path,
) -> Result<PathBuf, ProcessorError> {
    let mut current = input_file.to_path_buf();

    for processor in processors {
        if !current.exists() || !would_process(*processor, &current) {
            tracing::debug!(
                processor = processor.name(),
                file = %current.display(),
                "processor does not accept this file, skipping"
            );
            continue;
        }

        let ctx = ProcessContext {
            input_file: &current,
            original_file: input_file,
            document_root,
            base_path,
            process_for_server,
            working_dir,
            synced_files_db,
        };

        let previous = current.clone();
        match processor.process(&ctx) {
            Ok(output) => {
                tracing::debug!(
                    processor = processor.name(),
                    input = %previous.display(),
                    output = %output.display(),
                    "processor finished"
                );
                current = output;
            }
            Err(ProcessorError::DocumentRootAndBasePathRequired) => {
                tracing::warn!(
                    processor = processor.name(),
                    file = %input_file.display(),
                    "document root and/or base path not set for this source, skipping processor"
                );
            }
            Err(e @ ProcessorError::Requeue(_)) => {
                tracing::warn!(
                    processor = processor.name(),
                    file = %input_file.display(),
                    reason = %e,
                    "processor requested to requeue the file"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::error!(
                    processor = processor.name(),
                    file = %input_file.display(),
                    error = %e,
                    "processor failed"
                );
                return Err(e);
            }
        }

        if previous != current && previous != input_file {
            let _ = std::fs::remove_file(&previous);
        }
    }

    Ok(current)
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
