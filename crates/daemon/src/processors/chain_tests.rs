// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

/// Uppercases .txt content, keeping the basename.
struct Uppercase;

impl Processor for Uppercase {
    fn name(&self) -> &'static str {
        "test.Uppercase"
    }

    fn valid_extensions(&self) -> &'static [&'static str] {
        &["txt"]
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        let content = std::fs::read_to_string(ctx.input_file)?;
        let output = ctx.output_path(&ctx.basename())?;
        std::fs::write(&output, content.to_uppercase())?;
        Ok(output)
    }
}

/// Prefixes the basename, producing a renamed intermediate.
struct Prefix;

impl Processor for Prefix {
    fn name(&self) -> &'static str {
        "test.Prefix"
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        let output = ctx.output_path(&format!("p_{}", ctx.basename()))?;
        std::fs::copy(ctx.input_file, &output)?;
        Ok(output)
    }
}

struct AlwaysRequeue;

impl Processor for AlwaysRequeue {
    fn name(&self) -> &'static str {
        "test.AlwaysRequeue"
    }

    fn process(&self, _ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        Err(ProcessorError::Requeue("prerequisite missing".to_string()))
    }
}

struct NeedsSite;

impl Processor for NeedsSite {
    fn name(&self) -> &'static str {
        "test.NeedsSite"
    }

    fn process(&self, ctx: &ProcessContext<'_>) -> Result<PathBuf, ProcessorError> {
        Err(match (ctx.document_root, ctx.base_path) {
            (Some(_), Some(_)) => ProcessorError::Failed("should not get here".to_string()),
            _ => ProcessorError::DocumentRootAndBasePathRequired,
        })
    }
}

static UPPERCASE: Uppercase = Uppercase;
static PREFIX: Prefix = Prefix;
static ALWAYS_REQUEUE: AlwaysRequeue = AlwaysRequeue;
static NEEDS_SITE: NeedsSite = NeedsSite;

fn run(
    processors: &[&'static dyn Processor],
    input: &Path,
    working_dir: &Path,
) -> Result<PathBuf, ProcessorError> {
    let db = working_dir.join("synced.db");
    run_chain(processors, input, None, None, None, working_dir, &db)
}

#[test]
fn chain_threads_output_into_the_next_processor() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let input = src.path().join("note.txt");
    std::fs::write(&input, "hello").unwrap();

    let output = run(&[&UPPERCASE, &PREFIX], &input, work.path()).unwrap();
    assert_eq!(output.file_name().unwrap(), "p_note.txt");
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "HELLO");
}

#[test]
fn intermediate_outputs_are_deleted_but_never_the_input() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let input = src.path().join("note.txt");
    std::fs::write(&input, "hello").unwrap();

    let output = run(&[&UPPERCASE, &PREFIX], &input, work.path()).unwrap();

    // The uppercase intermediate (same basename, working dir) is gone.
    let intermediate = output.with_file_name("note.txt");
    assert!(!intermediate.exists());
    assert!(input.exists());
    assert!(output.exists());
}

#[test]
fn processors_that_decline_the_extension_are_skipped() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let input = src.path().join("image.png");
    std::fs::write(&input, "png").unwrap();

    // Uppercase only accepts .txt, so the chain output is the prefix copy of
    // the untouched input.
    let output = run(&[&UPPERCASE, &PREFIX], &input, work.path()).unwrap();
    assert_eq!(output.file_name().unwrap(), "p_image.png");
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "png");
}

#[test]
fn empty_chain_returns_the_input() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let input = src.path().join("a.bin");
    std::fs::write(&input, "x").unwrap();

    let output = run(&[], &input, work.path()).unwrap();
    assert_eq!(output, input);
}

#[test]
fn requeue_aborts_the_chain() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let input = src.path().join("note.txt");
    std::fs::write(&input, "hello").unwrap();

    let err = run(&[&ALWAYS_REQUEUE, &PREFIX], &input, work.path()).unwrap_err();
    assert!(matches!(err, ProcessorError::Requeue(_)));
}

#[test]
fn missing_document_root_skips_the_processor_non_fatally() {
    let work = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let input = src.path().join("note.txt");
    std::fs::write(&input, "hello").unwrap();

    let output = run(&[&NEEDS_SITE, &UPPERCASE], &input, work.path()).unwrap();
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "HELLO");
}
