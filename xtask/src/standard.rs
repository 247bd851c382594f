//! Standard test runner: single run, compare console bytes against an expected file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::build::expected_path;
use crate::qemu::run_qemu;
use crate::runner::{RunOptions, escape, first_difference};

/// Run a standard test.
///
/// Executes the example once. The console output is compared byte for byte,
/// so the `\r\n` line endings have to match too.
pub fn run_standard(example: &str, elf_path: &Path, opts: &RunOptions) -> Result<bool> {
    println!("Running in QEMU...");
    let output = run_qemu(elf_path)?;

    if !output.semihosting.is_empty() {
        println!("--- semihosting ---");
        print!("{}", String::from_utf8_lossy(&output.semihosting));
    }

    if opts.verbose {
        println!("--- console ---");
        print!("{}", escape(&output.console));
        println!("--- QEMU run end ---");
        return Ok(true);
    }

    let expected_path = expected_path(example)?;
    let filename = format!("{example}.expected");

    if opts.bless {
        let status = if expected_path.exists() {
            let existing = fs::read(&expected_path)?;
            if existing == output.console {
                "No change"
            } else {
                fs::write(&expected_path, &output.console)?;
                "Updated"
            }
        } else {
            if let Some(dir) = expected_path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&expected_path, &output.console)?;
            "Created"
        };
        println!("  {filename}: {status}");
        Ok(true)
    } else if expected_path.exists() {
        let expected = fs::read(&expected_path)
            .with_context(|| format!("Failed to read {}", expected_path.display()))?;
        match first_difference(&expected, &output.console) {
            None => {
                println!("  PASS");
                Ok(true)
            }
            Some(offset) => {
                println!("  FAIL: output differs from expected at byte {offset}");
                println!("--- expected ---");
                print!("{}", escape(&expected));
                println!("--- console ---");
                print!("{}", escape(&output.console));
                Ok(false)
            }
        }
    } else {
        println!("  No expected output file, run with --bless to create");
        println!("--- console ---");
        print!("{}", escape(&output.console));
        Ok(false)
    }
}
