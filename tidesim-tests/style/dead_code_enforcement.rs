//! Dead Code Enforcement
//!
//! Production sources of the `tidesim-*` crates must not silence the
//! dead code lint. Unused engine code is removed, not hidden.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct DeadCodeViolation {
    file_path: String,
    line_number: usize,
    context: String,
}

/// Collects `.rs` files below `dir`, skipping hidden and build directories.
fn find_rust_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(name) = path.file_name()
            && (name.to_string_lossy().starts_with('.') || name == "target")
        {
            continue;
        }

        if path.is_dir() {
            find_rust_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    Ok(())
}

/// Source directories of the production crates.
fn production_source_dirs() -> Vec<PathBuf> {
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
    ["tidesim-core", "tidesim-sim", "tidesim-cli"]
        .iter()
        .map(|krate| workspace.join(krate).join("src"))
        .filter(|dir| dir.is_dir())
        .collect()
}

fn check_file(path: &Path, violations: &mut Vec<DeadCodeViolation>) -> std::io::Result<()> {
    let content = fs::read_to_string(path)?;
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[allow(") && trimmed.contains("dead_code") {
            violations.push(DeadCodeViolation {
                file_path: path.to_string_lossy().into_owned(),
                line_number: index + 1,
                context: trimmed.to_string(),
            });
        }
    }
    Ok(())
}

#[test]
fn test_no_dead_code_allowances_in_production_code() {
    let mut files = Vec::new();
    for dir in production_source_dirs() {
        find_rust_files(&dir, &mut files).unwrap();
    }
    assert!(!files.is_empty(), "no production sources found");

    let mut violations = Vec::new();
    for file in &files {
        check_file(file, &mut violations).unwrap();
    }

    for violation in &violations {
        println!(
            "{}:{}\n  {}",
            violation.file_path, violation.line_number, violation.context
        );
    }
    assert!(
        violations.is_empty(),
        "found {} #[allow(dead_code)] attribute(s) in {} file(s) checked",
        violations.len(),
        files.len()
    );
}
