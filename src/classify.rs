/*!
 * Text/binary classification and language tagging
 */

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Number of leading bytes inspected to classify a file
pub const SAMPLE_SIZE: usize = 4096;

/// Share of non-printable bytes above which a sample counts as binary
const MAX_NON_PRINTABLE_RATIO: f64 = 0.3;

/// Read up to `limit` leading bytes of a file
pub fn sample_file(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut sample = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut sample)?;
    Ok(sample)
}

fn is_printable(byte: u8) -> bool {
    matches!(byte, 0x08 | 0x09 | 0x0A | 0x0C | 0x0D | 0x1B | 0x20..=0x7E)
}

/// Classify a leading sample as binary
///
/// Any NUL byte makes the sample binary; otherwise it is binary when more
/// than 30% of its bytes fall outside the printable set. An empty sample is
/// text.
pub fn is_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }

    let non_printable = sample.iter().filter(|&&b| !is_printable(b)).count();
    non_printable as f64 / sample.len() as f64 > MAX_NON_PRINTABLE_RATIO
}

/// Infer a language tag from a relative path's extension
pub fn language_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("java") => "java",
        Some("kt") => "kotlin",
        Some("py") => "python",
        Some("ts") => "typescript",
        Some("tsx") => "tsx",
        Some("js") => "javascript",
        Some("jsx") => "jsx",
        Some("json") => "json",
        Some("yml" | "yaml") => "yaml",
        Some("xml") => "xml",
        Some("md") => "markdown",
        Some("rb") => "ruby",
        Some("go") => "go",
        Some("c") => "c",
        Some("h") => "c-header",
        Some("cpp") => "cpp",
        Some("hpp") => "cpp-header",
        Some("cs") => "csharp",
        Some("php") => "php",
        Some("html") => "html",
        Some("css") => "css",
        Some("sql") => "sql",
        Some("properties") => "properties",
        Some("gradle") => "gradle",
        Some("rs") => "rust",
        Some("toml") => "toml",
        Some("sh") => "shell",
        _ => "unknown",
    }
}
