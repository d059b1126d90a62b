/*!
 * Markdown artifact writer
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{open_output, ArtifactWriter, WriterEvent, WriterState, ARTIFACT_VERSION};
use crate::error::{IoResultExt, Result};
use crate::types::{Chunk, FileRecord, RunMetadata};

static ANCHOR_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s/_-]").unwrap());
static ANCHOR_JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[/\s]+").unwrap());

/// Markdown writer for flattened file trees
///
/// Every fenced block uses a fence longer than any backtick run inside it,
/// and the body is always followed by exactly one newline before the
/// closing fence.
pub struct MarkdownWriter {
    /// Output file path
    path: PathBuf,
    /// Open writer, present between `start_document` and `close`
    writer: Option<BufWriter<File>>,
    /// Paths of every file entry, in emission order
    files: Vec<String>,
    state: WriterState,
}

impl MarkdownWriter {
    /// Create a writer that will create `path` when the document starts
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            files: Vec::new(),
            state: WriterState::NotStarted,
        }
    }

    fn w(&mut self, s: &str) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(s.as_bytes()).for_output(&self.path),
            None => crate::bail!(Writer, "output {} is not open", self.path.display()),
        }
    }

    fn fenced(&mut self, info: &str, body: &str) -> Result<()> {
        let fence = fence_for(body);
        self.w(&format!("{}{}\n", fence, info))?;
        self.w(body)?;
        self.w(&format!("\n{}\n\n", fence))
    }
}

/// Backtick fence one longer than the longest run in `body`, at least three
fn fence_for(body: &str) -> String {
    let longest = body
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat((longest + 1).max(3))
}

/// Neutralise angle brackets in inline metadata
fn esc(s: &str) -> String {
    s.replace('<', "&lt;").replace('>', "&gt;")
}

/// Index link label: metadata escaping plus brackets
fn link_label(path: &str) -> String {
    esc(path).replace('[', "\\[").replace(']', "\\]")
}

/// Anchor slug for a file section heading
fn anchor(path: &str) -> String {
    let lower = path.to_lowercase();
    let stripped = ANCHOR_STRIP.replace_all(&lower, "");
    ANCHOR_JOIN.replace_all(&stripped, "-").into_owned()
}

impl ArtifactWriter for MarkdownWriter {
    fn start_document(&mut self, metadata: &RunMetadata) -> Result<()> {
        self.state.advance(WriterEvent::StartDocument)?;
        self.writer = Some(open_output(&self.path)?);

        self.w("# Codebase Snapshot (Markdown)\n\n")?;
        self.w(&format!("- root: {}\n", esc(&metadata.root)))?;
        self.w(&format!(
            "- generated_at: {}\n",
            esc(&metadata.generated_at_string())
        ))?;
        if let Some(branch) = &metadata.branch {
            self.w(&format!("- branch: {}\n", esc(branch)))?;
        }
        if let Some(commit) = &metadata.commit {
            self.w(&format!("- commit: {}\n", esc(commit)))?;
        }
        self.w(&format!("- version: {}\n\n", ARTIFACT_VERSION))?;

        self.w("## Config\n\n")?;
        self.w(&format!(
            "- includes: {}\n",
            esc(&metadata.includes.join(", "))
        ))?;
        self.w(&format!(
            "- excludes: {}\n",
            esc(&metadata.excludes.join(", "))
        ))?;
        self.w(&format!("- max_file_bytes: {}\n", metadata.max_file_bytes))?;
        self.w(&format!("- chunk_bytes: {}\n\n", metadata.chunk_bytes))?;
        self.w("---\n\n## Files\n\n")
    }

    fn write_file_header(&mut self, record: &FileRecord) -> Result<()> {
        self.state.advance(WriterEvent::FileHeader)?;
        self.files.push(record.path.clone());

        self.w(&format!("### {}\n\n", esc(&record.path)))?;
        self.w(&format!(
            "- lang: {}\n- size_bytes: {}\n- sha256: {}\n- binary: {}\n- encoding: {}\n\n",
            esc(&record.lang),
            record.size_bytes,
            esc(&record.sha256),
            record.is_binary,
            esc(&record.encoding)
        ))
    }

    fn write_text_content(&mut self, text: &str) -> Result<()> {
        self.state.advance(WriterEvent::Content)?;
        self.fenced("", text)
    }

    fn write_chunks(&mut self, chunks: &[Chunk<'_>]) -> Result<()> {
        self.state.advance(WriterEvent::Content)?;
        self.w("> This file is chunked for size. Combine chunks in order.\n\n")?;
        for chunk in chunks {
            self.w(&format!(
                "#### chunk {} (offset {})\n\n",
                chunk.index, chunk.offset
            ))?;
            self.fenced("", chunk.text)?;
        }
        Ok(())
    }

    fn write_binary_payload(&mut self, bytes: &[u8]) -> Result<()> {
        self.state.advance(WriterEvent::Content)?;
        self.w(&format!(
            "<details>\n<summary>binary content (base64, {} bytes)</summary>\n\n",
            bytes.len()
        ))?;
        self.fenced("base64", &STANDARD.encode(bytes))?;
        self.w("</details>\n\n")
    }

    fn write_error(&mut self, message: &str) -> Result<()> {
        self.state.advance(WriterEvent::Error)?;
        self.w(&format!("> Error while reading file: {}\n\n", esc(message)))
    }

    fn end_file(&mut self) -> Result<()> {
        self.state.advance(WriterEvent::EndFile)?;
        self.w("---\n\n")
    }

    fn end_document(&mut self, aggregate_digest: &str) -> Result<()> {
        self.state.advance(WriterEvent::EndDocument)?;
        self.w(&format!(
            "## Digest\n\n- algo: sha256\n- value: {}\n\n",
            esc(aggregate_digest)
        ))?;

        self.w("## Index\n\n")?;
        let links: Vec<String> = self
            .files
            .iter()
            .map(|path| format!("- [{}](#{})\n", link_label(path), anchor(path)))
            .collect();
        for link in links {
            self.w(&link)?;
        }
        self.w("\n")
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().for_output(&self.path)?;
        }
        self.state = WriterState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn metadata() -> RunMetadata {
        RunMetadata {
            root: "/repo".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            branch: None,
            commit: Some("abc123".to_string()),
            includes: vec![],
            excludes: vec!["target/**".to_string()],
            max_file_bytes: 10,
            chunk_bytes: 4,
        }
    }

    fn record(path: &str, is_binary: bool) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            lang: "markdown".to_string(),
            size_bytes: 5,
            sha256: "ab".to_string(),
            is_binary,
            encoding: if is_binary { "binary" } else { "utf-8" }.to_string(),
        }
    }

    #[test]
    fn test_fence_for() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("has ``` inside"), "````");
        assert_eq!(fence_for("````` five"), "``````");
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("src/Main.rs"), "src-mainrs");
        assert_eq!(anchor("docs/My File.md"), "docs-my-filemd");
    }

    #[test]
    fn test_link_label() {
        assert_eq!(link_label("src/a.rs"), "src/a.rs");
        assert_eq!(link_label("docs/[draft] <v2>.md"), "docs/\\[draft\\] &lt;v2&gt;.md");
    }

    #[test]
    fn test_document_sections_and_index() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.md");
        let mut writer = MarkdownWriter::new(&out);

        writer.start_document(&metadata()).unwrap();
        writer.write_file_header(&record("docs/a.md", false)).unwrap();
        writer.write_text_content("```rust\nfn x() {}\n```").unwrap();
        writer.end_file().unwrap();
        writer.write_file_header(&record("b.bin", true)).unwrap();
        writer.write_binary_payload(&[0, 1, 2]).unwrap();
        writer.end_file().unwrap();
        writer.write_file_header(&record("c.txt", false)).unwrap();
        let chunks = [
            Chunk { index: 0, offset: 0, text: "abcd" },
            Chunk { index: 1, offset: 4, text: "e" },
        ];
        writer.write_chunks(&chunks).unwrap();
        writer.write_error("IoError: <boom>").unwrap();
        writer.end_file().unwrap();
        writer.end_document("feed").unwrap();
        writer.close().unwrap();

        let md = fs::read_to_string(&out).unwrap();
        assert!(md.starts_with("# Codebase Snapshot (Markdown)\n\n- root: /repo\n"));
        assert!(md.contains("- generated_at: 2024-01-02T03:04:05.000Z\n"));
        assert!(!md.contains("- branch:"));
        assert!(md.contains("- commit: abc123\n"));
        assert!(md.contains("- excludes: target/**\n"));
        assert!(md.contains("````\n```rust\nfn x() {}\n```\n````\n"));
        assert!(md.contains("<summary>binary content (base64, 3 bytes)</summary>"));
        assert!(md.contains("```base64\nAAEC\n```\n"));
        assert!(md.contains("#### chunk 1 (offset 4)\n\n```\ne\n```\n"));
        assert!(md.contains("> Error while reading file: IoError: &lt;boom&gt;\n"));
        assert!(md.contains("## Digest\n\n- algo: sha256\n- value: feed\n"));
        assert!(md.ends_with(
            "## Index\n\n- [docs/a.md](#docs-amd)\n- [b.bin](#bbin)\n- [c.txt](#ctxt)\n\n"
        ));
        assert_eq!(md.matches("\n### ").count(), 3);
        assert_eq!(md.matches("---\n\n").count(), 4);
    }

    #[test]
    fn test_close_without_start_is_noop() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("never.md");
        let mut writer = MarkdownWriter::new(&out);
        writer.close().unwrap();
        assert!(!out.exists());
    }
}
