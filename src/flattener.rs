/*!
 * Selection and serialization pipeline
 *
 * discover -> filter -> sort -> per file: stat, sample, hash, read, chunk,
 * emit -> aggregate digest. One file is finished before the next starts.
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indicatif::ProgressBar;

use crate::chunker::chunk_text;
use crate::classify::{is_binary, language_for, sample_file, SAMPLE_SIZE};
use crate::config::Config;
use crate::digest::{file_sha256, AggregateDigest};
use crate::discover::Discoverer;
use crate::error::{FlattenError, IoResultExt, Result};
use crate::git;
use crate::matcher::PathMatcher;
use crate::report::{FileFailure, RunReport};
use crate::types::{FileOutcome, FileRecord, RunMetadata, BINARY_ENCODING, TEXT_ENCODING};
use crate::utils::to_posix;
use crate::writer::{create_writer, ArtifactWriter};

/// A selected file: relative POSIX path and absolute location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub relative: String,
    pub absolute: PathBuf,
}

/// What was read for a file, before anything is emitted
enum Body {
    Text(String),
    Binary(Vec<u8>),
    Omitted,
}

/// Drives one flattening run
pub struct Flattener {
    /// Run configuration
    config: Config,
    /// Progress bar
    pub progress: Arc<ProgressBar>,
}

impl Flattener {
    /// Create a new flattener
    pub fn new(config: Config, progress: Arc<ProgressBar>) -> Self {
        Self { config, progress }
    }

    /// Flatten the configured root into the configured output
    ///
    /// Per-file failures are annotated in the artifact and listed in the
    /// report. Any other error aborts the run and removes the partial output.
    pub fn run(&self) -> Result<RunReport> {
        let started = Instant::now();

        let root = fs::canonicalize(&self.config.root).map_err(|e| {
            FlattenError::PathNotFound(format!("{}: {}", self.config.root.display(), e))
        })?;
        let output = prepare_output(&self.config.output_file)?;

        let (branch, commit) = git::branch_and_commit(&root);
        let metadata = RunMetadata {
            root: root.display().to_string(),
            generated_at: self.config.generated_at.unwrap_or_else(Utc::now),
            branch,
            commit,
            includes: self.config.includes.clone(),
            excludes: self.config.excludes.clone(),
            max_file_bytes: self.config.max_file_bytes,
            chunk_bytes: self.config.chunk_bytes,
        };

        let mut writer = create_writer(self.config.format, &output);
        let result = self.write_document(writer.as_mut(), &metadata, &root, &output);
        let closed = writer.close();

        let mut report = match result.and_then(|report| closed.map(|_| report)) {
            Ok(report) => report,
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&output) {
                    log::debug!("Could not remove partial output: {}", remove_err);
                }
                return Err(e);
            }
        };

        report.output_file = output.display().to_string();
        report.duration = started.elapsed();
        Ok(report)
    }

    fn write_document(
        &self,
        writer: &mut dyn ArtifactWriter,
        metadata: &RunMetadata,
        root: &Path,
        output: &Path,
    ) -> Result<RunReport> {
        writer.start_document(metadata)?;

        let manifest = self.selection_manifest(root, output)?;
        self.progress.set_length(manifest.len() as u64);

        let mut aggregate = AggregateDigest::new();
        let mut report = RunReport::default();

        for file in &manifest {
            self.progress.set_message(file.relative.clone());
            let (size, outcome) = self.process_file(writer, &mut aggregate, file, &mut report)?;
            report.record(outcome, size);
            self.progress.inc(1);
        }

        let digest = aggregate.finalize();
        writer.end_document(&digest)?;

        report.aggregate_digest = digest;
        Ok(report)
    }

    /// Selected files in manifest order: filtered, deduplicated and sorted by
    /// relative path
    pub fn selection_manifest(&self, root: &Path, output: &Path) -> Result<Vec<SelectedFile>> {
        let compiler = self.config.glob_engine.compiler();
        let matcher = PathMatcher::new(
            &self.config.includes,
            &self.config.excludes,
            compiler.as_ref(),
        )?;

        let discoverer = Discoverer::new(
            root,
            self.config.honor_gitignore,
            self.config.follow_symlinks,
        );

        let mut selected = BTreeMap::new();
        for absolute in discoverer.discover() {
            if absolute == output {
                continue;
            }
            let relative = match absolute.strip_prefix(root) {
                Ok(relative) => to_posix(relative),
                Err(_) => {
                    log::debug!("Skipping {} outside of root", absolute.display());
                    continue;
                }
            };
            if matcher.included(&relative) {
                selected.insert(relative, absolute);
            }
        }

        log::debug!("Selected {} files", selected.len());
        Ok(selected
            .into_iter()
            .map(|(relative, absolute)| SelectedFile { relative, absolute })
            .collect())
    }

    /// Emit one file entry; only writer failures are returned as errors
    fn process_file(
        &self,
        writer: &mut dyn ArtifactWriter,
        aggregate: &mut AggregateDigest,
        file: &SelectedFile,
        report: &mut RunReport,
    ) -> Result<(u64, FileOutcome)> {
        let lang = language_for(&file.relative);
        log::trace!("Processing {}", file.relative);

        let record = match probe(&file.absolute) {
            Ok((size_bytes, binary, sha256)) => FileRecord {
                path: file.relative.clone(),
                lang: lang.to_string(),
                size_bytes,
                sha256,
                is_binary: binary,
                encoding: if binary { BINARY_ENCODING } else { TEXT_ENCODING }.to_string(),
            },
            Err(e) => {
                log::warn!("Failed to process {}: {}", file.relative, e);
                writer.write_file_header(&FileRecord::unreadable(&file.relative, lang))?;
                writer.write_error(&e.annotation())?;
                writer.end_file()?;
                report.failures.push(FileFailure::new(&file.relative, &e));
                return Ok((0, FileOutcome::Failed));
            }
        };

        self.emit_file(writer, aggregate, file, record, report)
    }

    /// Emit a probed file: fold its digest, then header, body or error, end
    ///
    /// A read failure after the header is annotated in place; the digest
    /// computed by the probe still counts.
    fn emit_file(
        &self,
        writer: &mut dyn ArtifactWriter,
        aggregate: &mut AggregateDigest,
        file: &SelectedFile,
        record: FileRecord,
        report: &mut RunReport,
    ) -> Result<(u64, FileOutcome)> {
        aggregate.fold(&record.sha256);
        writer.write_file_header(&record)?;

        let outcome = match self.read_body(&file.absolute, &record) {
            Ok(body) => self.write_body(writer, &record, body)?,
            Err(e) => {
                log::warn!("Failed to read {}: {}", file.relative, e);
                writer.write_error(&e.annotation())?;
                report.failures.push(FileFailure::new(&file.relative, &e));
                FileOutcome::Failed
            }
        };

        writer.end_file()?;
        Ok((record.size_bytes, outcome))
    }

    fn read_body(&self, path: &Path, record: &FileRecord) -> Result<Body> {
        let inline = record.size_bytes <= self.config.max_file_bytes;

        if record.is_binary {
            if !inline {
                return Ok(Body::Omitted);
            }
            return Ok(Body::Binary(fs::read(path).for_file(path)?));
        }

        let bytes = fs::read(path).for_file(path)?;
        Ok(Body::Text(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn write_body(
        &self,
        writer: &mut dyn ArtifactWriter,
        record: &FileRecord,
        body: Body,
    ) -> Result<FileOutcome> {
        let text = match body {
            Body::Omitted => return Ok(FileOutcome::Omitted),
            Body::Binary(bytes) => {
                writer.write_binary_payload(&bytes)?;
                return Ok(FileOutcome::Binary);
            }
            Body::Text(text) => text,
        };

        let chunk_bytes = self.config.chunk_bytes;
        let inline = record.size_bytes <= self.config.max_file_bytes
            && (chunk_bytes == 0 || record.size_bytes <= chunk_bytes);
        if inline {
            writer.write_text_content(&text)?;
            return Ok(FileOutcome::Inline);
        }

        let size = usize::try_from(chunk_bytes.max(1)).unwrap_or(usize::MAX);
        let chunks: Vec<_> = chunk_text(&text, size)?.collect();
        writer.write_chunks(&chunks)?;
        Ok(FileOutcome::Chunked(chunks.len()))
    }
}

/// Stat, classify and hash a file: `(size, is_binary, sha256)`
fn probe(path: &Path) -> Result<(u64, bool, String)> {
    let size = fs::metadata(path).for_file(path)?.len();
    let sample = sample_file(path, SAMPLE_SIZE).for_file(path)?;
    let sha256 = file_sha256(path).for_file(path)?;
    Ok((size, is_binary(&sample), sha256))
}

/// Make the output path absolute and create its parent directory
fn prepare_output(output: &Path) -> Result<PathBuf> {
    let absolute = if output.is_absolute() {
        output.to_path_buf()
    } else {
        std::env::current_dir()?.join(output)
    };

    let parent = absolute.parent().unwrap_or_else(|| Path::new("/"));
    fs::create_dir_all(parent).for_output(parent)?;

    // resolve the parent so the output is recognised inside a symlinked root
    let parent = fs::canonicalize(parent).for_output(parent)?;
    match absolute.file_name() {
        Some(name) => Ok(parent.join(name)),
        None => crate::bail!(Config, "output path {} has no file name", output.display()),
    }
}
