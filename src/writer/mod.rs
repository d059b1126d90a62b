/*!
 * Streaming artifact writers
 *
 * Both formats share one event contract, driven strictly in order:
 *
 * ```text
 * start_document
 *   (write_file_header [content | chunks | binary] [write_error] end_file)*
 * end_document
 * close
 * ```
 */

mod markdown;
mod xml;

pub use markdown::MarkdownWriter;
pub use xml::XmlWriter;

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use clap::ValueEnum;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::bail;
use crate::error::{IoResultExt, Result};
use crate::types::{Chunk, FileRecord, RunMetadata};

/// Version stamped into every artifact
pub const ARTIFACT_VERSION: &str = "1.0";

/// Output artifact format
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Display, EnumString, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// XML dialect with CDATA content
    #[default]
    Xml,
    /// Markdown with fenced blocks
    Md,
}

impl OutputFormat {
    /// Default file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Md => "md",
        }
    }
}

/// Sink for the structural events of one run
pub trait ArtifactWriter {
    /// Open the output and emit document metadata
    fn start_document(&mut self, metadata: &RunMetadata) -> Result<()>;

    /// Open a file entry
    fn write_file_header(&mut self, record: &FileRecord) -> Result<()>;

    /// Emit a file's text as one block
    fn write_text_content(&mut self, text: &str) -> Result<()>;

    /// Emit a file's text as ordered chunks
    fn write_chunks(&mut self, chunks: &[Chunk<'_>]) -> Result<()>;

    /// Emit a binary file's bytes, base64 encoded
    fn write_binary_payload(&mut self, bytes: &[u8]) -> Result<()>;

    /// Annotate the open file entry with a failure
    fn write_error(&mut self, message: &str) -> Result<()>;

    /// Close the open file entry
    fn end_file(&mut self) -> Result<()>;

    /// Emit the aggregate digest and document trailer
    fn end_document(&mut self, aggregate_digest: &str) -> Result<()>;

    /// Flush and release the output; safe to call more than once
    fn close(&mut self) -> Result<()>;
}

/// Create the writer for `format`, targeting `path`
pub fn create_writer(format: OutputFormat, path: &Path) -> Box<dyn ArtifactWriter> {
    match format {
        OutputFormat::Xml => Box::new(XmlWriter::new(path)),
        OutputFormat::Md => Box::new(MarkdownWriter::new(path)),
    }
}

/// Position of a writer in the event sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterState {
    NotStarted,
    Started,
    FileOpen,
    FileWithContent,
    FileClosed,
    Ended,
    Closed,
}

/// Events that move a writer between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterEvent {
    StartDocument,
    FileHeader,
    Content,
    Error,
    EndFile,
    EndDocument,
}

impl WriterState {
    /// Apply `event`, rejecting calls made out of order
    pub(crate) fn advance(&mut self, event: WriterEvent) -> Result<()> {
        use WriterEvent as E;
        use WriterState as S;

        let next = match (*self, event) {
            (S::NotStarted, E::StartDocument) => S::Started,
            (S::Started | S::FileClosed, E::FileHeader) => S::FileOpen,
            (S::FileOpen, E::Content) => S::FileWithContent,
            (S::FileOpen | S::FileWithContent, E::Error) => S::FileWithContent,
            (S::FileOpen | S::FileWithContent, E::EndFile) => S::FileClosed,
            (S::Started | S::FileClosed, E::EndDocument) => S::Ended,
            (state, event) => bail!(Writer, "{:?} is not allowed in state {:?}", event, state),
        };

        *self = next;
        Ok(())
    }
}

/// Create (truncating) the output file behind a buffered writer
pub(crate) fn open_output(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).for_output(path)?;
    Ok(BufWriter::new(file))
}
