/*!
 * XML artifact writer
 */

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{open_output, ArtifactWriter, WriterEvent, WriterState, ARTIFACT_VERSION};
use crate::error::{IoResultExt, Result};
use crate::types::{Chunk, FileRecord, RunMetadata};

/// Terminator of a CDATA section
const CDATA_END: &str = "]]>";

/// XML writer for flattened file trees
///
/// Content goes into CDATA sections. A `]]>` inside the content is split
/// across two adjacent sections (`...]]` and `>...`), and every `\r` is
/// written between sections as `&#13;` so parsers do not fold line endings.
/// Concatenating the character data of an element yields the original text.
///
/// Text holding characters XML 1.0 cannot represent (C0 controls other than
/// tab, LF and CR, U+FFFE and U+FFFF) is written as base64 of its UTF-8
/// bytes instead: `<content_base64>` for inline content, and
/// `<chunk encoding="base64">` for a chunk. Attribute and element values
/// replace such characters with U+FFFD.
pub struct XmlWriter {
    /// Output file path
    path: PathBuf,
    /// Open writer, present between `start_document` and `close`
    writer: Option<Writer<BufWriter<File>>>,
    state: WriterState,
}

/// Whether XML 1.0 can carry `c` in a document
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n'
            | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Whether `text` can be written as character data without loss
fn is_xml_safe(text: &str) -> bool {
    text.chars().all(is_xml_char)
}

/// Escape an attribute value, keeping whitespace exact through references
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if !is_xml_char(c) => out.push(char::REPLACEMENT_CHARACTER),
            c => out.push(c),
        }
    }
    out
}

/// Escape element text
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            c if !is_xml_char(c) => out.push(char::REPLACEMENT_CHARACTER),
            c => out.push(c),
        }
    }
    out
}

impl XmlWriter {
    /// Create a writer that will create `path` when the document starts
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            state: WriterState::NotStarted,
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_event(event).for_output(&self.path),
            None => crate::bail!(Writer, "output {} is not open", self.path.display()),
        }
    }

    /// Write layout whitespace directly, outside of any element content
    fn raw(&mut self, s: &str) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .get_mut()
                .write_all(s.as_bytes())
                .for_output(&self.path),
            None => crate::bail!(Writer, "output {} is not open", self.path.display()),
        }
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.event(Event::Text(BytesText::from_escaped(escape_text(text))))
    }

    fn text_element(&mut self, indent: &str, name: &str, text: &str) -> Result<()> {
        self.raw(indent)?;
        self.event(Event::Start(BytesStart::new(name)))?;
        self.text(text)?;
        self.event(Event::End(BytesEnd::new(name)))?;
        self.raw("\n")
    }

    fn cdata(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return self.event(Event::CData(BytesCData::new("")));
        }

        for (i, segment) in text.split('\r').enumerate() {
            if i > 0 {
                self.event(Event::Text(BytesText::from_escaped("&#13;")))?;
            }
            if !segment.is_empty() {
                self.cdata_sections(segment)?;
            }
        }
        Ok(())
    }

    fn cdata_sections(&mut self, text: &str) -> Result<()> {
        let mut rest = text;
        let mut carried = false;

        while let Some(pos) = rest.find(CDATA_END) {
            let section = format!("{}{}]]", if carried { ">" } else { "" }, &rest[..pos]);
            self.event(Event::CData(BytesCData::new(section)))?;
            rest = &rest[pos + CDATA_END.len()..];
            carried = true;
        }

        let last: Cow<'_, str> = if carried {
            Cow::Owned(format!(">{}", rest))
        } else {
            Cow::Borrowed(rest)
        };
        self.event(Event::CData(BytesCData::new(last)))
    }
}

/// Start tag with attribute values escaped by [`escape_attr`]
fn start_tag<'a>(name: &'a str, attributes: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attributes {
        let escaped = escape_attr(value);
        start.push_attribute((key.as_bytes(), escaped.as_bytes()));
    }
    start
}

impl ArtifactWriter for XmlWriter {
    fn start_document(&mut self, metadata: &RunMetadata) -> Result<()> {
        self.state.advance(WriterEvent::StartDocument)?;
        self.writer = Some(Writer::new(open_output(&self.path)?));

        self.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.raw("\n")?;

        let generated_at = metadata.generated_at_string();
        let mut attributes = vec![
            ("version", ARTIFACT_VERSION),
            ("root", metadata.root.as_str()),
            ("generated_at", generated_at.as_str()),
        ];
        if let Some(branch) = &metadata.branch {
            attributes.push(("branch", branch.as_str()));
        }
        if let Some(commit) = &metadata.commit {
            attributes.push(("commit", commit.as_str()));
        }
        self.event(Event::Start(start_tag("codebase", &attributes)))?;
        self.raw("\n  ")?;

        self.event(Event::Start(BytesStart::new("config")))?;
        self.raw("\n")?;
        self.text_element("    ", "includes", &metadata.includes.join(","))?;
        self.text_element("    ", "excludes", &metadata.excludes.join(","))?;
        self.text_element(
            "    ",
            "max_file_bytes",
            &metadata.max_file_bytes.to_string(),
        )?;
        self.text_element("    ", "chunk_bytes", &metadata.chunk_bytes.to_string())?;
        self.raw("  ")?;
        self.event(Event::End(BytesEnd::new("config")))?;
        self.raw("\n")
    }

    fn write_file_header(&mut self, record: &FileRecord) -> Result<()> {
        self.state.advance(WriterEvent::FileHeader)?;

        let size = record.size_bytes.to_string();
        let file = start_tag(
            "file",
            &[
                ("path", record.path.as_str()),
                ("lang", record.lang.as_str()),
                ("size_bytes", size.as_str()),
                ("sha256", record.sha256.as_str()),
                ("is_binary", if record.is_binary { "true" } else { "false" }),
                ("encoding", record.encoding.as_str()),
            ],
        );

        self.raw("  ")?;
        self.event(Event::Start(file))?;
        self.raw("\n")
    }

    fn write_text_content(&mut self, text: &str) -> Result<()> {
        self.state.advance(WriterEvent::Content)?;

        if !is_xml_safe(text) {
            return self.text_element("    ", "content_base64", &STANDARD.encode(text));
        }

        self.raw("    ")?;
        self.event(Event::Start(BytesStart::new("content")))?;
        self.cdata(text)?;
        self.event(Event::End(BytesEnd::new("content")))?;
        self.raw("\n")
    }

    fn write_chunks(&mut self, chunks: &[Chunk<'_>]) -> Result<()> {
        self.state.advance(WriterEvent::Content)?;

        self.raw("    ")?;
        self.event(Event::Start(BytesStart::new("chunks")))?;
        self.raw("\n")?;

        for chunk in chunks {
            let index = chunk.index.to_string();
            let offset = chunk.offset.to_string();
            let safe = is_xml_safe(chunk.text);
            let mut attributes = vec![("index", index.as_str()), ("offset", offset.as_str())];
            if !safe {
                attributes.push(("encoding", "base64"));
            }

            self.raw("      ")?;
            self.event(Event::Start(start_tag("chunk", &attributes)))?;
            if safe {
                self.cdata(chunk.text)?;
            } else {
                self.text(&STANDARD.encode(chunk.text))?;
            }
            self.event(Event::End(BytesEnd::new("chunk")))?;
            self.raw("\n")?;
        }

        self.raw("    ")?;
        self.event(Event::End(BytesEnd::new("chunks")))?;
        self.raw("\n")
    }

    fn write_binary_payload(&mut self, bytes: &[u8]) -> Result<()> {
        self.state.advance(WriterEvent::Content)?;
        let encoded = STANDARD.encode(bytes);
        self.text_element("    ", "content_base64", &encoded)
    }

    fn write_error(&mut self, message: &str) -> Result<()> {
        self.state.advance(WriterEvent::Error)?;
        self.text_element("    ", "error", message)
    }

    fn end_file(&mut self) -> Result<()> {
        self.state.advance(WriterEvent::EndFile)?;
        self.raw("  ")?;
        self.event(Event::End(BytesEnd::new("file")))?;
        self.raw("\n")
    }

    fn end_document(&mut self, aggregate_digest: &str) -> Result<()> {
        self.state.advance(WriterEvent::EndDocument)?;

        self.raw("  ")?;
        self.event(Event::Start(start_tag("digest", &[("algo", "sha256")])))?;
        self.text(aggregate_digest)?;
        self.event(Event::End(BytesEnd::new("digest")))?;
        self.raw("\n")?;
        self.event(Event::End(BytesEnd::new("codebase")))?;
        self.raw("\n")
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.into_inner().flush().for_output(&self.path)?;
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
    use quick_xml::events::Event as ReadEvent;
    use quick_xml::Reader;
    use tempfile::tempdir;

    fn metadata() -> RunMetadata {
        RunMetadata {
            root: "/repo/<root>".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            branch: Some("main".to_string()),
            commit: None,
            includes: vec!["src/**".to_string(), "*.toml".to_string()],
            excludes: vec![],
            max_file_bytes: 200_000,
            chunk_bytes: 50_000,
        }
    }

    fn record(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            lang: "unknown".to_string(),
            size_bytes: 3,
            sha256: "ab".to_string(),
            is_binary: false,
            encoding: "utf-8".to_string(),
        }
    }

    /// Concatenated character data of every element named `name`, in order
    fn cdata_of(xml: &str, name: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut found = Vec::new();
        let mut current: Option<String> = None;

        loop {
            match reader.read_event().unwrap() {
                ReadEvent::Start(e) if e.name().as_ref() == name.as_bytes() => {
                    current = Some(String::new());
                }
                ReadEvent::CData(e) => {
                    if let Some(buf) = current.as_mut() {
                        buf.push_str(std::str::from_utf8(&e.into_inner()).unwrap());
                    }
                }
                ReadEvent::Text(e) => {
                    if let Some(buf) = current.as_mut() {
                        buf.push_str(&e.unescape().unwrap());
                    }
                }
                ReadEvent::End(e) if e.name().as_ref() == name.as_bytes() => {
                    found.extend(current.take());
                }
                ReadEvent::Eof => break,
                _ => {}
            }
        }
        found
    }

    #[test]
    fn test_document_layout() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.xml");
        let mut writer = XmlWriter::new(&out);

        writer.start_document(&metadata()).unwrap();
        writer.write_file_header(&record("a.txt")).unwrap();
        writer.write_text_content("hello").unwrap();
        writer.end_file().unwrap();
        writer.end_document("ff00").unwrap();
        writer.close().unwrap();

        let xml = fs::read_to_string(&out).unwrap();
        let expected = concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<codebase version=\"1.0\" root=\"/repo/&lt;root&gt;\" generated_at=\"2024-01-02T03:04:05.000Z\" branch=\"main\">\n",
            "  <config>\n",
            "    <includes>src/**,*.toml</includes>\n",
            "    <excludes></excludes>\n",
            "    <max_file_bytes>200000</max_file_bytes>\n",
            "    <chunk_bytes>50000</chunk_bytes>\n",
            "  </config>\n",
            "  <file path=\"a.txt\" lang=\"unknown\" size_bytes=\"3\" sha256=\"ab\" is_binary=\"false\" encoding=\"utf-8\">\n",
            "    <content><![CDATA[hello]]></content>\n",
            "  </file>\n",
            "  <digest algo=\"sha256\">ff00</digest>\n",
            "</codebase>\n",
        );
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_cdata_terminator_in_content_round_trips() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.xml");
        let mut writer = XmlWriter::new(&out);
        let tricky = "a]]>b]]]>c]]>";

        writer.start_document(&metadata()).unwrap();
        writer.write_file_header(&record("t.txt")).unwrap();
        writer.write_text_content(tricky).unwrap();
        writer.end_file().unwrap();
        writer.write_file_header(&record("u.txt")).unwrap();
        let chunks = [
            Chunk { index: 0, offset: 0, text: "x]]" },
            Chunk { index: 1, offset: 3, text: ">y" },
        ];
        writer.write_chunks(&chunks).unwrap();
        writer.end_file().unwrap();
        writer.end_document("00").unwrap();
        writer.close().unwrap();

        let xml = fs::read_to_string(&out).unwrap();
        assert_eq!(cdata_of(&xml, "content"), vec![tricky.to_string()]);
        assert_eq!(cdata_of(&xml, "chunk"), vec!["x]]".to_string(), ">y".to_string()]);
    }

    #[test]
    fn test_error_and_binary_are_escaped() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.xml");
        let mut writer = XmlWriter::new(&out);

        writer.start_document(&metadata()).unwrap();
        let mut bin = record("b.bin");
        bin.is_binary = true;
        writer.write_file_header(&bin).unwrap();
        writer.write_binary_payload(&[0, 1, 2]).unwrap();
        writer.end_file().unwrap();
        writer.write_file_header(&record("q\"&.txt")).unwrap();
        writer.write_error("IoError: <denied> & \"gone\"").unwrap();
        writer.end_file().unwrap();
        writer.end_document("00").unwrap();
        writer.close().unwrap();

        let xml = fs::read_to_string(&out).unwrap();
        assert!(xml.contains("<content_base64>AAEC</content_base64>"));
        assert!(xml.contains("is_binary=\"true\""));
        assert!(xml.contains("path=\"q&quot;&amp;.txt\""));
        assert!(xml.contains("<error>IoError: &lt;denied&gt; &amp; \"gone\"</error>"));
    }

    #[test]
    fn test_carriage_returns_leave_cdata() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.xml");
        let mut writer = XmlWriter::new(&out);
        let crlf = "line1\r\nline2\r\n\r";

        writer.start_document(&metadata()).unwrap();
        writer.write_file_header(&record("crlf.txt")).unwrap();
        writer.write_text_content(crlf).unwrap();
        writer.end_file().unwrap();
        writer.write_file_header(&record("split.txt")).unwrap();
        let chunks = [
            Chunk { index: 0, offset: 0, text: "a\r" },
            Chunk { index: 1, offset: 2, text: "\nb" },
        ];
        writer.write_chunks(&chunks).unwrap();
        writer.end_file().unwrap();
        writer.end_document("00").unwrap();
        writer.close().unwrap();

        let xml = fs::read_to_string(&out).unwrap();
        assert!(!xml.contains('\r'));
        assert!(xml.contains("<content><![CDATA[line1]]>&#13;<![CDATA[\nline2]]>&#13;"));
        assert_eq!(cdata_of(&xml, "content"), vec![crlf.to_string()]);
        assert_eq!(cdata_of(&xml, "chunk"), vec!["a\r".to_string(), "\nb".to_string()]);
    }

    #[test]
    fn test_unrepresentable_text_falls_back_to_base64() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.xml");
        let mut writer = XmlWriter::new(&out);
        let control = "hello \u{1} world";

        writer.start_document(&metadata()).unwrap();
        writer.write_file_header(&record("ctl\u{1}\n.txt")).unwrap();
        writer.write_text_content(control).unwrap();
        writer.end_file().unwrap();
        writer.write_file_header(&record("chunked.txt")).unwrap();
        let chunks = [
            Chunk { index: 0, offset: 0, text: "ok" },
            Chunk { index: 1, offset: 2, text: "\u{1b}[0m\u{0}" },
        ];
        writer.write_chunks(&chunks).unwrap();
        writer.write_error("IoError: bad \u{2} byte").unwrap();
        writer.end_file().unwrap();
        writer.end_document("00").unwrap();
        writer.close().unwrap();

        let xml = fs::read_to_string(&out).unwrap();
        assert!(xml.chars().all(is_xml_char));
        assert!(!xml.contains('\u{1b}'));

        let payload = format!("<content_base64>{}</content_base64>", STANDARD.encode(control));
        assert!(xml.contains(&payload));
        assert!(xml.contains("path=\"ctl\u{FFFD}&#10;.txt\""));
        assert!(xml.contains("<chunk index=\"0\" offset=\"0\"><![CDATA[ok]]></chunk>"));
        let encoded = format!(
            "<chunk index=\"1\" offset=\"2\" encoding=\"base64\">{}</chunk>",
            STANDARD.encode("\u{1b}[0m\u{0}")
        );
        assert!(xml.contains(&encoded));
        assert!(xml.contains("<error>IoError: bad \u{FFFD} byte</error>"));

        let mut reader = Reader::from_str(&xml);
        let mut depth = 0;
        loop {
            match reader.read_event().unwrap() {
                ReadEvent::Start(_) => depth += 1,
                ReadEvent::End(_) => depth -= 1,
                ReadEvent::Eof => break,
                _ => {}
            }
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_xml_char_ranges() {
        assert!(is_xml_char('\t'));
        assert!(is_xml_char('\r'));
        assert!(is_xml_char('é'));
        assert!(is_xml_char('\u{1F600}'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\u{8}'));
        assert!(!is_xml_char('\u{1b}'));
        assert!(!is_xml_char('\u{FFFE}'));
        assert_eq!(escape_attr("a\"b\tc"), "a&quot;b&#9;c");
        assert_eq!(escape_text("<x>\r&"), "&lt;x&gt;&#13;&amp;");
    }

    #[test]
    fn test_out_of_order_call_is_rejected() {
        let dir = tempdir().unwrap();
        let mut writer = XmlWriter::new(dir.path().join("out.xml"));
        assert!(writer.write_file_header(&record("a")).is_err());
    }

    #[test]
    fn test_close_without_start_is_noop() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("never.xml");
        let mut writer = XmlWriter::new(&out);
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(!out.exists());
    }
}
