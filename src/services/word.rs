use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::services::storage::StorageHandler;

/// Package part holding the document body.
pub const DOCUMENT_PART: &str = "word/document.xml";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// One `<w:t>` node: where it sits in the event stream and its text.
#[derive(Debug, Clone)]
struct TextRun {
    event: usize,
    text: String,
}

/// A `.docx` package held in memory.
///
/// The body is kept as an XML event stream so that everything except
/// edited text nodes is written back exactly as it was read. Paragraphs
/// are collected in document order, including those inside tables.
#[derive(Debug, Clone)]
pub struct WordDocument {
    parts: Vec<(String, Vec<u8>)>,
    events: Vec<Event<'static>>,
    paragraphs: Vec<Vec<TextRun>>,
}

impl WordDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WordError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            parts.push((file.name().to_string(), data));
        }

        let (events, paragraphs) = {
            let document = parts
                .iter()
                .find(|(name, _)| name == DOCUMENT_PART)
                .ok_or(WordError::MissingDocument)?;
            parse_body(&document.1)?
        };

        Ok(Self {
            parts,
            events,
            paragraphs,
        })
    }

    /// A minimal document with one plain run per paragraph.
    pub fn from_paragraphs<I, S>(paragraphs: I) -> Result<Self, WordError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let body: String = paragraphs
            .into_iter()
            .map(|text| {
                format!(
                    r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
                    quick_xml::escape::escape(text.as_ref())
                )
            })
            .collect();
        Self::package(&format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        ))
    }

    fn package(document_xml: &str) -> Result<Self, WordError> {
        let (events, paragraphs) = parse_body(document_xml.as_bytes())?;
        Ok(Self {
            parts: vec![
                ("[Content_Types].xml".to_string(), CONTENT_TYPES.as_bytes().to_vec()),
                ("_rels/.rels".to_string(), PACKAGE_RELS.as_bytes().to_vec()),
                (DOCUMENT_PART.to_string(), document_xml.as_bytes().to_vec()),
            ],
            events,
            paragraphs,
        })
    }

    /// Text of every paragraph, empty paragraphs included.
    pub fn paragraphs(&self) -> Vec<String> {
        self.paragraphs
            .iter()
            .map(|runs| runs.iter().map(|run| run.text.as_str()).collect())
            .collect()
    }

    /// Paragraph texts joined by newlines.
    pub fn text(&self) -> String {
        self.paragraphs().join("\n")
    }

    /// Replace occurrences of `placeholder`, paragraph by paragraph, stopping
    /// after `max_count` replacements when one is given. Returns how many
    /// were made.
    ///
    /// A placeholder may span several runs. An edited paragraph keeps its
    /// text in the first run and empties the others.
    pub fn replace_placeholder(
        &mut self,
        placeholder: &str,
        replacement: &str,
        max_count: Option<usize>,
    ) -> usize {
        if placeholder.is_empty() {
            return 0;
        }

        let mut replaced = 0;
        for runs in &mut self.paragraphs {
            let remaining = max_count.map_or(usize::MAX, |max| max.saturating_sub(replaced));
            if remaining == 0 {
                break;
            }

            let text: String = runs.iter().map(|run| run.text.as_str()).collect();
            let found = text.matches(placeholder).count().min(remaining);
            if found == 0 {
                continue;
            }

            let updated = text.replacen(placeholder, replacement, found);
            for (position, run) in runs.iter_mut().enumerate() {
                run.text = if position == 0 {
                    updated.clone()
                } else {
                    String::new()
                };
                self.events[run.event] = Event::Text(BytesText::new(&run.text).into_owned());
            }
            replaced += found;
        }

        tracing::debug!(placeholder, replaced, "Replaced placeholder");
        replaced
    }

    /// Serialize the package, writing the edited body in place of the original.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WordError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in &self.parts {
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(name.as_str(), options)?;
            if name == DOCUMENT_PART {
                writer.write_all(&self.body_xml()?)?;
            } else {
                writer.write_all(data)?;
            }
        }
        Ok(writer.finish()?.into_inner())
    }

    fn body_xml(&self) -> Result<Vec<u8>, WordError> {
        let mut writer = quick_xml::Writer::new(Vec::new());
        for event in &self.events {
            writer
                .write_event(event.clone())
                .map_err(|e| WordError::Xml(e.to_string()))?;
        }
        Ok(writer.into_inner())
    }
}

type ParsedBody = (Vec<Event<'static>>, Vec<Vec<TextRun>>);

fn parse_body(xml: &[u8]) -> Result<ParsedBody, WordError> {
    let mut reader = Reader::from_reader(xml);
    let mut events = Vec::new();
    let mut paragraphs: Vec<Vec<TextRun>> = Vec::new();
    // Paragraphs can nest through text boxes; text belongs to the innermost.
    let mut open: Vec<usize> = Vec::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| WordError::Xml(e.to_string()))?;
        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"w:p" => {
                open.push(paragraphs.len());
                paragraphs.push(Vec::new());
            }
            Event::End(e) if e.name().as_ref() == b"w:p" => {
                open.pop();
            }
            Event::Empty(e) if e.name().as_ref() == b"w:p" => paragraphs.push(Vec::new()),
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(text) if in_text => {
                if let Some(&paragraph) = open.last() {
                    let text = text
                        .unescape()
                        .map_err(|e| WordError::Xml(e.to_string()))?
                        .into_owned();
                    paragraphs[paragraph].push(TextRun {
                        event: events.len(),
                        text,
                    });
                }
            }
            _ => {}
        }
        events.push(event.into_owned());
    }

    Ok((events, paragraphs))
}

/// Paragraph text of a `.docx` held in memory.
pub fn text_from_bytes(bytes: &[u8]) -> Result<String, WordError> {
    Ok(WordDocument::from_bytes(bytes)?.text())
}

/// Normalize extracted text: runs of whitespace inside a line become one
/// space, consecutive blank lines collapse to one, and leading and
/// trailing blank lines are dropped.
pub fn clean_text(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() && lines.last().map_or(true, String::is_empty) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines.join("\n")
}

/// Reads and writes Word documents through object storage.
pub struct WordHandler {
    storage: Arc<StorageHandler>,
}

impl WordHandler {
    pub fn new(storage: Arc<StorageHandler>) -> Self {
        Self { storage }
    }

    /// Raw bytes of the object at `bucket`/`key`.
    pub async fn read_from_s3(&self, bucket: &str, key: &str) -> Result<Vec<u8>, WordError> {
        self.storage
            .get_file_object(bucket, key)
            .await
            .ok_or_else(|| WordError::Read {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    pub async fn read_document(&self, bucket: &str, key: &str) -> Result<WordDocument, WordError> {
        let bytes = self.read_from_s3(bucket, key).await?;
        let document = WordDocument::from_bytes(&bytes)?;
        tracing::info!(
            bucket = %bucket,
            key = %key,
            paragraphs = document.paragraphs.len(),
            "Read Word document"
        );
        Ok(document)
    }

    pub async fn upload_docx(
        &self,
        document: &WordDocument,
        bucket: &str,
        key: &str,
    ) -> Result<(), WordError> {
        let bytes = document.to_bytes()?;
        if !self.storage.upload_bytes(&bytes, bucket, key).await {
            return Err(WordError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        tracing::info!(bucket = %bucket, key = %key, size = bytes.len(), "Uploaded Word document");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WordError {
    #[error("Error reading file from S3: {bucket}/{key}")]
    Read { bucket: String, key: String },

    #[error("Error uploading file to S3: {bucket}/{key}")]
    Upload { bucket: String, key: String },

    #[error("Not a Word document: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Word document has no word/document.xml part")]
    MissingDocument,

    #[error("Malformed document XML: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{ObjectHead, ObjectStore, StorageError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

    #[derive(Default)]
    struct MemoryObjects {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryObjects {
        async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
            self.objects
                .lock()
                .unwrap()
                .insert(format!("{bucket}/{key}"), data.to_vec());
            Ok(())
        }

        async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(&format!("{bucket}/{key}"))
                .cloned()
                .ok_or(StorageError::Status(404))
        }

        async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, StorageError> {
            self.get_object(bucket, key).await.map(|data| ObjectHead {
                content_length: data.len() as u64,
            })
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
            self.objects.lock().unwrap().remove(&format!("{bucket}/{key}"));
            Ok(())
        }

        async fn list_objects(&self, _bucket: &str, _prefix: &str) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn handler() -> WordHandler {
        WordHandler::new(Arc::new(StorageHandler::new(Arc::new(MemoryObjects::default()))))
    }

    #[test]
    fn test_paragraphs_survive_serialization() {
        let document =
            WordDocument::from_paragraphs(["First paragraph", "", "Fish & <chips>"]).unwrap();
        let bytes = document.to_bytes().unwrap();

        let reread = WordDocument::from_bytes(&bytes).unwrap();
        assert_eq!(
            reread.paragraphs(),
            vec!["First paragraph", "", "Fish & <chips>"]
        );
        assert_eq!(
            text_from_bytes(&bytes).unwrap(),
            "First paragraph\n\nFish & <chips>"
        );
    }

    #[test]
    fn test_replace_placeholder_respects_max_count() {
        let mut document =
            WordDocument::from_paragraphs(["Lorem ipsum Lorem", "Lorem dolor", "sit amet"]).unwrap();

        assert_eq!(document.replace_placeholder("Lorem", "BIRULEI", Some(2)), 2);
        assert_eq!(
            document.paragraphs(),
            vec!["BIRULEI ipsum BIRULEI", "Lorem dolor", "sit amet"]
        );

        assert_eq!(document.replace_placeholder("Lorem", "BIRULEI", None), 1);
        assert!(!document.text().contains("Lorem"));

        let reread = WordDocument::from_bytes(&document.to_bytes().unwrap()).unwrap();
        assert_eq!(reread.text(), "BIRULEI ipsum BIRULEI\nBIRULEI dolor\nsit amet");
    }

    #[test]
    fn test_replace_placeholder_without_matches() {
        let mut document = WordDocument::from_paragraphs(["nothing here"]).unwrap();
        assert_eq!(document.replace_placeholder("{{name}}", "Ada", None), 0);
        assert_eq!(document.replace_placeholder("", "Ada", None), 0);
        assert_eq!(document.text(), "nothing here");
    }

    #[test]
    fn test_placeholder_split_across_runs_and_tables() {
        let xml = format!(
            r#"<w:document xmlns:w="{W_NS}"><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Dear {{{{na</w:t></w:r><w:r><w:t>me}}}},</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>{{{{name}}}}</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/></w:body></w:document>"#
        );
        let mut document = WordDocument::package(&xml).unwrap();
        assert_eq!(document.paragraphs(), vec!["Dear {{name}},", "{{name}}", ""]);

        assert_eq!(document.replace_placeholder("{{name}}", "Ada", None), 2);
        assert_eq!(document.paragraphs(), vec!["Dear Ada,", "Ada", ""]);

        let body = String::from_utf8(document.body_xml().unwrap()).unwrap();
        assert!(body.contains("<w:b/>"));
        assert!(body.contains("<w:tbl>"));
    }

    #[test]
    fn test_other_parts_are_kept_verbatim() {
        let mut document = WordDocument::from_paragraphs(["Lorem"]).unwrap();
        document.replace_placeholder("Lorem", "Ipsum", None);

        let bytes = document.to_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut rels = String::new();
        archive
            .by_name("_rels/.rels")
            .unwrap()
            .read_to_string(&mut rels)
            .unwrap();
        assert_eq!(rels, PACKAGE_RELS);
    }

    #[test]
    fn test_from_bytes_rejects_non_documents() {
        assert!(matches!(
            WordDocument::from_bytes(b"plain text, not a package"),
            Err(WordError::Archive(_))
        ));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        assert!(matches!(
            WordDocument::from_bytes(&bytes),
            Err(WordError::MissingDocument)
        ));
    }

    #[test]
    fn test_clean_text() {
        let raw = "This is a test.\n\nThis is   the second paragraph.\n\n\nThis is the third paragraph.\n\n";
        assert_eq!(
            clean_text(raw),
            "This is a test.\n\nThis is the second paragraph.\n\nThis is the third paragraph."
        );
    }

    #[test]
    fn test_clean_text_empty() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text(" \n\t\n"), "");
    }

    #[tokio::test]
    async fn test_upload_then_read_through_storage() {
        let handler = handler();
        let document = WordDocument::from_paragraphs(["Uploaded through storage"]).unwrap();

        handler
            .upload_docx(&document, "docs", "sample.docx")
            .await
            .unwrap();

        let bytes = handler.read_from_s3("docs", "sample.docx").await.unwrap();
        assert_eq!(text_from_bytes(&bytes).unwrap(), "Uploaded through storage");

        let reread = handler.read_document("docs", "sample.docx").await.unwrap();
        assert_eq!(reread.text(), "Uploaded through storage");
    }

    #[tokio::test]
    async fn test_read_missing_object() {
        let err = handler()
            .read_from_s3("non_existent_bucket", "non_existent_key.docx")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error reading file from S3"));
    }
}
