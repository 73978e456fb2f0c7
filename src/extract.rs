//! Text extraction for uploaded documents.
//!
//! The document kind is chosen from the filename extension, falling back to
//! sniffing the `%PDF` magic bytes for extensionless uploads. Supported:
//! PDF (pages concatenated), DOCX, PPTX, XLSX, and UTF-8 text formats.
//! The returned text is trimmed; an empty string means the document holds
//! no extractable text.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use thiserror::Error;

/// Maximum sheets to read from a workbook.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to read per sheet.
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("Office document extraction failed: {0}")]
    Ooxml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    PlainText,
}

impl DocumentKind {
    pub fn detect(filename: &str, bytes: &[u8]) -> Option<Self> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => Some(DocumentKind::Pdf),
            Some("docx") => Some(DocumentKind::Docx),
            Some("pptx") => Some(DocumentKind::Pptx),
            Some("xlsx") => Some(DocumentKind::Xlsx),
            Some("txt" | "md" | "markdown" | "csv" | "json" | "log" | "rst") => {
                Some(DocumentKind::PlainText)
            }
            _ if bytes.starts_with(b"%PDF") => Some(DocumentKind::Pdf),
            _ => None,
        }
    }
}

/// Extract trimmed plain text from an uploaded file.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let kind = DocumentKind::detect(filename, bytes)
        .ok_or_else(|| ExtractError::Unsupported(filename.to_string()))?;
    let text = match kind {
        DocumentKind::Pdf => extract_pdf(bytes)?,
        DocumentKind::Docx => extract_docx(bytes)?,
        DocumentKind::Pptx => extract_pptx(bytes)?,
        DocumentKind::Xlsx => extract_xlsx(bytes)?,
        DocumentKind::PlainText => String::from_utf8_lossy(bytes).into_owned(),
    };
    Ok(text.trim().to_string())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Numbered parts such as `ppt/slides/slide3.xml`, in numeric order.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(str::to_string)
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Collect the text of every `text_tag` element, ending a line at the close
/// of every `block_tag` element. Tags are matched by local name.
fn xml_text(xml: &[u8], text_tag: &[u8], block_tag: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == text_tag => in_text = true,
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == text_tag {
                    in_text = false;
                } else if name.as_ref() == block_tag && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Text(te)) if in_text => {
                out.push_str(&te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;
    xml_text(&xml, b"t", b"p")
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut slides = Vec::new();
    for name in numbered_parts(&archive, "ppt/slides/slide") {
        let xml = read_entry(&mut archive, &name)?;
        let text = xml_text(&xml, b"t", b"p")?;
        if !text.trim().is_empty() {
            slides.push(text.trim_end().to_string());
        }
    }
    Ok(slides.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared = if archive.index_for_name("xl/sharedStrings.xml").is_some() {
        shared_strings(&read_entry(&mut archive, "xl/sharedStrings.xml")?)?
    } else {
        Vec::new()
    };

    let mut sheets = Vec::new();
    for name in numbered_parts(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let xml = read_entry(&mut archive, &name)?;
        let text = sheet_text(&xml, &shared)?;
        if !text.is_empty() {
            sheets.push(text);
        }
    }
    Ok(sheets.join("\n\n"))
}

/// One entry per `<si>`; rich-text runs are concatenated and phonetic
/// hints (`<rPh>`) are skipped.
fn shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(te)) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one sheet: cells separated by spaces, rows by newlines.
fn sheet_text(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type: Option<Vec<u8>> = None;
    let mut in_value = false;
    let mut in_inline = false;
    let mut cells = 0usize;

    loop {
        if cells >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"c" => {
                    cell_type = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref() == b"t")
                        .map(|a| a.value.into_owned());
                }
                b"v" => in_value = true,
                b"t" if matches!(cell_type.as_deref(), Some(b"inlineStr")) => in_inline = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_value || in_inline => {
                let raw = te.unescape().map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                let raw = raw.trim();
                let value = match cell_type.as_deref() {
                    Some(b"s") => raw.parse::<usize>().ok().and_then(|i| shared.get(i)).cloned(),
                    _ => Some(raw.to_string()),
                };
                if let Some(v) = value.filter(|v| !v.is_empty()) {
                    row.push(v);
                    cells += 1;
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"t" => in_inline = false,
                b"c" => cell_type = None,
                b"row" if !row.is_empty() => rows.push(std::mem::take(&mut row).join(" ")),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join(" "));
    }
    Ok(rows.join("\n"))
}
