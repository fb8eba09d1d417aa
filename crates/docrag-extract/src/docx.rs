//! DOCX text extraction.
//!
//! Reads `word/document.xml` from the zip container and walks it with
//! quick-xml. Body paragraphs are kept in document order; paragraphs that
//! live inside tables are collected per cell instead, and every top-level
//! table is emitted after the paragraphs as a `TABLE:` block.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::error::ExtractError;
use crate::extractor::render_table;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extract text from DOCX bytes.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::corrupt("docx", e))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ExtractError::corrupt("docx", format!("{}: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::corrupt("docx", e))?;

    let body = parse_document_xml(&xml)?;
    debug!(
        paragraphs = body.paragraphs.len(),
        tables = body.tables.len(),
        "Parsed DOCX body"
    );

    Ok(body
        .paragraphs
        .into_iter()
        .chain(body.tables.iter().map(|rows| render_table(rows, " , ")))
        .collect::<Vec<_>>()
        .join("\n\n"))
}

#[derive(Debug, Default)]
struct DocxBody {
    paragraphs: Vec<String>,
    tables: Vec<Vec<Vec<String>>>,
}

/// Walk WordprocessingML and collect paragraphs and tables.
fn parse_document_xml(xml: &str) -> Result<DocxBody, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut body = DocxBody::default();

    let mut table_depth = 0usize;
    let mut in_text_run = false;
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractError::corrupt("docx", e))?;

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"tr" if table_depth == 1 => row.clear(),
                b"tc" if table_depth == 1 => cell.clear(),
                b"p" if table_depth == 0 => paragraph.clear(),
                b"t" => in_text_run = true,
                _ => {}
            },
            Event::Empty(e) => {
                let ch = match e.local_name().as_ref() {
                    b"tab" => Some('\t'),
                    b"br" | b"cr" => Some('\n'),
                    _ => None,
                };
                if let Some(ch) = ch {
                    target(table_depth, &mut paragraph, &mut cell).push(ch);
                }
            }
            Event::Text(t) if in_text_run => {
                let text = t.unescape().map_err(|e| ExtractError::corrupt("docx", e))?;
                target(table_depth, &mut paragraph, &mut cell).push_str(&text);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" if table_depth == 0 => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        body.paragraphs.push(text.to_string());
                    }
                }
                // Paragraph breaks inside a cell
                b"p" => cell.push('\n'),
                b"tc" if table_depth == 1 => row.push(cell.trim().to_string()),
                b"tr" if table_depth == 1 => rows.push(std::mem::take(&mut row)),
                b"tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 {
                        body.tables.push(std::mem::take(&mut rows));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(body)
}

fn target<'a>(table_depth: usize, paragraph: &'a mut String, cell: &'a mut String) -> &'a mut String {
    if table_depth == 0 {
        paragraph
    } else {
        cell
    }
}
