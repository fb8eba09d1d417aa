//! PDF text extraction.
//!
//! Uses pdf-extract for the text layer. pdf-extract has no notion of
//! tables, so table rows are recovered from the laid-out text: a run of
//! at least two consecutive lines that each split into two or more cells
//! (on tabs or on gaps of two or more spaces) is treated as a table.

use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::extractor::render_table;

/// Page separator emitted by pdf-extract
const PAGE_BREAK: char = '\u{c}';

/// Minimum consecutive tabular lines to form a table
const MIN_TABLE_ROWS: usize = 2;

/// Extract text from PDF bytes.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning Err
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));

    let raw = match result {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(ExtractError::corrupt("pdf", e)),
        Err(_) => {
            warn!("pdf-extract panicked on payload");
            return Err(ExtractError::corrupt("pdf", "parser panicked"));
        }
    };

    Ok(layout_pdf_text(&raw))
}

/// Separate flowing text from table rows, page by page.
///
/// Output is all page text joined by blank lines, followed by one
/// `TABLE:` block per detected table.
pub fn layout_pdf_text(raw: &str) -> String {
    let mut texts = Vec::new();
    let mut tables = Vec::new();

    for page in raw.split(PAGE_BREAK) {
        let (text, page_tables) = split_page(page);
        if !text.is_empty() {
            texts.push(text);
        }
        tables.extend(page_tables);
    }

    debug!(pages = texts.len(), tables = tables.len(), "Laid out PDF text");

    texts
        .into_iter()
        .chain(tables.iter().map(|rows| render_table(rows, ", ")))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn split_page(page: &str) -> (String, Vec<Vec<Vec<String>>>) {
    let mut text_lines: Vec<&str> = Vec::new();
    let mut tables = Vec::new();
    let mut run: Vec<(&str, Vec<String>)> = Vec::new();

    for line in page.lines() {
        match split_cells(line) {
            Some(cells) => run.push((line, cells)),
            None => {
                close_run(&mut run, &mut text_lines, &mut tables);
                text_lines.push(line);
            }
        }
    }
    close_run(&mut run, &mut text_lines, &mut tables);

    (text_lines.join("\n").trim().to_string(), tables)
}

/// Turn a run of candidate rows into a table, or give it back to the text.
fn close_run<'a>(
    run: &mut Vec<(&'a str, Vec<String>)>,
    text_lines: &mut Vec<&'a str>,
    tables: &mut Vec<Vec<Vec<String>>>,
) {
    if run.len() >= MIN_TABLE_ROWS {
        tables.push(run.drain(..).map(|(_, cells)| cells).collect());
    } else {
        text_lines.extend(run.drain(..).map(|(line, _)| line));
    }
}

/// Split a line into cells if it looks like a table row.
fn split_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut spaces = 0usize;

    for ch in trimmed.chars() {
        match ch {
            '\t' => {
                cells.push(std::mem::take(&mut current));
                spaces = 0;
            }
            ' ' => spaces += 1,
            _ => {
                if spaces >= 2 {
                    cells.push(std::mem::take(&mut current));
                } else if spaces == 1 {
                    current.push(' ');
                }
                spaces = 0;
                current.push(ch);
            }
        }
    }
    cells.push(current);

    let cells: Vec<String> = cells
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    (cells.len() >= 2).then_some(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cells() {
        assert_eq!(
            split_cells("Item     Qty   Price"),
            Some(vec!["Item".into(), "Qty".into(), "Price".into()])
        );
        assert_eq!(
            split_cells("a\tb"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(split_cells("An ordinary sentence with single spaces."), None);
        assert_eq!(split_cells("   "), None);
    }

    #[test]
    fn test_tables_follow_all_page_text() {
        let raw = "Quarterly report\nRevenue grew.\nItem    Qty\nBolts    40\nNuts    15\n\u{c}Second page text.";
        let out = layout_pdf_text(raw);

        assert_eq!(
            out,
            "Quarterly report\nRevenue grew.\n\nSecond page text.\n\nTABLE:\nItem, Qty\nBolts, 40\nNuts, 15"
        );
    }

    #[test]
    fn test_single_tabular_line_stays_in_text() {
        let raw = "Heading    Right aligned\nplain text follows";
        let out = layout_pdf_text(raw);
        assert!(!out.contains("TABLE:"));
        assert!(out.contains("Heading    Right aligned"));
    }

    #[test]
    fn test_blank_pages_skipped() {
        let out = layout_pdf_text("first\u{c}  \n \u{c}third");
        assert_eq!(out, "first\n\nthird");
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let result = extract_pdf(b"definitely not a pdf");
        assert!(matches!(result, Err(ExtractError::Corrupt { .. })));
    }
}
