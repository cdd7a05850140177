use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 56.0;
const TITLE_SIZE: f64 = 16.0;
const BODY_SIZE: f64 = 12.0;
const LINE_HEIGHT: f64 = 16.0;
const WRAP_COLUMNS: usize = 80;

/// Per-pipeline report wording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLayout {
    /// Document title.
    pub title: String,
    /// Entry name under which the decoded label is reported.
    pub heading: String,
    /// Suggested file name; `{label}` is replaced by the label with spaces as underscores.
    pub file_name: String,
}

impl ReportLayout {
    /// Creates a layout.
    #[must_use]
    pub fn new(title: &str, heading: &str, file_name: &str) -> Self {
        Self {
            title: title.to_string(),
            heading: heading.to_string(),
            file_name: file_name.to_string(),
        }
    }

    /// File name suggested for a report about `label`.
    #[must_use]
    pub fn file_name_for(&self, label: &str) -> String {
        self.file_name.replace("{label}", &label.replace(' ', "_"))
    }
}

/// Titled, order-preserving list of key/value lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDocument {
    title: String,
    generated_at: Option<DateTime<Utc>>,
    entries: IndexMap<String, String>,
}

impl ReportDocument {
    /// Empty document.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            generated_at: None,
            entries: IndexMap::new(),
        }
    }

    /// Stamps the document with a generation time, printed under the title.
    #[must_use]
    pub fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Appends an entry, builder style.
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Appends an entry; a repeated key keeps its first position and takes the new value.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Document title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Entries in insertion order.
    #[must_use]
    pub const fn entries(&self) -> &IndexMap<String, String> {
        &self.entries
    }

    fn body_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.entries.len() + 1);
        if let Some(at) = self.generated_at {
            lines.push(format!("Generated: {}", at.format("%Y-%m-%d %H:%M UTC")));
        }
        for (key, value) in &self.entries {
            lines.extend(wrap(&format!("{key}: {value}"), WRAP_COLUMNS));
        }
        lines
    }
}

/// Serialises a report document to bytes.
pub trait ReportFormat {
    /// MIME type of the output.
    fn content_type(&self) -> &'static str;

    /// Conventional file extension, without the dot.
    fn extension(&self) -> &'static str;

    /// Renders the document.
    fn render(&self, document: &ReportDocument) -> Vec<u8>;
}

/// Plain UTF-8 text rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReport;

impl ReportFormat for TextReport {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, document: &ReportDocument) -> Vec<u8> {
        let mut out = String::new();
        let _ = writeln!(out, "{}", document.title);
        let _ = writeln!(out, "{}", "=".repeat(document.title.chars().count()));
        for line in document.body_lines() {
            let _ = writeln!(out, "{line}");
        }
        out.into_bytes()
    }
}

/// Single-font PDF 1.4 rendering with automatic page breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfReport;

impl ReportFormat for PdfReport {
    fn content_type(&self) -> &'static str {
        "application/pdf"
    }

    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn render(&self, document: &ReportDocument) -> Vec<u8> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let per_page = ((PAGE_HEIGHT - 2.0 * MARGIN - 2.0 * LINE_HEIGHT) / LINE_HEIGHT) as usize;
        let lines = document.body_lines();
        let mut pages: Vec<&[String]> = lines.chunks(per_page).collect();
        if pages.is_empty() {
            pages.push(&[]);
        }

        // 1 catalog, 2 page tree, 3 font, then a (page, content) pair per page.
        let page_id = |idx: usize| 4 + 2 * idx;
        let mut objects: Vec<Vec<u8>> = vec![
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                (0..pages.len())
                    .map(|idx| format!("{} 0 R", page_id(idx)))
                    .collect::<Vec<_>>()
                    .join(" "),
                pages.len()
            )
            .into_bytes(),
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_vec(),
        ];
        for (idx, page_lines) in pages.iter().enumerate() {
            let title = (idx == 0).then_some(document.title.as_str());
            let content = page_content(title, page_lines);
            objects.push(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
                     /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                    page_id(idx) + 1
                )
                .into_bytes(),
            );
            let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
            stream.extend_from_slice(&content);
            stream.extend_from_slice(b"\nendstream");
            objects.push(stream);
        }
        assemble_pdf(&objects)
    }
}

fn page_content(title: Option<&str>, lines: &[String]) -> Vec<u8> {
    let mut content = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;
    if let Some(title) = title {
        #[allow(clippy::cast_precision_loss)]
        let width = title.chars().count() as f64 * TITLE_SIZE * 0.5;
        let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);
        text_op(&mut content, TITLE_SIZE, x, y, title);
        y -= 2.0 * LINE_HEIGHT;
    }
    for line in lines {
        text_op(&mut content, BODY_SIZE, MARGIN, y, line);
        y -= LINE_HEIGHT;
    }
    content
}

fn text_op(content: &mut Vec<u8>, size: f64, x: f64, y: f64, text: &str) {
    content.extend_from_slice(format!("BT /F1 {size} Tf {x:.1} {y:.1} Td (").as_bytes());
    content.extend(escape_latin1(text));
    content.extend_from_slice(b") Tj ET\n");
}

/// Latin-1 bytes of `text` with PDF string escapes; other characters become `?`.
fn escape_latin1(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let byte = u8::try_from(u32::from(ch)).unwrap_or(b'?');
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            0..=0x1f => out.push(b' '),
            _ => out.push(byte),
        }
    }
    out
}

fn assemble_pdf(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (idx, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", idx + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }
    let xref_at = pdf.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(xref, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
        objects.len() + 1
    );
    pdf.extend_from_slice(xref.as_bytes());
    pdf
}

/// Greedy word wrap; words longer than `width` are left whole.
fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
            current.push_str("    ");
        }
        if !current.trim().is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
