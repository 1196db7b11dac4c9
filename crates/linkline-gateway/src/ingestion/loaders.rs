//! One loader per document family. Loading is synchronous and meant to run
//! on the documents lane.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::debug;

use super::FileType;
use crate::error::{GatewayError, Result};
use crate::utils::TextUtils;
use crate::vector_store::Metadata;

lazy_static! {
    static ref SLIDE_PART_REGEX: Regex = Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap();
}

/// A page, row or slide of extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPage {
    pub text: String,
    pub metadata: Metadata,
}

impl LoadedPage {
    fn new(text: String, key: &str, position: usize) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), json!(position));
        Self { text, metadata }
    }
}

pub fn load_document(path: &Path, file_type: FileType) -> Result<Vec<LoadedPage>> {
    let pages = match file_type {
        FileType::Pdf => load_pdf(path)?,
        FileType::Txt => load_text(path)?,
        FileType::Csv => load_csv(path)?,
        FileType::Doc | FileType::Docx => load_word(path)?,
        FileType::Ppt | FileType::Pptx => load_slides(path)?,
    };
    debug!("Loaded {} page(s) from {} as {}", pages.len(), path.display(), file_type);
    Ok(pages)
}

/// Pages are separated by form feeds in the extracted text; `page` is zero-based.
fn load_pdf(path: &Path) -> Result<Vec<LoadedPage>> {
    let bytes = fs::read(path)?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| GatewayError::Parse(format!("PDF parse error: {}", e)))?;

    Ok(text
        .split('\u{c}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(index, page)| LoadedPage::new(page.to_string(), "page", index))
        .collect())
}

fn load_text(path: &Path) -> Result<Vec<LoadedPage>> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|e| GatewayError::Parse(format!("Text file is not valid UTF-8: {}", e)))?;
    Ok(vec![LoadedPage { text, metadata: Metadata::new() }])
}

/// One page per data row, each line rendered as `header: value`.
fn load_csv(path: &Path) -> Result<Vec<LoadedPage>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut pages = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| GatewayError::Parse(format!("Failed to parse CSV row {}: {}", row + 1, e)))?;
        let text = record
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let header = headers.get(idx).unwrap_or("");
                format!("{}: {}", header, field.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");
        pages.push(LoadedPage::new(text, "row", row));
    }
    Ok(pages)
}

fn open_ooxml(path: &Path, kind: &str) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path)?;
    zip::ZipArchive::new(file).map_err(|e| {
        GatewayError::Parse(format!(
            "{} is not an Office Open XML {} document (legacy binary formats are not supported): {}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
            kind,
            e
        ))
    })
}

fn read_part(archive: &mut zip::ZipArchive<File>, name: &str) -> Result<String> {
    let mut part = archive.by_name(name)?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

fn load_word(path: &Path) -> Result<Vec<LoadedPage>> {
    let mut archive = open_ooxml(path, "Word")?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    let text = TextUtils::ooxml_paragraphs(&xml, "w:p").join("\n");
    Ok(vec![LoadedPage { text, metadata: Metadata::new() }])
}

/// One page per slide in presentation order; `slide` is one-based.
fn load_slides(path: &Path) -> Result<Vec<LoadedPage>> {
    let mut archive = open_ooxml(path, "PowerPoint")?;

    let mut slides: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = SLIDE_PART_REGEX.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut pages = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let xml = read_part(&mut archive, &name)?;
        let text = TextUtils::ooxml_paragraphs(&xml, "a:p").join("\n");
        if !text.is_empty() {
            pages.push(LoadedPage::new(text, "slide", number));
        }
    }
    Ok(pages)
}
