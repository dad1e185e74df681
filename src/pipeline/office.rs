//! Office Open XML extraction: DOCX, PPTX and XLSX.
//!
//! DOCX and PPTX are ZIP archives of XML parts; we open them with `zip` and
//! walk the relevant parts with `quick-xml`, keeping only what a reader would
//! call "the text". XLSX cell values need shared-string, number and boolean
//! decoding, which `calamine` already does, so spreadsheets go through it.
//!
//! Each walker tracks the element stack so it can tell body-level content
//! (a paragraph directly under `w:body`, a shape directly under `p:spTree`)
//! from the same element nested inside a table or a group.

use super::document::{DocumentKind, ExtractOptions};
use crate::config::FalsyCells;
use crate::error::ScriptGenError;
use calamine::{Data, Range, Reader, Xlsx};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

type Archive<'a> = ZipArchive<Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8], kind: DocumentKind) -> Result<Archive<'_>, ScriptGenError> {
    ZipArchive::new(Cursor::new(bytes)).map_err(|e| ScriptGenError::extraction(kind, e))
}

/// Read one archive member as UTF-8 text; `Ok(None)` if it does not exist.
fn read_part(
    archive: &mut Archive<'_>,
    name: &str,
    kind: DocumentKind,
) -> Result<Option<String>, ScriptGenError> {
    let mut file = match archive.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(ScriptGenError::extraction(kind, e)),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| ScriptGenError::extraction(kind, format!("{name}: {e}")))?;
    Ok(Some(xml))
}

fn require_part(
    archive: &mut Archive<'_>,
    name: &str,
    kind: DocumentKind,
) -> Result<String, ScriptGenError> {
    read_part(archive, name, kind)?
        .ok_or_else(|| ScriptGenError::extraction(kind, format!("missing {name}")))
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

/// `.docx` extractor: body-level paragraphs joined by `\n`.
///
/// Paragraphs inside tables are skipped; runs keep tabs and breaks.
pub fn extract_docx_text(bytes: &[u8], _options: &ExtractOptions) -> Result<String, ScriptGenError> {
    let mut archive = open_archive(bytes, DocumentKind::Docx)?;
    let xml = require_part(&mut archive, "word/document.xml", DocumentKind::Docx)?;
    let paragraphs =
        docx_paragraphs(&xml).map_err(|e| ScriptGenError::extraction(DocumentKind::Docx, e))?;
    debug!("DOCX: {} body paragraphs", paragraphs.len());
    Ok(paragraphs.join("\n"))
}

fn docx_paragraphs(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = XmlReader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut para_depth = 0;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                let parent_is_body = stack.last().is_some_and(|p| p.as_slice() == b"body");
                if name == b"p" && current.is_none() && parent_is_body {
                    current = Some(String::new());
                    para_depth = stack.len();
                } else if name == b"t" && current.is_some() {
                    in_text = true;
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = e.local_name();
                // Tab stops under `w:pPr/w:tabs` share the `tab` name; only run content renders.
                let in_run = stack.last().is_some_and(|p| p.as_slice() == b"r");
                match (current.as_mut(), name.as_ref()) {
                    (Some(p), b"tab") if in_run => p.push('\t'),
                    (Some(p), b"br" | b"cr") if in_run => p.push('\n'),
                    (None, b"p") if stack.last().is_some_and(|p| p.as_slice() == b"body") => {
                        paragraphs.push(String::new())
                    }
                    _ => {}
                }
            }
            Event::Text(t) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::End(e) => {
                stack.pop();
                match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"p" if stack.len() == para_depth => {
                        if let Some(p) = current.take() {
                            paragraphs.push(p);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}

// ── PPTX ─────────────────────────────────────────────────────────────────────

/// `.pptx` extractor: the text of every top-level shape, slide by slide,
/// each followed by `\n`.
pub fn extract_pptx_text(bytes: &[u8], _options: &ExtractOptions) -> Result<String, ScriptGenError> {
    let kind = DocumentKind::Pptx;
    let mut archive = open_archive(bytes, kind)?;

    let presentation = require_part(&mut archive, "ppt/presentation.xml", kind)?;
    let slide_ids = slide_relationship_ids(&presentation).map_err(|e| ScriptGenError::extraction(kind, e))?;
    if slide_ids.is_empty() {
        return Ok(String::new());
    }

    let rels = require_part(&mut archive, "ppt/_rels/presentation.xml.rels", kind)?;
    let targets = relationship_targets(&rels).map_err(|e| ScriptGenError::extraction(kind, e))?;

    let mut text = String::new();
    for rid in &slide_ids {
        let target = targets
            .get(rid)
            .ok_or_else(|| ScriptGenError::extraction(kind, format!("slide relationship {rid} not found")))?;
        let part = resolve_target("ppt", target);
        let slide = require_part(&mut archive, &part, kind)?;
        for shape in slide_shape_texts(&slide).map_err(|e| ScriptGenError::extraction(kind, e))? {
            text.push_str(&shape);
            text.push('\n');
        }
    }
    debug!("PPTX: {} slides, {} chars", slide_ids.len(), text.len());
    Ok(text)
}

/// `r:id` of every `p:sldId`, in presentation order.
fn slide_relationship_ids(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = XmlReader::from_str(xml);
    let mut ids = Vec::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sldId" => {
                let rid = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id")
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                if let Some(rid) = rid {
                    ids.push(rid);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(ids)
}

/// `Id → Target` for every relationship in a `.rels` part.
fn relationship_targets(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut reader = XmlReader::from_str(xml);
    let mut targets = HashMap::new();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_value(&e, b"Id"), attr_value(&e, b"Target")) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(targets)
}

/// Turn a relationship target into an archive path.
fn resolve_target(base_dir: &str, target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}/{target}"),
    }
}

/// Text of each `p:sp` directly under `p:spTree`, paragraphs joined by `\n`.
///
/// A text-capable shape with no text body still contributes an empty string.
fn slide_shape_texts(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = XmlReader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut shapes = Vec::new();
    let mut shape: Option<Vec<String>> = None;
    let mut shape_depth = 0;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                let parent_is_tree = stack.last().is_some_and(|p| p.as_slice() == b"spTree");
                match (&mut shape, name.as_slice()) {
                    (None, b"sp") if parent_is_tree => {
                        shape = Some(Vec::new());
                        shape_depth = stack.len();
                    }
                    (Some(paras), b"p") => paras.push(String::new()),
                    (Some(_), b"t") => in_text = true,
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => match (&mut shape, e.local_name().as_ref()) {
                (Some(paras), b"p") => paras.push(String::new()),
                (Some(paras), b"br") => {
                    if let Some(last) = paras.last_mut() {
                        last.push('\n');
                    }
                }
                (None, b"sp") if stack.last().is_some_and(|p| p.as_slice() == b"spTree") => {
                    shapes.push(String::new())
                }
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(last) = shape.as_mut().and_then(|paras| paras.last_mut()) {
                    last.push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::End(e) => {
                stack.pop();
                match e.local_name().as_ref() {
                    b"t" => in_text = false,
                    b"sp" if stack.len() == shape_depth => {
                        if let Some(paras) = shape.take() {
                            shapes.push(paras.join("\n"));
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(shapes)
}

// ── XLSX ─────────────────────────────────────────────────────────────────────

/// `.xlsx` extractor: a `SHEET: <name>` marker per worksheet, then one line
/// per row with cells joined by `", "`.
///
/// Rows and columns are anchored at `A1`, so a sheet whose data starts at
/// `B3` still renders two leading blank rows and one leading blank cell per
/// row. A sheet with no data renders as a single empty row.
pub fn extract_xlsx_text(bytes: &[u8], options: &ExtractOptions) -> Result<String, ScriptGenError> {
    let kind = DocumentKind::Xlsx;
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes)).map_err(|e| ScriptGenError::extraction(kind, e))?;

    let mut text = String::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| ScriptGenError::extraction(kind, format!("sheet '{name}': {e}")))?;
        text.push_str(&format!("\nSHEET: {name}\n"));
        append_sheet_rows(&mut text, &range, options.falsy_cells);
    }
    Ok(text)
}

fn append_sheet_rows(out: &mut String, range: &Range<Data>, falsy: FalsyCells) {
    let (Some((first_row, first_col)), Some((_, last_col))) = (range.start(), range.end()) else {
        out.push('\n');
        return;
    };
    let width = last_col as usize + 1;

    for _ in 0..first_row {
        out.push_str(&vec![""; width].join(", "));
        out.push('\n');
    }
    for row in range.rows() {
        let mut cells = vec![String::new(); first_col as usize];
        cells.extend(row.iter().map(|cell| render_cell(cell, falsy)));
        out.push_str(&cells.join(", "));
        out.push('\n');
    }
}

fn render_cell(cell: &Data, falsy: FalsyCells) -> String {
    let blank_falsy = falsy == FalsyCells::Blank;
    match cell {
        Data::Empty => String::new(),
        Data::Bool(false) if blank_falsy => String::new(),
        Data::Int(0) if blank_falsy => String::new(),
        Data::Float(f) if blank_falsy && *f == 0.0 => String::new(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}
