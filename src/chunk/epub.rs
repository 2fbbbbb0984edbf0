//! EPUB chunker: one chunk per spine chapter, window-split when oversized.
//!
//! The EPUB container is a ZIP archive: `META-INF/container.xml` names the
//! OPF package file, whose `<spine>` gives chapter order. Chapter HTML is
//! stripped to plain text before splitting.

use std::io::Read;
use std::path::Path;

use scraper::{Html, Selector};

use crate::config::ChunkerTypeConfig;
use crate::error::{Error, Result};
use crate::llm::tokens::approx_tokens;
use crate::models::ChunkDraft;

use super::{html_to_text, split_fixed_window};

pub fn chunk(path: &Path, config: &ChunkerTypeConfig) -> Result<Vec<ChunkDraft>> {
    let chapters = extract_chapters(path)?;

    let mut drafts = Vec::new();
    for (chapter_index, chapter) in chapters.into_iter().enumerate() {
        let pieces = if approx_tokens(&chapter) <= config.chunk_size {
            vec![chapter]
        } else {
            split_fixed_window(&chapter, config.chunk_size, config.overlap)
        };
        for piece in pieces {
            drafts.push(ChunkDraft::with_metadata(
                drafts.len(),
                piece,
                serde_json::json!({ "chapter": chapter_index }),
            ));
        }
    }
    Ok(drafts)
}

fn extract_chapters(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| epub_error(path, &format!("not a readable EPUB archive: {e}")))?;

    let container = read_entry(&mut archive, "META-INF/container.xml")
        .ok_or_else(|| epub_error(path, "missing META-INF/container.xml"))?;
    let opf_path = find_opf_path(&container, &mut archive)
        .ok_or_else(|| epub_error(path, "no OPF package file found"))?;

    let opf = read_entry(&mut archive, &opf_path)
        .ok_or_else(|| epub_error(path, &format!("OPF file '{opf_path}' missing from archive")))?;
    let hrefs = parse_opf_spine(&opf);

    let opf_dir = Path::new(&opf_path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut chapters = Vec::new();
    for href in hrefs {
        let candidates = if opf_dir.is_empty() {
            vec![href.clone()]
        } else {
            vec![format!("{opf_dir}/{href}"), href.clone()]
        };
        for candidate in candidates {
            if let Some(html) = read_entry(&mut archive, &candidate) {
                let text = html_to_text(&html);
                if !text.trim().is_empty() {
                    chapters.push(text);
                }
                break;
            }
        }
    }
    Ok(chapters)
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut content = String::new();
    entry.read_to_string(&mut content).ok()?;
    Some(content)
}

fn find_opf_path<R: Read + std::io::Seek>(
    container_xml: &str,
    archive: &mut zip::ZipArchive<R>,
) -> Option<String> {
    let document = Html::parse_document(container_xml);
    let selector = Selector::parse("rootfile").ok()?;
    if let Some(rootfile) = document.select(&selector).next() {
        if let Some(full_path) = rootfile.value().attr("full-path") {
            return Some(full_path.to_string());
        }
    }
    // Fallback: first .opf entry anywhere in the archive
    (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .find(|name| name.ends_with(".opf"))
}

/// Ordered chapter hrefs from the OPF spine, falling back to all HTML
/// manifest items when the spine is empty.
fn parse_opf_spine(opf_xml: &str) -> Vec<String> {
    let document = Html::parse_document(opf_xml);
    let item_selector = match Selector::parse("item") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let itemref_selector = match Selector::parse("itemref") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    let mut manifest: Vec<(String, String)> = Vec::new();
    for item in document.select(&item_selector) {
        let id = item.value().attr("id").unwrap_or_default();
        let href = item.value().attr("href").unwrap_or_default();
        let media_type = item.value().attr("media-type").unwrap_or_default();
        let is_html = media_type.contains("html")
            || href.ends_with(".html")
            || href.ends_with(".xhtml")
            || href.ends_with(".htm");
        if is_html && !id.is_empty() && !href.is_empty() {
            manifest.push((id.to_string(), href.to_string()));
        }
    }

    let mut hrefs = Vec::new();
    for itemref in document.select(&itemref_selector) {
        if let Some(idref) = itemref.value().attr("idref") {
            if let Some((_, href)) = manifest.iter().find(|(id, _)| id == idref) {
                hrefs.push(href.clone());
            }
        }
    }
    if hrefs.is_empty() {
        hrefs = manifest.into_iter().map(|(_, href)| href).collect();
    }
    hrefs
}

fn epub_error(path: &Path, detail: &str) -> Error {
    Error::UnsupportedSource(format!("EPUB '{}': {detail}", path.display()))
}
