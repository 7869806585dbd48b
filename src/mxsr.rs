//! MXSR — the generic element tree the translation engine consumes.
//!
//! Every node mirrors one MusicXML element: a kind tag, an ordered list of
//! element children, an attribute map, optional text content, and the source
//! line number for diagnostics.  The engine never touches raw XML; this
//! module owns the boundary to the external reader (roxmltree) and to
//! compressed .mxl archives (ZIP).

use std::io::{Cursor, Read};

use roxmltree::{Document, Node};
use thiserror::Error;
use zip::ZipArchive;

/// Errors building an MXSR from input bytes.
#[derive(Debug, Clone, Error)]
pub enum MxsrError {
    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("unsupported root element '{0}': only 'score-partwise' is supported")]
    UnsupportedRoot(String),

    #[error("invalid UTF-8 in MusicXML input: {0}")]
    InvalidUtf8(String),

    #[error("MXL archive error: {0}")]
    Archive(String),

    #[error("no MusicXML file found in MXL archive")]
    NoRootfile,
}

/// One element of the source tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element kind tag, e.g. "note", "measure", "part-group".
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Element children in document order.
    pub children: Vec<Element>,
    /// Trimmed text content, if any.
    pub text: Option<String>,
    /// 1-based source line number (0 when built programmatically).
    pub line: u32,
}

impl Element {
    /// Build a bare element, for tests and programmatic construction.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            text: None,
            line: 0,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given kind tag.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given kind tag, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Text content of the first child with the given tag.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.text.as_deref())
    }

    pub fn child_i32(&self, name: &str) -> Option<i32> {
        self.child_text(name).and_then(|t| t.parse().ok())
    }

    pub fn child_f64(&self, name: &str) -> Option<f64> {
        self.child_text(name).and_then(|t| t.parse().ok())
    }

    pub fn text_i32(&self) -> Option<i32> {
        self.text.as_deref().and_then(|t| t.parse().ok())
    }
}

/// Build an MXSR from MusicXML text.
///
/// MusicXML files carry a DOCTYPE declaration, so DTDs must be allowed.
/// Only `score-partwise` documents are accepted.
pub fn from_xml(xml: &str) -> Result<Element, MxsrError> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = Document::parse_with_options(xml, options)
        .map_err(|e| MxsrError::XmlParse(e.to_string()))?;
    let root = doc.root_element();

    if root.tag_name().name() != "score-partwise" {
        return Err(MxsrError::UnsupportedRoot(
            root.tag_name().name().to_string(),
        ));
    }

    Ok(convert_node(&doc, &root))
}

fn convert_node(doc: &Document, node: &Node) -> Element {
    let line = doc.text_pos_at(node.range().start).row;

    let attributes = node
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();

    let children = node
        .children()
        .filter(|n| n.is_element())
        .map(|n| convert_node(doc, &n))
        .collect();

    let text = node
        .children()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(String::from);

    Element {
        name: node.tag_name().name().to_string(),
        attributes,
        children,
        text,
        line,
    }
}

/// Build an MXSR from compressed .mxl bytes.
pub fn from_mxl(data: &[u8]) -> Result<Element, MxsrError> {
    let xml = extract_musicxml_from_mxl(data)?;
    from_xml(&xml)
}

/// Build an MXSR from raw bytes with an optional extension hint.
/// With no hint, tries XML first and falls back to MXL, as the file
/// pickers on every platform hand us extensionless blobs.
pub fn from_bytes(data: &[u8], extension: Option<&str>) -> Result<Element, MxsrError> {
    match extension {
        Some("mxl") => from_mxl(data),
        Some("musicxml") | Some("xml") => {
            let xml = std::str::from_utf8(data).map_err(|e| MxsrError::InvalidUtf8(e.to_string()))?;
            from_xml(xml)
        }
        _ => {
            if let Ok(xml) = std::str::from_utf8(data) {
                if xml.trim_start().starts_with("<?xml") || xml.trim_start().starts_with('<') {
                    return from_xml(xml);
                }
            }
            from_mxl(data)
        }
    }
}

/// Extract the MusicXML content string from .mxl bytes.
///
/// An .mxl file is a ZIP archive whose META-INF/container.xml names the
/// root MusicXML file; archives without a container get a fallback scan
/// for the first non-META-INF .xml/.musicxml entry.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String, MxsrError> {
    let cursor = Cursor::new(data);
    let mut archive = ZipArchive::new(cursor).map_err(|e| MxsrError::Archive(e.to_string()))?;

    let root_file_path = read_container_xml(&mut archive)?;

    let mut root_file = archive
        .by_name(&root_file_path)
        .map_err(|e| MxsrError::Archive(format!("root file '{root_file_path}' not found: {e}")))?;

    let mut xml = String::new();
    root_file
        .read_to_string(&mut xml)
        .map_err(|e| MxsrError::Archive(format!("failed to read '{root_file_path}': {e}")))?;

    Ok(xml)
}

fn read_container_xml(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, MxsrError> {
    let container_xml = {
        match archive.by_name("META-INF/container.xml") {
            Ok(mut container_file) => {
                let mut xml = String::new();
                container_file
                    .read_to_string(&mut xml)
                    .map_err(|e| MxsrError::Archive(format!("failed to read container.xml: {e}")))?;
                Some(xml)
            }
            Err(_) => None,
        }
    }; // mutable borrow of archive is released here

    if let Some(xml) = container_xml {
        let doc = Document::parse(&xml)
            .map_err(|e| MxsrError::Archive(format!("failed to parse container.xml: {e}")))?;

        for node in doc.descendants() {
            if node.tag_name().name() == "rootfile" {
                if let Some(path) = node.attribute("full-path") {
                    return Ok(path.to_string());
                }
            }
        }

        return Err(MxsrError::NoRootfile);
    }

    // Fallback: look for common MusicXML filenames in the archive
    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .collect();

    for name in &names {
        if !name.starts_with("META-INF/") && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        {
            return Ok(name.clone());
        }
    }

    Err(MxsrError::NoRootfile)
}
