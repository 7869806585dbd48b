//! msrlib — MusicXML-to-MSR translation engine.
//!
//! One pass of a notation-conversion pipeline: a generic element tree
//! mirroring the MusicXML schema (the MXSR) is translated, in two phases,
//! into a hierarchical Music Score Representation (the MSR).  The first
//! phase builds the empty score skeleton (part-groups, parts, staves,
//! voices); the second performs a single ordered traversal that resolves
//! MusicXML's flat, order-dependent event stream — chord continuation
//! flags, tuplet start/stop markers, backup/forward cursor moves,
//! ahead-of-note directions — into a strictly nested score tree.
//!
//! Supports both uncompressed MusicXML (.musicxml) and compressed MXL
//! (.mxl) files.
//!
//! # Example
//! ```no_run
//! use msrlib::translate_file;
//!
//! let translation = translate_file("path/to/score.musicxml").unwrap();
//! println!("Title: {:?}", translation.score.work_title);
//! println!("Parts: {}", translation.score.parts().len());
//! println!("Warnings: {}", translation.diagnostics.warning_count());
//! ```

pub mod chords;
pub mod cursor;
pub mod diagnostics;
pub mod msr;
pub mod mxsr;
pub mod pending;
pub mod skeleton;
pub mod translator;
pub mod tuplets;

use std::path::Path;

use thiserror::Error;

pub use diagnostics::{Diagnostic, Diagnostics, Severity, TranslationError};
pub use msr::{Rational, Score};
pub use mxsr::MxsrError;
pub use translator::{translate, translate_with_sink, PassReport, Translation};

/// Anything that can go wrong between a file path and a finished score.
#[derive(Debug, Error)]
pub enum MsrlibError {
    #[error("failed to read file '{path}': {message}")]
    Io { path: String, message: String },

    #[error(transparent)]
    Mxsr(#[from] MxsrError),

    #[error(transparent)]
    Translation(#[from] TranslationError),
}

/// Translate a MusicXML file from a file path.
/// Automatically detects format based on file extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
pub fn translate_file<P: AsRef<Path>>(path: P) -> Result<Translation, MsrlibError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| MsrlibError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    translate_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Translate MusicXML from raw bytes with an optional format hint.
/// If `extension` is None, tries to auto-detect the format.
pub fn translate_bytes(data: &[u8], extension: Option<&str>) -> Result<Translation, MsrlibError> {
    let root = mxsr::from_bytes(data, extension)?;
    Ok(translate(&root)?)
}

/// Translate a MusicXML document string.
pub fn translate_musicxml(xml: &str) -> Result<Translation, MsrlibError> {
    let root = mxsr::from_xml(xml)?;
    Ok(translate(&root)?)
}

/// Convert a finished score to a JSON string.
/// Useful for passing the tree across process boundaries.
pub fn score_to_json(score: &Score) -> Result<String, String> {
    serde_json::to_string_pretty(score).map_err(|e| format!("JSON serialization error: {e}"))
}
