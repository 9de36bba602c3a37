use crate::error::CardPressError;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// In-memory ZIP of per-record card documents.
///
/// Entry names derive from the registration number (numeric id when
/// absent). Registration numbers contain path separators
/// (`MT/WP/01/0007/2025`), so names are sanitized before use, and a
/// colliding name is disambiguated with the record id instead of
/// silently overwriting the earlier entry.
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
    entry_count: usize,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            names: HashSet::new(),
            entry_count: 0,
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Add one finished document. Returns the entry name actually used.
    pub fn add_document(
        &mut self,
        stem: &str,
        record_id: i64,
        bytes: &[u8],
    ) -> Result<String, CardPressError> {
        let base = sanitize_entry_stem(stem);
        let mut name = format!("{base}.pdf");
        if !self.names.insert(name.clone()) {
            name = format!("{base}_{record_id}.pdf");
            if !self.names.insert(name.clone()) {
                // Same id added twice is a caller bug, not data skew.
                return Err(CardPressError::Archive(format!(
                    "duplicate archive entry {name}"
                )));
            }
        }
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(&name, opts)?;
        self.writer.write_all(bytes)?;
        self.entry_count += 1;
        Ok(name)
    }

    /// Seal the container. Sealing failure is fatal to the batch.
    pub fn finish(mut self) -> Result<Vec<u8>, CardPressError> {
        let cursor = self.writer.finish()?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a registration number to a safe, flat entry stem: ASCII
/// alphanumerics, `.`, `_` and `-` survive; everything else becomes `-`.
pub(crate) fn sanitize_entry_stem(stem: &str) -> String {
    let trimmed = stem.trim();
    if trimmed.is_empty() {
        return "card".to_string();
    }
    trimmed
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect()
}
