use crate::canvas::FontWeight;
use crate::error::CardPressError;
use crate::types::Mm;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use ttf_parser::Face;

/// Owns TTF bytes per weight and hands out parsed faces on demand.
///
/// The card templates use two weights. A missing bold face falls back
/// to regular; an empty registry is legal and simply leaves text out of
/// captures (geometry never depends on glyphs).
#[derive(Default, Clone)]
pub struct FontRegistry {
    faces: HashMap<FontWeight, Arc<Vec<u8>>>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bytes(
        &mut self,
        weight: FontWeight,
        bytes: Vec<u8>,
    ) -> Result<(), CardPressError> {
        Face::parse(&bytes, 0)
            .map_err(|err| CardPressError::Asset(format!("unusable font face: {err}")))?;
        self.faces.insert(weight, Arc::new(bytes));
        Ok(())
    }

    pub fn register_file(
        &mut self,
        weight: FontWeight,
        path: impl AsRef<Path>,
    ) -> Result<(), CardPressError> {
        let bytes = std::fs::read(path.as_ref())?;
        self.register_bytes(weight, bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Parsed face for the weight, falling back to regular. Parsing a
    /// validated face cannot fail, so the option only reflects absence.
    pub fn face(&self, weight: FontWeight) -> Option<Face<'_>> {
        let bytes = self
            .faces
            .get(&weight)
            .or_else(|| self.faces.get(&FontWeight::Regular))?;
        Face::parse(bytes, 0).ok()
    }

    /// Advance width of `text` at `size` in millimetres. Characters
    /// without a glyph contribute half an em, keeping measurement total.
    pub fn measure(&self, text: &str, size: Mm, weight: FontWeight) -> Mm {
        let Some(face) = self.face(weight) else {
            // No face registered: estimate so centered text still
            // anchors sensibly if a face appears later.
            return size * (text.chars().count() as f32) * 0.5;
        };
        let upem = face.units_per_em() as f32;
        let mut units = 0.0f32;
        for ch in text.chars() {
            let advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .map(|adv| adv as f32)
                .unwrap_or(upem * 0.5);
            units += advance;
        }
        size * (units / upem)
    }
}
