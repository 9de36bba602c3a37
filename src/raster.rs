use crate::assets::{AssetFetcher, AssetStore};
use crate::canvas::{Command, Document, FontWeight, TextAlign};
use crate::error::CardPressError;
use crate::font::FontRegistry;
use crate::types::{Color, Mm};
use tiny_skia::{
    FillRule, FilterQuality, LineCap, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint,
    Stroke, StrokeDash, Transform,
};
use ttf_parser::OutlineBuilder;

/// Base raster density. One CR80 card at this density is roughly the
/// on-screen size the layout was designed against; the oversample
/// factor multiplies it for print sharpness.
const BASE_PX_PER_MM: f32 = 4.0;

/// Print captures need at least double density or card text smears.
pub const MIN_OVERSAMPLE: f32 = 2.0;
pub const DEFAULT_OVERSAMPLE: f32 = 3.0;

/// The single shared raster surface.
///
/// Holds at most one mounted document at a time; the lifecycle is
/// mount -> settle -> capture -> unmount, and the orchestrator owns the
/// target exclusively for the duration of a record's two captures.
/// Mounting over an occupied target or capturing an empty one are
/// programmer errors surfaced as `TargetBusy` / `TargetNotMounted`.
pub struct RenderTarget {
    mounted: Option<Document>,
    settled: bool,
    assets: AssetStore,
    fonts: FontRegistry,
    px_per_mm: f32,
}

impl RenderTarget {
    pub fn new(fonts: FontRegistry, oversample: f32) -> Result<Self, CardPressError> {
        if !oversample.is_finite() || oversample < MIN_OVERSAMPLE {
            return Err(CardPressError::InvalidConfiguration(format!(
                "oversample {oversample} below minimum {MIN_OVERSAMPLE}"
            )));
        }
        Ok(Self {
            mounted: None,
            settled: false,
            assets: AssetStore::new(),
            fonts,
            px_per_mm: BASE_PX_PER_MM * oversample,
        })
    }

    /// Pre-seed a named image resource, e.g. the institution logo.
    pub fn seed_asset(&mut self, id: &str, bytes: &[u8]) -> Result<(), CardPressError> {
        self.assets.insert_bytes(id, bytes)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn mount(&mut self, document: Document) -> Result<(), CardPressError> {
        if self.mounted.is_some() {
            return Err(CardPressError::TargetBusy);
        }
        self.mounted = Some(document);
        self.settled = false;
        Ok(())
    }

    /// Resolve every image resource the mounted document references.
    ///
    /// This replaces a timed wait: capture proceeds once all embedded
    /// images are either decoded or known-broken. Broken photos degrade
    /// to the placeholder drawn under them, so settle itself never
    /// fails a record.
    pub fn settle(&mut self, fetcher: &dyn AssetFetcher) -> Result<(), CardPressError> {
        let document = self.mounted.as_ref().ok_or(CardPressError::TargetNotMounted)?;
        for id in document.image_resource_ids() {
            self.assets.resolve(&id, fetcher);
        }
        self.settled = true;
        Ok(())
    }

    /// Rasterize the mounted document's first page to a bitmap at the
    /// configured density. The caller must have settled first; an
    /// unsettled capture still renders but unresolved images fall back
    /// to their slot background.
    pub fn capture(&self) -> Result<Pixmap, CardPressError> {
        let document = self.mounted.as_ref().ok_or(CardPressError::TargetNotMounted)?;
        let page = document
            .pages
            .first()
            .ok_or_else(|| CardPressError::Compose("mounted document has no pages".to_string()))?;

        let width_px = document.page_size.width.to_px_i64(self.px_per_mm);
        let height_px = document.page_size.height.to_px_i64(self.px_per_mm);
        if width_px <= 0 || height_px <= 0 || width_px > u16::MAX as i64 || height_px > u16::MAX as i64
        {
            return Err(CardPressError::InvalidConfiguration(format!(
                "invalid raster size {width_px}x{height_px}"
            )));
        }
        let mut pixmap = Pixmap::new(width_px as u32, height_px as u32).ok_or_else(|| {
            CardPressError::InvalidConfiguration(format!(
                "cannot allocate {width_px}x{height_px} pixmap"
            ))
        })?;
        pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));

        let mut state = RasterState::default();
        let mut stack: Vec<RasterState> = Vec::new();
        for command in &page.commands {
            self.render_command(command, &mut pixmap, &mut state, &mut stack);
        }
        Ok(pixmap)
    }

    pub fn unmount(&mut self) -> Option<Document> {
        self.settled = false;
        self.mounted.take()
    }

    /// Forget fetched photos so the next batch sees fresh data. Seeded
    /// assets such as the logo stay cached.
    pub fn evict_resolved(&mut self) {
        self.assets.evict_resolved();
    }

    fn px(&self, v: Mm) -> f32 {
        v.to_f32() * self.px_per_mm
    }

    fn render_command(
        &self,
        command: &Command,
        pixmap: &mut Pixmap,
        state: &mut RasterState,
        stack: &mut Vec<RasterState>,
    ) {
        match command {
            Command::SaveState => stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(saved) = stack.pop() {
                    *state = saved;
                }
            }
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetStrokeColor(color) => state.stroke_color = *color,
            Command::SetLineWidth(width) => state.line_width = *width,
            Command::SetDash { pattern, phase } => {
                state.dash_pattern = pattern.clone();
                state.dash_phase = *phase;
            }
            Command::ClipCircle { cx, cy, radius } => {
                let mut builder = PathBuilder::new();
                builder.push_circle(self.px(*cx), self.px(*cy), self.px(*radius));
                if let Some(path) = builder.finish() {
                    let mut mask = match Mask::new(pixmap.width(), pixmap.height()) {
                        Some(mask) => mask,
                        None => return,
                    };
                    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
                    // Card templates clip at most one level deep, so a
                    // fresh mask replaces rather than intersects.
                    state.clip_mask = Some(mask);
                }
            }
            Command::FillRect(rect) => {
                if let Some(path) = self.rect_path(rect) {
                    self.fill(pixmap, &path, state.fill_color, state);
                }
            }
            Command::StrokeRect(rect) => {
                if let Some(path) = self.rect_path(rect) {
                    self.stroke(pixmap, &path, state);
                }
            }
            Command::DrawLine { x1, y1, x2, y2 } => {
                let mut builder = PathBuilder::new();
                builder.move_to(self.px(*x1), self.px(*y1));
                builder.line_to(self.px(*x2), self.px(*y2));
                if let Some(path) = builder.finish() {
                    self.stroke(pixmap, &path, state);
                }
            }
            Command::FillCircle { cx, cy, radius } => {
                let mut builder = PathBuilder::new();
                builder.push_circle(self.px(*cx), self.px(*cy), self.px(*radius));
                if let Some(path) = builder.finish() {
                    self.fill(pixmap, &path, state.fill_color, state);
                }
            }
            Command::StrokeCircle { cx, cy, radius } => {
                let mut builder = PathBuilder::new();
                builder.push_circle(self.px(*cx), self.px(*cy), self.px(*radius));
                if let Some(path) = builder.finish() {
                    self.stroke(pixmap, &path, state);
                }
            }
            Command::DrawText {
                x,
                y,
                size,
                weight,
                align,
                text,
            } => self.draw_text(pixmap, state, *x, *y, *size, *weight, *align, text),
            Command::DrawImage { rect, resource_id } => {
                // Unresolved resources degrade to whatever the template
                // drew underneath (the placeholder glyph for photos).
                let Some(source) = self.assets.get(resource_id) else {
                    return;
                };
                if source.width() == 0 || source.height() == 0 {
                    return;
                }
                let sx = self.px(rect.width) / source.width() as f32;
                let sy = self.px(rect.height) / source.height() as f32;
                let transform =
                    Transform::from_row(sx, 0.0, 0.0, sy, self.px(rect.x), self.px(rect.y));
                let paint = PixmapPaint {
                    quality: FilterQuality::Bilinear,
                    ..PixmapPaint::default()
                };
                pixmap.draw_pixmap(
                    0,
                    0,
                    source.as_ref(),
                    &paint,
                    transform,
                    state.clip_mask.as_ref(),
                );
            }
        }
    }

    fn rect_path(&self, rect: &crate::types::Rect) -> Option<Path> {
        let skia_rect = tiny_skia::Rect::from_xywh(
            self.px(rect.x),
            self.px(rect.y),
            self.px(rect.width).max(f32::MIN_POSITIVE),
            self.px(rect.height).max(f32::MIN_POSITIVE),
        )?;
        Some(PathBuilder::from_rect(skia_rect))
    }

    fn fill(&self, pixmap: &mut Pixmap, path: &Path, color: Color, state: &RasterState) {
        let mut paint = Paint::default();
        paint.set_color(to_skia_color(color));
        paint.anti_alias = true;
        pixmap.fill_path(
            path,
            &paint,
            FillRule::Winding,
            Transform::identity(),
            state.clip_mask.as_ref(),
        );
    }

    fn stroke(&self, pixmap: &mut Pixmap, path: &Path, state: &RasterState) {
        let mut paint = Paint::default();
        paint.set_color(to_skia_color(state.stroke_color));
        paint.anti_alias = true;
        let dash = if state.dash_pattern.len() >= 2 {
            let pattern: Vec<f32> = state.dash_pattern.iter().map(|v| self.px(*v)).collect();
            StrokeDash::new(pattern, self.px(state.dash_phase))
        } else {
            None
        };
        let stroke = Stroke {
            width: self.px(state.line_width).max(0.5),
            line_cap: LineCap::Butt,
            dash,
            ..Stroke::default()
        };
        pixmap.stroke_path(
            path,
            &paint,
            &stroke,
            Transform::identity(),
            state.clip_mask.as_ref(),
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &self,
        pixmap: &mut Pixmap,
        state: &RasterState,
        x: Mm,
        y: Mm,
        size: Mm,
        weight: FontWeight,
        align: TextAlign,
        text: &str,
    ) {
        // Text capture is best-effort: no registered face leaves the
        // slot empty rather than failing geometry-only pipelines.
        let Some(face) = self.fonts.face(weight) else {
            return;
        };
        let upem = face.units_per_em() as f32;
        if upem <= 0.0 {
            return;
        }
        let size_px = self.px(size);
        let scale = size_px / upem;

        let width = self.fonts.measure(text, size, weight);
        let mut pen_x = match align {
            TextAlign::Left => self.px(x),
            TextAlign::Center => self.px(x) - self.px(width) / 2.0,
            TextAlign::Right => self.px(x) - self.px(width),
        };
        let baseline_y = self.px(y);

        let mut paint = Paint::default();
        paint.set_color(to_skia_color(state.fill_color));
        paint.anti_alias = true;

        for ch in text.chars() {
            let Some(glyph) = face.glyph_index(ch) else {
                pen_x += size_px * 0.5;
                continue;
            };
            let mut outline = GlyphOutline::new();
            if face.outline_glyph(glyph, &mut outline).is_some() {
                if let Some(path) = outline.builder.finish() {
                    // Font outlines are y-up; the canvas is y-down.
                    let transform =
                        Transform::from_row(scale, 0.0, 0.0, -scale, pen_x, baseline_y);
                    if let Some(path) = path.transform(transform) {
                        pixmap.fill_path(
                            &path,
                            &paint,
                            FillRule::Winding,
                            Transform::identity(),
                            state.clip_mask.as_ref(),
                        );
                    }
                }
            }
            let advance = face
                .glyph_hor_advance(glyph)
                .map(|adv| adv as f32 * scale)
                .unwrap_or(size_px * 0.5);
            pen_x += advance;
        }
    }
}

#[derive(Clone)]
struct RasterState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Mm,
    dash_pattern: Vec<Mm>,
    dash_phase: Mm,
    clip_mask: Option<Mask>,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Mm::from_f32(0.2),
            dash_pattern: Vec::new(),
            dash_phase: Mm::ZERO,
            clip_mask: None,
        }
    }
}

struct GlyphOutline {
    builder: PathBuilder,
}

impl GlyphOutline {
    fn new() -> Self {
        Self {
            builder: PathBuilder::new(),
        }
    }
}

impl OutlineBuilder for GlyphOutline {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn to_skia_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        1.0,
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::{MapFetcher, png_bytes};
    use crate::canvas::Canvas;
    use crate::card::{CardText, render_front};
    use crate::payload::encode_qr;
    use crate::record::tests::sample_record;
    use crate::types::{Rect, Size};
    use std::collections::HashMap;

    fn has_non_white_pixel(pixmap: &Pixmap) -> bool {
        pixmap.data().chunks_exact(4).any(|px| {
            !(px[0] == 255 && px[1] == 255 && px[2] == 255)
        })
    }

    fn target() -> RenderTarget {
        RenderTarget::new(FontRegistry::new(), DEFAULT_OVERSAMPLE).unwrap()
    }

    #[test]
    fn oversample_below_minimum_is_rejected() {
        let err = RenderTarget::new(FontRegistry::new(), 1.0).err().unwrap();
        assert!(matches!(err, CardPressError::InvalidConfiguration(_)));
    }

    #[test]
    fn capture_without_mount_is_target_not_mounted() {
        let target = target();
        assert!(matches!(
            target.capture(),
            Err(CardPressError::TargetNotMounted)
        ));
    }

    #[test]
    fn settle_without_mount_is_target_not_mounted() {
        let mut target = target();
        assert!(matches!(
            target.settle(&MapFetcher(HashMap::new())),
            Err(CardPressError::TargetNotMounted)
        ));
    }

    #[test]
    fn double_mount_is_target_busy() {
        let mut target = target();
        let doc = Canvas::new(Size::from_mm(10.0, 10.0)).finish();
        target.mount(doc.clone()).unwrap();
        assert!(matches!(target.mount(doc), Err(CardPressError::TargetBusy)));
        target.unmount();
        assert!(!target.is_mounted());
    }

    #[test]
    fn capture_dimensions_follow_oversample() {
        let mut target = target();
        target
            .mount(Canvas::new(Size::from_mm(85.6, 54.0)).finish())
            .unwrap();
        let pixmap = target.capture().unwrap();
        // 85.6 mm * 4 px/mm * 3x oversample.
        assert_eq!(pixmap.width(), 1027);
        assert_eq!(pixmap.height(), 648);
    }

    #[test]
    fn filled_rect_produces_non_white_pixels() {
        let mut canvas = Canvas::new(Size::from_mm(20.0, 20.0));
        canvas.set_fill_color(crate::types::Color::BLACK);
        canvas.fill_rect(Rect::new(
            Mm::from_f32(5.0),
            Mm::from_f32(5.0),
            Mm::from_f32(10.0),
            Mm::from_f32(10.0),
        ));
        let mut target = target();
        target.mount(canvas.finish()).unwrap();
        let pixmap = target.capture().unwrap();
        assert!(has_non_white_pixel(&pixmap));
    }

    #[test]
    fn front_without_photo_captures_with_placeholder() {
        let mut record = sample_record(1);
        record.profile_photo_url = None;
        let qr = encode_qr("x").unwrap();
        let doc = render_front(&record, &qr, &CardText::default());
        let mut target = target();
        target.mount(doc).unwrap();
        target.settle(&MapFetcher(HashMap::new())).unwrap();
        let pixmap = target.capture().unwrap();
        assert!(has_non_white_pixel(&pixmap));
    }

    #[test]
    fn broken_photo_url_still_captures() {
        let mut record = sample_record(2);
        record.profile_photo_url = Some("https://broken.example/p.png".to_string());
        let qr = encode_qr("x").unwrap();
        let doc = render_front(&record, &qr, &CardText::default());
        let mut target = target();
        target.mount(doc).unwrap();
        target.settle(&MapFetcher(HashMap::new())).unwrap();
        assert!(target.capture().is_ok());
    }

    #[test]
    fn resolved_photo_pixels_reach_the_capture() {
        let mut record = sample_record(3);
        record.profile_photo_url = Some("photo".to_string());
        let qr = encode_qr("x").unwrap();
        let doc = render_front(&record, &qr, &CardText::default());

        let mut map = HashMap::new();
        // Saturated red so the photo is distinguishable from chrome.
        map.insert("photo".to_string(), png_bytes(255, 0, 0));
        let mut target = target();
        target.mount(doc).unwrap();
        target.settle(&MapFetcher(map)).unwrap();
        let pixmap = target.capture().unwrap();
        let has_red = pixmap
            .data()
            .chunks_exact(4)
            .any(|px| px[0] > 200 && px[1] < 60 && px[2] < 60);
        assert!(has_red, "expected photo pixels in the capture");
    }

    #[test]
    fn unmount_returns_the_document_and_clears_the_target() {
        let mut target = target();
        target
            .mount(Canvas::new(Size::from_mm(10.0, 10.0)).finish())
            .unwrap();
        assert!(target.unmount().is_some());
        assert!(target.unmount().is_none());
        assert!(matches!(
            target.capture(),
            Err(CardPressError::TargetNotMounted)
        ));
    }
}
