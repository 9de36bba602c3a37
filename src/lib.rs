mod archive;
mod assets;
mod batch;
mod canvas;
mod card;
mod debug;
mod error;
mod font;
mod layout;
mod payload;
mod pdf;
mod raster;
mod record;
mod selection;
mod types;

pub use archive::ArchiveBuilder;
pub use assets::{AssetFetcher, AssetStore, FileFetcher};
pub use batch::{
    BatchOrchestrator, BatchOutcome, BatchState, CancelToken, ExportMode, ExportOutput, Progress,
};
pub use canvas::{Canvas, Command, Document, FontWeight, Page, TextAlign};
pub use card::{CARD_HEIGHT_MM, CARD_WIDTH_MM, CardText};
use chrono::Utc;
use debug::DebugLogger;
pub use error::CardPressError;
pub use font::FontRegistry;
pub use layout::{GridSlot, grid_page_count, grid_slot, single_slot};
pub use payload::{QrMatrix, VerificationPayload, encode_qr};
pub use pdf::PdfComposer;
pub use raster::{DEFAULT_OVERSAMPLE, MIN_OVERSAMPLE, RenderTarget};
pub use record::{EnrollmentStatus, StudentRecord};
pub use selection::Selection;
pub use types::{Color, Mm, Rect, Size};

/// Batch ID-card exporter. Owns the render target, asset fetcher and
/// card wording for its lifetime; one instance serves any number of
/// sequential exports.
pub struct CardPress {
    target: RenderTarget,
    fetcher: Box<dyn AssetFetcher>,
    card_text: CardText,
    debug: Option<DebugLogger>,
}

enum FontSource {
    Bytes(FontWeight, Vec<u8>),
    File(FontWeight, std::path::PathBuf),
}

pub struct CardPressBuilder {
    fonts: Vec<FontSource>,
    logo: Option<Vec<u8>>,
    oversample: f32,
    card_text: CardText,
    fetcher: Option<Box<dyn AssetFetcher>>,
    debug_path: Option<std::path::PathBuf>,
}

impl Default for CardPressBuilder {
    fn default() -> Self {
        Self {
            fonts: Vec::new(),
            logo: None,
            oversample: DEFAULT_OVERSAMPLE,
            card_text: CardText::default(),
            fetcher: None,
            debug_path: None,
        }
    }
}

impl CardPressBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn font_bytes(mut self, weight: FontWeight, bytes: Vec<u8>) -> Self {
        self.fonts.push(FontSource::Bytes(weight, bytes));
        self
    }

    pub fn font_file(mut self, weight: FontWeight, path: impl Into<std::path::PathBuf>) -> Self {
        self.fonts.push(FontSource::File(weight, path.into()));
        self
    }

    /// Institution logo, decoded once and reused on every card front.
    pub fn logo_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.logo = Some(bytes);
        self
    }

    /// Capture density in pixels per base unit; values below 2.0 are
    /// rejected at build time because QR modules stop being scannable.
    pub fn oversample(mut self, oversample: f32) -> Self {
        self.oversample = oversample;
        self
    }

    pub fn card_text(mut self, text: CardText) -> Self {
        self.card_text = text;
        self
    }

    /// Replaces the default filesystem/data-URI fetcher, e.g. with an
    /// HTTP client or a test double.
    pub fn fetcher(mut self, fetcher: Box<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Enables JSON-lines batch diagnostics at the given path.
    pub fn debug_log(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<CardPress, CardPressError> {
        let mut registry = FontRegistry::new();
        for source in self.fonts {
            match source {
                FontSource::Bytes(weight, bytes) => registry.register_bytes(weight, bytes)?,
                FontSource::File(weight, path) => registry.register_file(weight, path)?,
            }
        }

        let mut target = RenderTarget::new(registry, self.oversample)?;
        if let Some(bytes) = &self.logo {
            target.seed_asset(card::LOGO_RESOURCE_ID, bytes)?;
        }

        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };

        Ok(CardPress {
            target,
            fetcher: self
                .fetcher
                .unwrap_or_else(|| Box::<FileFetcher>::default()),
            card_text: self.card_text,
            debug,
        })
    }
}

impl CardPress {
    pub fn builder() -> CardPressBuilder {
        CardPressBuilder::new()
    }

    /// Export the selection without progress reporting or cancellation.
    pub fn export_bulk(
        &mut self,
        records: &[StudentRecord],
        mode: ExportMode,
    ) -> Result<ExportOutput, CardPressError> {
        match self.export_bulk_with(records, mode, CancelToken::new(), |_| {})? {
            BatchOutcome::Completed(output) => Ok(output),
            // The token above is never shared, so the batch cannot be
            // cancelled; keep the error path total anyway.
            BatchOutcome::Cancelled => Err(CardPressError::Compose(
                "batch cancelled before completion".to_string(),
            )),
        }
    }

    /// Full-control export: caller supplies the cancellation token and
    /// receives one progress callback per record.
    pub fn export_bulk_with(
        &mut self,
        records: &[StudentRecord],
        mode: ExportMode,
        cancel: CancelToken,
        on_progress: impl FnMut(Progress),
    ) -> Result<BatchOutcome, CardPressError> {
        let mut orchestrator =
            BatchOrchestrator::new(&mut self.target, self.fetcher.as_ref(), &self.card_text);
        orchestrator.set_cancel_token(cancel);
        orchestrator.set_debug(self.debug.clone());
        orchestrator.run(records, mode, Utc::now(), on_progress)
    }

    /// One record, one landscape page: both card sides plus a title
    /// caption naming the holder.
    pub fn export_single(
        &mut self,
        record: &StudentRecord,
    ) -> Result<ExportOutput, CardPressError> {
        let now = Utc::now();
        let payload = VerificationPayload::from_record(record, now);
        let qr = encode_qr(&payload.to_json()?)?;

        let front = self.capture_side(card::render_front(record, &qr, &self.card_text));
        let back = self.capture_side(card::render_back(now.date_naive(), &self.card_text));
        self.target.evict_resolved();
        let (front, back) = (front?, back?);

        let page_size = Size::a4_landscape();
        let (front_rect, back_rect) = single_slot(page_size);
        let mut composer = PdfComposer::new(page_size);
        composer.place_caption(
            0,
            page_size.width / 2,
            Mm::from_f32(12.0),
            14.0,
            format!("Student ID Card - {}", record.full_name),
        );
        composer.place_bitmap(0, front_rect, &front)?;
        composer.place_bitmap(0, back_rect, &back)?;

        let stem = archive::sanitize_entry_stem(&record.file_stem());
        Ok(ExportOutput {
            bytes: composer.finish()?,
            filename: format!("student_id_card_{stem}.pdf"),
            failed: Vec::new(),
        })
    }

    fn capture_side(&mut self, document: Document) -> Result<tiny_skia::Pixmap, CardPressError> {
        self.target.mount(document)?;
        let result = self
            .target
            .settle(self.fetcher.as_ref())
            .and_then(|_| self.target.capture());
        self.target.unmount();
        result
    }
}
