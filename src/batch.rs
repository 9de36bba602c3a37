use crate::archive::ArchiveBuilder;
use crate::assets::AssetFetcher;
use crate::canvas::Document;
use crate::card::{self, CardText};
use crate::debug::DebugLogger;
use crate::error::CardPressError;
use crate::layout::{grid_slot, single_slot};
use crate::payload::{VerificationPayload, encode_qr};
use crate::pdf::PdfComposer;
use crate::raster::RenderTarget;
use crate::record::StudentRecord;
use crate::types::Size;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiny_skia::Pixmap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Multi-page portrait PDF, four card-pairs per page.
    Grid,
    /// ZIP archive, one landscape PDF per record.
    Archive,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Grid => "grid",
            ExportMode::Archive => "archive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running(Progress),
    Completed,
    Failed,
    Cancelled,
}

/// Cooperative cancellation flag, checked once per record. The host
/// view sets it when it is dismissed; the batch stops at the next
/// record boundary without touching the partial output again.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Finished export: container bytes, suggested download filename, and
/// the ids of records that were skipped.
#[derive(Debug)]
pub struct ExportOutput {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub failed: Vec<i64>,
}

#[derive(Debug)]
pub enum BatchOutcome {
    Completed(ExportOutput),
    Cancelled,
}

/// Sequences render -> mount -> settle -> capture -> unmount across a
/// selection, one record at a time.
///
/// The target is owned exclusively for the whole batch and is always
/// unmounted between sides, so at most one document is ever mounted.
/// A per-record failure skips that record and reports its id in the
/// output; only finalization failures abort the batch. Both export
/// modes share this policy.
pub struct BatchOrchestrator<'a> {
    target: &'a mut RenderTarget,
    fetcher: &'a dyn AssetFetcher,
    card_text: &'a CardText,
    cancel: CancelToken,
    debug: Option<DebugLogger>,
    state: BatchState,
}

impl<'a> BatchOrchestrator<'a> {
    pub fn new(
        target: &'a mut RenderTarget,
        fetcher: &'a dyn AssetFetcher,
        card_text: &'a CardText,
    ) -> Self {
        Self {
            target,
            fetcher,
            card_text,
            cancel: CancelToken::new(),
            debug: None,
            state: BatchState::Idle,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Share an externally held token, e.g. one wired to a dismiss
    /// button before the batch starts.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub(crate) fn set_debug(&mut self, debug: Option<DebugLogger>) {
        self.debug = debug;
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Run one batch to a terminal state. `now` stamps the QR payloads,
    /// the card backs and the download filename.
    pub fn run(
        &mut self,
        records: &[StudentRecord],
        mode: ExportMode,
        now: DateTime<Utc>,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<BatchOutcome, CardPressError> {
        if records.is_empty() {
            // Validation failures never leave Idle.
            return Err(CardPressError::EmptySelection);
        }
        let total = records.len();
        self.state = BatchState::Running(Progress { current: 0, total });

        let result = self.run_inner(records, mode, now, &mut on_progress);
        match &result {
            Ok(BatchOutcome::Completed(_)) => self.state = BatchState::Completed,
            Ok(BatchOutcome::Cancelled) => self.state = BatchState::Cancelled,
            Err(_) => self.state = BatchState::Failed,
        }
        if let Some(debug) = &self.debug {
            debug.emit_summary(mode.as_str());
        }
        // Terminal states leave no mounted document behind, and photos
        // fetched for this batch are not served stale to the next one.
        self.target.unmount();
        self.target.evict_resolved();
        result
    }

    fn run_inner(
        &mut self,
        records: &[StudentRecord],
        mode: ExportMode,
        now: DateTime<Utc>,
        on_progress: &mut impl FnMut(Progress),
    ) -> Result<BatchOutcome, CardPressError> {
        let total = records.len();
        let today = now.date_naive();
        let mut failed: Vec<i64> = Vec::new();

        let mut grid = match mode {
            ExportMode::Grid => Some(PdfComposer::new(Size::a4_portrait())),
            ExportMode::Archive => None,
        };
        let mut archive = match mode {
            ExportMode::Archive => Some(ArchiveBuilder::new()),
            ExportMode::Grid => None,
        };
        // Index among successfully placed records; skipped records must
        // not leave blank slots in the grid.
        let mut placed = 0usize;

        for (index, record) in records.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(BatchOutcome::Cancelled);
            }

            let outcome = self.process_record(
                record,
                mode,
                now,
                today,
                placed,
                grid.as_mut(),
                archive.as_mut(),
            );
            match outcome {
                Ok(()) => {
                    placed += 1;
                    if let Some(debug) = &self.debug {
                        debug.record_event(record.id, mode.as_str(), "ok");
                    }
                }
                Err(_) => {
                    failed.push(record.id);
                    if let Some(debug) = &self.debug {
                        debug.record_event(record.id, mode.as_str(), "skipped");
                    }
                }
            }

            let progress = Progress {
                current: index + 1,
                total,
            };
            self.state = BatchState::Running(progress);
            on_progress(progress);
        }

        if placed == 0 {
            return Err(CardPressError::Compose(
                "every selected record failed to render".to_string(),
            ));
        }

        let stamp = now.timestamp_millis();
        let output = match mode {
            ExportMode::Grid => {
                let composer = grid.take().ok_or_else(|| {
                    CardPressError::Compose("grid composer missing".to_string())
                })?;
                ExportOutput {
                    bytes: composer.finish()?,
                    filename: format!("bulk_ids_grid_{stamp}.pdf"),
                    failed,
                }
            }
            ExportMode::Archive => {
                let builder = archive.take().ok_or_else(|| {
                    CardPressError::Archive("archive builder missing".to_string())
                })?;
                ExportOutput {
                    bytes: builder.finish()?,
                    filename: format!("ids_individual_{stamp}.zip"),
                    failed,
                }
            }
        };
        Ok(BatchOutcome::Completed(output))
    }

    #[allow(clippy::too_many_arguments)]
    fn process_record(
        &mut self,
        record: &StudentRecord,
        mode: ExportMode,
        now: DateTime<Utc>,
        today: chrono::NaiveDate,
        placed: usize,
        grid: Option<&mut PdfComposer>,
        archive: Option<&mut ArchiveBuilder>,
    ) -> Result<(), CardPressError> {
        let payload = VerificationPayload::from_record(record, now);
        let qr = encode_qr(&payload.to_json()?)?;

        // Front always precedes back; each side fully releases the
        // target before the next mount.
        let front = self.capture_side(card::render_front(record, &qr, self.card_text))?;
        let back = self.capture_side(card::render_back(today, self.card_text))?;

        match mode {
            ExportMode::Grid => {
                let composer = grid
                    .ok_or_else(|| CardPressError::Compose("grid composer missing".to_string()))?;
                let slot = grid_slot(placed);
                composer.place_bitmap(slot.page, slot.front, &front)?;
                composer.place_bitmap(slot.page, slot.back, &back)?;
            }
            ExportMode::Archive => {
                let builder = archive.ok_or_else(|| {
                    CardPressError::Archive("archive builder missing".to_string())
                })?;
                let page_size = Size::a4_landscape();
                let (front_rect, back_rect) = single_slot(page_size);
                let mut composer = PdfComposer::new(page_size);
                composer.place_bitmap(0, front_rect, &front)?;
                composer.place_bitmap(0, back_rect, &back)?;
                let bytes = composer.finish()?;
                builder.add_document(&record.file_stem(), record.id, &bytes)?;
            }
        }
        Ok(())
    }

    fn capture_side(&mut self, document: Document) -> Result<Pixmap, CardPressError> {
        self.target.mount(document)?;
        let result = self
            .target
            .settle(self.fetcher)
            .and_then(|_| self.target.capture());
        self.target.unmount();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::{MapFetcher, png_bytes};
    use crate::font::FontRegistry;
    use crate::raster::DEFAULT_OVERSAMPLE;
    use crate::record::tests::sample_record;
    use chrono::TimeZone;
    use lopdf::Document as LoDocument;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use zip::ZipArchive;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn fetcher() -> MapFetcher {
        MapFetcher(HashMap::new())
    }

    fn target() -> RenderTarget {
        RenderTarget::new(FontRegistry::new(), DEFAULT_OVERSAMPLE).unwrap()
    }

    /// Record whose QR payload exceeds version-40 capacity at level H,
    /// forcing a per-record failure.
    fn unencodable_record(id: i64) -> StudentRecord {
        let mut record = sample_record(id);
        record.full_name = "X".repeat(4000);
        record
    }

    #[test]
    fn empty_selection_is_rejected_before_any_state_change() {
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);
        let err = orchestrator
            .run(&[], ExportMode::Grid, now(), |_| {})
            .unwrap_err();
        assert!(matches!(err, CardPressError::EmptySelection));
        assert_eq!(orchestrator.state(), BatchState::Idle);
    }

    #[test]
    fn five_records_in_grid_mode_compose_two_pages() {
        let records: Vec<_> = (1..=5).map(sample_record).collect();
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);

        let mut seen = Vec::new();
        let outcome = orchestrator
            .run(&records, ExportMode::Grid, now(), |p| seen.push(p))
            .unwrap();
        let BatchOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert!(output.failed.is_empty());
        assert!(output.filename.starts_with("bulk_ids_grid_"));
        assert!(output.filename.ends_with(".pdf"));

        let parsed = LoDocument::load_mem(&output.bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 2);

        // Progress advanced once per record, in order.
        let currents: Vec<usize> = seen.iter().map(|p| p.current).collect();
        assert_eq!(currents, vec![1, 2, 3, 4, 5]);
        assert!(seen.iter().all(|p| p.total == 5));
        assert_eq!(orchestrator.state(), BatchState::Completed);
        assert!(!orchestrator.target.is_mounted());
    }

    #[test]
    fn archive_mode_produces_one_entry_per_record() {
        let records: Vec<_> = (7..=9).map(sample_record).collect();
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);

        let outcome = orchestrator
            .run(&records, ExportMode::Archive, now(), |_| {})
            .unwrap();
        let BatchOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert!(output.filename.starts_with("ids_individual_"));
        assert!(output.filename.ends_with(".zip"));

        let mut archive = ZipArchive::new(Cursor::new(output.bytes)).unwrap();
        assert_eq!(archive.len(), 3);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"MT-WP-01-0007-2025.pdf".to_string()));

        // Each entry is itself a parseable single-page PDF.
        let mut entry = archive.by_name("MT-WP-01-0007-2025.pdf").unwrap();
        let mut bytes = Vec::new();
        std::io::copy(&mut entry, &mut bytes).unwrap();
        let parsed = LoDocument::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn photos_are_fetched_fresh_on_each_batch() {
        struct CountingFetcher {
            inner: MapFetcher,
            calls: AtomicUsize,
        }

        impl AssetFetcher for CountingFetcher {
            fn fetch(&self, source: &str) -> Result<Vec<u8>, CardPressError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.inner.fetch(source)
            }
        }

        let mut record = sample_record(1);
        record.profile_photo_url = Some("photos/1.png".to_string());
        let mut map = HashMap::new();
        map.insert("photos/1.png".to_string(), png_bytes(40, 60, 80));
        let fetcher = CountingFetcher {
            inner: MapFetcher(map),
            calls: AtomicUsize::new(0),
        };
        let mut target = target();
        let text = CardText::default();

        let records = [record];
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);
        orchestrator
            .run(&records, ExportMode::Grid, now(), |_| {})
            .unwrap();
        let first_batch = fetcher.calls.load(Ordering::SeqCst);
        assert!(first_batch > 0);

        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);
        orchestrator
            .run(&records, ExportMode::Grid, now(), |_| {})
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), first_batch * 2);
    }

    #[test]
    fn failing_record_is_skipped_and_reported_in_both_modes() {
        for mode in [ExportMode::Grid, ExportMode::Archive] {
            let records = vec![sample_record(1), unencodable_record(2), sample_record(3)];
            let mut target = target();
            let fetcher = fetcher();
            let text = CardText::default();
            let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);

            let outcome = orchestrator.run(&records, mode, now(), |_| {}).unwrap();
            let BatchOutcome::Completed(output) = outcome else {
                panic!("expected completion");
            };
            assert_eq!(output.failed, vec![2], "mode {:?}", mode);
            assert_eq!(orchestrator.state(), BatchState::Completed);
        }
    }

    #[test]
    fn skipped_records_leave_no_blank_grid_slots() {
        // First record fails: survivors compact onto page 0, rows 0-1.
        let records = vec![unencodable_record(1), sample_record(2), sample_record(3)];
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);

        let outcome = orchestrator
            .run(&records, ExportMode::Grid, now(), |_| {})
            .unwrap();
        let BatchOutcome::Completed(output) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(output.failed, vec![1]);
        let parsed = LoDocument::load_mem(&output.bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn all_records_failing_fails_the_batch() {
        let records = vec![unencodable_record(1), unencodable_record(2)];
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);

        let err = orchestrator
            .run(&records, ExportMode::Grid, now(), |_| {})
            .unwrap_err();
        assert!(matches!(err, CardPressError::Compose(_)));
        assert_eq!(orchestrator.state(), BatchState::Failed);
    }

    #[test]
    fn cancellation_stops_at_the_next_record_boundary() {
        let records: Vec<_> = (1..=4).map(sample_record).collect();
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);
        let token = orchestrator.cancel_token();

        let mut processed = 0usize;
        let outcome = orchestrator
            .run(&records, ExportMode::Archive, now(), |p| {
                processed = p.current;
                if p.current == 2 {
                    token.cancel();
                }
            })
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::Cancelled));
        assert_eq!(processed, 2);
        assert_eq!(orchestrator.state(), BatchState::Cancelled);
        assert!(!orchestrator.target.is_mounted());
    }

    #[test]
    fn orchestrator_can_run_a_new_batch_after_terminal_state() {
        let records = vec![sample_record(1)];
        let mut target = target();
        let fetcher = fetcher();
        let text = CardText::default();
        let mut orchestrator = BatchOrchestrator::new(&mut target, &fetcher, &text);

        for _ in 0..2 {
            let outcome = orchestrator
                .run(&records, ExportMode::Grid, now(), |_| {})
                .unwrap();
            assert!(matches!(outcome, BatchOutcome::Completed(_)));
        }
    }
}
