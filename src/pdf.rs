use crate::error::CardPressError;
use crate::types::{Mm, Rect, Size};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject,
    Stream as LoStream, StringFormat, dictionary};
use sha2::{Digest, Sha256};
use tiny_skia::Pixmap;

/// Accumulating multi-page PDF of placed card bitmaps.
///
/// Pages are addressed by index so grid placement can target
/// `page = record_index / 4` directly; gaps are materialized as empty
/// pages. The trailer ID is a digest of everything placed, so the same
/// batch composes to the same document identity.
pub struct PdfComposer {
    page_size: Size,
    pages: Vec<PageContent>,
    hasher: Sha256,
}

#[derive(Default)]
struct PageContent {
    images: Vec<ImagePlacement>,
    captions: Vec<Caption>,
}

struct ImagePlacement {
    rect: Rect,
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

struct Caption {
    center_x: Mm,
    y: Mm,
    size_pt: f32,
    text: String,
}

impl PdfComposer {
    pub fn new(page_size: Size) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(page_size.width.to_micro_i64().to_le_bytes());
        hasher.update(page_size.height.to_micro_i64().to_le_bytes());
        Self {
            page_size,
            pages: Vec::new(),
            hasher,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn page_mut(&mut self, page: usize) -> &mut PageContent {
        while self.pages.len() <= page {
            self.pages.push(PageContent::default());
        }
        &mut self.pages[page]
    }

    /// Place a captured bitmap into `rect` (top-left millimetre
    /// coordinates) on the given page.
    pub fn place_bitmap(
        &mut self,
        page: usize,
        rect: Rect,
        pixmap: &Pixmap,
    ) -> Result<(), CardPressError> {
        if pixmap.width() == 0 || pixmap.height() == 0 {
            return Err(CardPressError::Compose("empty bitmap placement".to_string()));
        }
        let rgb = pixmap_rgb(pixmap);
        self.hasher.update(page.to_le_bytes());
        self.hasher.update(rect.x.to_micro_i64().to_le_bytes());
        self.hasher.update(rect.y.to_micro_i64().to_le_bytes());
        self.hasher.update(&rgb);
        self.page_mut(page).images.push(ImagePlacement {
            rect,
            width: pixmap.width(),
            height: pixmap.height(),
            rgb,
        });
        Ok(())
    }

    /// Centered single-line caption in the built-in Helvetica face.
    pub fn place_caption(
        &mut self,
        page: usize,
        center_x: Mm,
        y: Mm,
        size_pt: f32,
        text: impl Into<String>,
    ) {
        let text = text.into();
        self.hasher.update(text.as_bytes());
        self.page_mut(page).captions.push(Caption {
            center_x,
            y,
            size_pt,
            text,
        });
    }

    pub fn finish(self) -> Result<Vec<u8>, CardPressError> {
        if self.pages.is_empty() {
            return Err(CardPressError::Compose("no pages composed".to_string()));
        }
        let page_width_pt = self.page_size.width.to_pt_f32();
        let page_height_pt = self.page_size.height.to_pt_f32();

        let mut doc = LoDocument::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut page_ids: Vec<LoObject> = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let mut xobjects = LoDictionary::new();
            let mut operations: Vec<Operation> = Vec::new();

            for (index, image) in page.images.iter().enumerate() {
                let name = format!("Im{index}");
                let stream = LoStream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => image.width as i64,
                        "Height" => image.height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                    },
                    image.rgb.clone(),
                );
                let image_id = doc.add_object(stream);
                xobjects.set(name.as_bytes().to_vec(), LoObject::Reference(image_id));

                let w = image.rect.width.to_pt_f32();
                let h = image.rect.height.to_pt_f32();
                let x = image.rect.x.to_pt_f32();
                // Canvas coordinates are y-down, PDF user space is y-up.
                let y = page_height_pt - image.rect.y.to_pt_f32() - h;
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![
                        LoObject::Real(w),
                        LoObject::Real(0.0),
                        LoObject::Real(0.0),
                        LoObject::Real(h),
                        LoObject::Real(x),
                        LoObject::Real(y),
                    ],
                ));
                operations.push(Operation::new("Do", vec![LoObject::Name(name.into_bytes())]));
                operations.push(Operation::new("Q", vec![]));
            }

            for caption in &page.captions {
                // Helvetica averages roughly half an em per glyph; close
                // enough for centering a short title line.
                let est_width = caption.size_pt * 0.5 * caption.text.chars().count() as f32;
                let x = caption.center_x.to_pt_f32() - est_width / 2.0;
                let y = page_height_pt - caption.y.to_pt_f32();
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![LoObject::Name(b"F1".to_vec()), LoObject::Real(caption.size_pt)],
                ));
                operations.push(Operation::new(
                    "Td",
                    vec![LoObject::Real(x), LoObject::Real(y)],
                ));
                operations.push(Operation::new(
                    "Tj",
                    vec![LoObject::String(
                        caption.text.bytes().collect(),
                        StringFormat::Literal,
                    )],
                ));
                operations.push(Operation::new("ET", vec![]));
            }

            let content = Content { operations };
            let content_bytes = content
                .encode()
                .map_err(|err| CardPressError::Compose(format!("content encode: {err}")))?;
            let content_id = doc.add_object(LoStream::new(LoDictionary::new(), content_bytes));

            let resources = dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            };
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    LoObject::Real(page_width_pt),
                    LoObject::Real(page_height_pt),
                ],
            });
            page_ids.push(page_id.into());
        }

        let count = page_ids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids,
            "Count" => count,
        };
        doc.objects
            .insert(pages_id, LoObject::Dictionary(pages_dict));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        // Deterministic document identity from the placed content.
        let digest = self.hasher.finalize();
        let id = digest[..16].to_vec();
        doc.trailer.set(
            "ID",
            LoObject::Array(vec![
                LoObject::String(id.clone(), StringFormat::Hexadecimal),
                LoObject::String(id, StringFormat::Hexadecimal),
            ]),
        );

        doc.compress();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|err| CardPressError::Compose(format!("pdf save: {err}")))?;
        Ok(bytes)
    }
}

/// Demultiplied RGB triples, row-major.
fn pixmap_rgb(pixmap: &Pixmap) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((pixmap.width() * pixmap.height() * 3) as usize);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        rgb.extend_from_slice(&[color.red(), color.green(), color.blue()]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_pixmap(w: u32, h: u32) -> Pixmap {
        let mut pixmap = Pixmap::new(w, h).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(200, 10, 10, 255));
        pixmap
    }

    fn card_rect() -> Rect {
        Rect::new(
            Mm::from_f32(10.0),
            Mm::from_f32(10.0),
            Mm::from_f32(85.6),
            Mm::from_f32(54.0),
        )
    }

    #[test]
    fn placing_on_page_two_materializes_gap_pages() {
        let mut composer = PdfComposer::new(Size::a4_portrait());
        composer
            .place_bitmap(2, card_rect(), &solid_pixmap(4, 4))
            .unwrap();
        assert_eq!(composer.page_count(), 3);
    }

    #[test]
    fn finished_document_parses_with_expected_page_count() {
        let mut composer = PdfComposer::new(Size::a4_portrait());
        for page in 0..2 {
            composer
                .place_bitmap(page, card_rect(), &solid_pixmap(4, 4))
                .unwrap();
        }
        composer.place_caption(0, Mm::from_f32(105.0), Mm::from_f32(20.0), 10.0, "Title");
        let bytes = composer.finish().unwrap();
        let parsed = LoDocument::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 2);
    }

    #[test]
    fn identical_placements_compose_identical_bytes() {
        let build = || {
            let mut composer = PdfComposer::new(Size::a4_landscape());
            composer
                .place_bitmap(0, card_rect(), &solid_pixmap(8, 8))
                .unwrap();
            composer.finish().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn empty_composer_refuses_to_finish() {
        let composer = PdfComposer::new(Size::a4_portrait());
        assert!(matches!(
            composer.finish(),
            Err(CardPressError::Compose(_))
        ));
    }

    #[test]
    fn composer_starts_empty() {
        let composer = PdfComposer::new(Size::a4_portrait());
        assert!(composer.is_empty());
        assert_eq!(composer.page_count(), 0);
    }
}
