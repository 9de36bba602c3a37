use crate::card::{CARD_HEIGHT_MM, CARD_WIDTH_MM};
use crate::types::{Mm, Rect, Size};

/// Grid mode packs card-pairs onto portrait pages, four rows per page.
pub const GRID_ROWS_PER_PAGE: usize = 4;
const GRID_TOP_MARGIN_MM: f32 = 10.0;
const GRID_LEFT_MARGIN_MM: f32 = 10.0;
const GRID_ROW_GAP_MM: f32 = 10.0;
const GRID_COLUMN_GAP_MM: f32 = 5.0;

/// Horizontal gap between front and back on a single-record page.
const SINGLE_PAIR_GAP_MM: f32 = 10.0;

/// Placement of one record's card-pair within the grid document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSlot {
    pub page: usize,
    pub row: usize,
    pub front: Rect,
    pub back: Rect,
}

/// Grid placement is a function of the batch index alone: `page = i/4`,
/// `row = i%4`, front beside back on the row. Identical selections in
/// identical order therefore produce identical geometry.
pub fn grid_slot(index: usize) -> GridSlot {
    let page = index / GRID_ROWS_PER_PAGE;
    let row = index % GRID_ROWS_PER_PAGE;
    let card_width = Mm::from_f32(CARD_WIDTH_MM);
    let card_height = Mm::from_f32(CARD_HEIGHT_MM);
    let y = Mm::from_f32(GRID_TOP_MARGIN_MM)
        + (card_height + Mm::from_f32(GRID_ROW_GAP_MM)) * row as i32;
    let front_x = Mm::from_f32(GRID_LEFT_MARGIN_MM);
    let back_x = front_x + card_width + Mm::from_f32(GRID_COLUMN_GAP_MM);
    GridSlot {
        page,
        row,
        front: Rect::new(front_x, y, card_width, card_height),
        back: Rect::new(back_x, y, card_width, card_height),
    }
}

pub fn grid_page_count(total: usize) -> usize {
    total.div_ceil(GRID_ROWS_PER_PAGE)
}

/// Archive mode centers the front/back pair on its own page. Both
/// positions derive from centering `2*card_width + gap` by
/// `card_height` within the page dimensions.
pub fn single_slot(page_size: Size) -> (Rect, Rect) {
    let card_width = Mm::from_f32(CARD_WIDTH_MM);
    let card_height = Mm::from_f32(CARD_HEIGHT_MM);
    let gap = Mm::from_f32(SINGLE_PAIR_GAP_MM);
    let pair_width = card_width * 2 + gap;
    let x = (page_size.width - pair_width) / 2;
    let y = (page_size.height - card_height) / 2;
    (
        Rect::new(x, y, card_width, card_height),
        Rect::new(x + card_width + gap, y, card_width, card_height),
    )
}
