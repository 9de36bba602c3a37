use crate::canvas::{Canvas, FontWeight, TextAlign};
use crate::payload::QrMatrix;
use crate::types::{Color, Mm, Rect, Size};
use chrono::NaiveDate;

/// CR80, the standard physical identity-card format. One canonical size
/// for every path that places a card.
pub const CARD_WIDTH_MM: f32 = 85.6;
pub const CARD_HEIGHT_MM: f32 = 54.0;

/// Resource id of the pre-seeded institution logo.
pub const LOGO_RESOURCE_ID: &str = "logo";

pub fn card_size() -> Size {
    Size::from_mm(CARD_WIDTH_MM, CARD_HEIGHT_MM)
}

/// Institution strings printed on both card sides. The defaults carry a
/// generic vocational-training wording; host applications override them
/// through the builder.
#[derive(Debug, Clone)]
pub struct CardText {
    pub title: String,
    pub subtitle: String,
    pub program: String,
    pub terms: Vec<String>,
    pub return_address: Vec<String>,
    pub website: String,
}

impl Default for CardText {
    fn default() -> Self {
        Self {
            title: "STUDENT ID CARD".to_string(),
            subtitle: "Vocational Training Authority".to_string(),
            program: "Technical Education Program".to_string(),
            terms: vec![
                "This card is the property of the issuing authority and must be \
                 returned upon completion of the course or upon request."
                    .to_string(),
                "Report loss or theft immediately to the center coordinator.".to_string(),
                "Valid only during the course duration. Misuse may result in \
                 disciplinary action."
                    .to_string(),
            ],
            return_address: vec![
                "If found, please return to:".to_string(),
                "Vocational Training Authority, Head Office".to_string(),
            ],
            website: "www.training.example".to_string(),
        }
    }
}

const BORDER_WIDTH: f32 = 0.5;
const HAIRLINE: f32 = 0.15;

fn mm(v: f32) -> Mm {
    Mm::from_f32(v)
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> Rect {
    Rect::new(mm(x), mm(y), mm(w), mm(h))
}

/// Card frame and institution header shared by both sides.
fn draw_chrome(canvas: &mut Canvas, text: &CardText) {
    canvas.set_fill_color(Color::WHITE);
    canvas.fill_rect(rect(0.0, 0.0, CARD_WIDTH_MM, CARD_HEIGHT_MM));
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_line_width(mm(BORDER_WIDTH));
    canvas.stroke_rect(rect(0.5, 0.5, CARD_WIDTH_MM - 1.0, CARD_HEIGHT_MM - 1.0));

    // Logo slot left of the centered header block.
    let logo_cx = 12.0;
    let logo_cy = 6.5;
    let logo_r = 3.2;
    canvas.set_line_width(mm(0.3));
    canvas.stroke_circle(mm(logo_cx), mm(logo_cy), mm(logo_r));
    canvas.save_state();
    canvas.clip_circle(mm(logo_cx), mm(logo_cy), mm(logo_r - 0.15));
    canvas.draw_image(
        rect(logo_cx - logo_r, logo_cy - logo_r, logo_r * 2.0, logo_r * 2.0),
        LOGO_RESOURCE_ID,
    );
    canvas.restore_state();

    let center_x = mm(CARD_WIDTH_MM / 2.0 + 5.0);
    canvas.set_fill_color(Color::BLACK);
    canvas.draw_text(
        center_x,
        mm(5.0),
        mm(3.0),
        FontWeight::Bold,
        TextAlign::Center,
        &text.title,
    );
    canvas.set_fill_color(Color::gray(0.25));
    canvas.draw_text(
        center_x,
        mm(8.2),
        mm(2.0),
        FontWeight::Regular,
        TextAlign::Center,
        &text.subtitle,
    );
    canvas.set_fill_color(Color::gray(0.4));
    canvas.draw_text(
        center_x,
        mm(10.8),
        mm(2.0),
        FontWeight::Regular,
        TextAlign::Center,
        &text.program,
    );

    canvas.set_stroke_color(Color::BLACK);
    canvas.set_line_width(mm(BORDER_WIDTH));
    canvas.draw_line(mm(2.0), mm(12.2), mm(CARD_WIDTH_MM - 2.0), mm(12.2));
}

/// Person silhouette drawn under the photo; a resolved photo paints
/// over it, an absent or broken photo leaves it visible.
fn draw_placeholder_glyph(canvas: &mut Canvas, cx: f32, cy: f32, slot_r: f32) {
    canvas.set_fill_color(Color::gray(0.93));
    canvas.fill_circle(mm(cx), mm(cy), mm(slot_r - 0.3));
    canvas.set_fill_color(Color::gray(0.55));
    // Head.
    canvas.fill_circle(mm(cx), mm(cy - slot_r * 0.28), mm(slot_r * 0.32));
    // Shoulders, clipped by the slot circle.
    canvas.save_state();
    canvas.clip_circle(mm(cx), mm(cy), mm(slot_r - 0.3));
    canvas.fill_circle(mm(cx), mm(cy + slot_r * 0.75), mm(slot_r * 0.62));
    canvas.restore_state();
}

fn draw_qr(canvas: &mut Canvas, qr: &QrMatrix, x: f32, y: f32, size: f32) {
    canvas.set_fill_color(Color::WHITE);
    canvas.fill_rect(rect(x, y, size, size));
    canvas.set_fill_color(Color::BLACK);
    let module = size / qr.width() as f32;
    for my in 0..qr.width() {
        for mx in 0..qr.width() {
            if qr.is_dark(mx, my) {
                canvas.fill_rect(rect(
                    x + mx as f32 * module,
                    y + my as f32 * module,
                    module,
                    module,
                ));
            }
        }
    }
}

/// Front side: header, photo slot, holder details, QR code and
/// signature lines. Pure in the record, QR matrix and date; optional
/// fields degrade to their documented labels.
pub fn render_front(
    record: &crate::record::StudentRecord,
    qr: &QrMatrix,
    text: &CardText,
) -> crate::canvas::Document {
    let mut canvas = Canvas::new(card_size());
    draw_chrome(&mut canvas, text);

    // Photo column.
    let photo_cx = 12.5;
    let photo_cy = 24.0;
    let photo_r = 7.5;
    draw_placeholder_glyph(&mut canvas, photo_cx, photo_cy, photo_r);
    if let Some(url) = record.profile_photo_url.as_deref() {
        if !url.trim().is_empty() {
            canvas.save_state();
            canvas.clip_circle(mm(photo_cx), mm(photo_cy), mm(photo_r - 0.3));
            canvas.draw_image(
                rect(
                    photo_cx - photo_r,
                    photo_cy - photo_r,
                    photo_r * 2.0,
                    photo_r * 2.0,
                ),
                url,
            );
            canvas.restore_state();
        }
    }
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_line_width(mm(0.5));
    canvas.stroke_circle(mm(photo_cx), mm(photo_cy), mm(photo_r));
    canvas.set_fill_color(Color::gray(0.3));
    canvas.draw_text(
        mm(photo_cx),
        mm(34.5),
        mm(2.0),
        FontWeight::Bold,
        TextAlign::Center,
        "PHOTO",
    );

    // Holder details.
    let details_x = 23.0;
    canvas.set_fill_color(Color::BLACK);
    canvas.draw_text(
        mm(details_x),
        mm(17.0),
        mm(2.8),
        FontWeight::Bold,
        TextAlign::Left,
        &record.full_name,
    );
    canvas.set_stroke_color(Color::gray(0.7));
    canvas.set_line_width(mm(HAIRLINE));
    canvas.draw_line(mm(details_x), mm(18.2), mm(58.0), mm(18.2));

    canvas.set_fill_color(Color::gray(0.2));
    canvas.draw_text(
        mm(details_x),
        mm(21.5),
        mm(2.2),
        FontWeight::Bold,
        TextAlign::Left,
        "Reg No:",
    );
    canvas.set_fill_color(Color::BLACK);
    canvas.draw_text(
        mm(details_x + 10.5),
        mm(21.5),
        mm(2.2),
        FontWeight::Bold,
        TextAlign::Left,
        &record.registration_no,
    );
    canvas.set_fill_color(Color::gray(0.2));
    canvas.draw_text(
        mm(details_x),
        mm(25.0),
        mm(2.2),
        FontWeight::Bold,
        TextAlign::Left,
        "NIC:",
    );
    canvas.set_fill_color(Color::BLACK);
    canvas.draw_text(
        mm(details_x + 10.5),
        mm(25.0),
        mm(2.2),
        FontWeight::Regular,
        TextAlign::Left,
        &record.nic_id,
    );

    // 2x2 field grid: course, center / district, enrollment date.
    let grid = [
        (details_x, 29.5, record.course_label().to_string()),
        (42.5, 29.5, record.center_label().to_string()),
        (details_x, 33.0, record.district.clone()),
        (42.5, 33.0, record.enrollment_date_label()),
    ];
    canvas.set_fill_color(Color::gray(0.15));
    for (x, y, value) in grid {
        canvas.draw_text(
            mm(x),
            mm(y),
            mm(2.0),
            FontWeight::Regular,
            TextAlign::Left,
            value,
        );
    }

    // QR column.
    canvas.set_stroke_color(Color::BLACK);
    canvas.set_line_width(mm(0.4));
    canvas.stroke_rect(rect(62.0, 14.0, 20.0, 20.0));
    draw_qr(&mut canvas, qr, 63.0, 15.0, 18.0);
    canvas.set_fill_color(Color::gray(0.4));
    canvas.draw_text(
        mm(72.0),
        mm(36.8),
        mm(2.0),
        FontWeight::Regular,
        TextAlign::Center,
        "Scan to verify",
    );
    canvas.set_fill_color(Color::gray(0.25));
    canvas.draw_text(
        mm(72.0),
        mm(39.6),
        mm(2.0),
        FontWeight::Regular,
        TextAlign::Center,
        format!("ID: {}", record.id),
    );

    // Signature area.
    canvas.set_stroke_color(Color::gray(0.5));
    canvas.set_line_width(mm(HAIRLINE));
    canvas.set_dash(vec![mm(1.0), mm(0.8)], Mm::ZERO);
    canvas.draw_line(mm(2.0), mm(44.5), mm(CARD_WIDTH_MM - 2.0), mm(44.5));
    canvas.set_dash(Vec::new(), Mm::ZERO);

    canvas.set_fill_color(Color::BLACK);
    canvas.draw_text(
        mm(4.0),
        mm(48.0),
        mm(2.0),
        FontWeight::Bold,
        TextAlign::Left,
        "STUDENT SIGN",
    );
    canvas.set_stroke_color(Color::gray(0.5));
    canvas.draw_line(mm(4.0), mm(50.5), mm(24.0), mm(50.5));
    canvas.draw_text(
        mm(CARD_WIDTH_MM - 4.0),
        mm(48.0),
        mm(2.0),
        FontWeight::Bold,
        TextAlign::Right,
        "AUTHORIZED SIGN",
    );
    canvas.draw_line(
        mm(CARD_WIDTH_MM - 24.0),
        mm(50.5),
        mm(CARD_WIDTH_MM - 4.0),
        mm(50.5),
    );

    canvas.finish()
}

/// Back side: static header, terms of use, return address and the
/// generation-date footer.
pub fn render_back(today: NaiveDate, text: &CardText) -> crate::canvas::Document {
    let mut canvas = Canvas::new(card_size());
    draw_chrome(&mut canvas, text);

    canvas.set_fill_color(Color::BLACK);
    canvas.draw_text(
        mm(CARD_WIDTH_MM / 2.0),
        mm(16.0),
        mm(2.4),
        FontWeight::Bold,
        TextAlign::Center,
        "Terms and Conditions",
    );
    canvas.set_stroke_color(Color::gray(0.8));
    canvas.set_line_width(mm(HAIRLINE));
    canvas.draw_line(mm(10.0), mm(17.2), mm(CARD_WIDTH_MM - 10.0), mm(17.2));

    let mut y = 20.5;
    canvas.set_fill_color(Color::gray(0.15));
    for term in &text.terms {
        for line in wrap_text(term, 62) {
            canvas.draw_text(
                mm(4.0),
                mm(y),
                mm(1.9),
                FontWeight::Regular,
                TextAlign::Left,
                line,
            );
            y += 2.8;
        }
        y += 0.6;
    }
    for line in &text.return_address {
        canvas.draw_text(
            mm(4.0),
            mm(y),
            mm(1.9),
            FontWeight::Regular,
            TextAlign::Left,
            line,
        );
        y += 2.8;
    }

    canvas.set_stroke_color(Color::gray(0.5));
    canvas.set_dash(vec![mm(1.0), mm(0.8)], Mm::ZERO);
    canvas.draw_line(mm(2.0), mm(46.5), mm(CARD_WIDTH_MM - 2.0), mm(46.5));
    canvas.set_dash(Vec::new(), Mm::ZERO);

    canvas.set_fill_color(Color::gray(0.3));
    canvas.draw_text(
        mm(CARD_WIDTH_MM / 2.0),
        mm(49.5),
        mm(2.0),
        FontWeight::Regular,
        TextAlign::Center,
        &text.website,
    );
    canvas.draw_text(
        mm(CARD_WIDTH_MM / 2.0),
        mm(52.2),
        mm(2.0),
        FontWeight::Regular,
        TextAlign::Center,
        format!("Generated: {}", today.format("%d/%m/%Y")),
    );

    canvas.finish()
}

/// Greedy word wrap by character count. Card text is short and the
/// face is near-monospace at this size, so glyph-accurate wrapping
/// buys nothing here.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
