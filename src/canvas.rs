use crate::types::{Color, Mm, Rect, Size};

/// Horizontal anchoring for drawn text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontWeight {
    Regular,
    Bold,
}

/// Retained drawing commands, replayed by the rasterization adapter.
/// Coordinates are millimetres with the origin at the top-left of the
/// document, matching how the card templates are specified.
#[derive(Debug, Clone)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Mm),
    SetDash {
        pattern: Vec<Mm>,
        phase: Mm,
    },
    // Circular clip applied to subsequent drawing until RestoreState.
    ClipCircle {
        cx: Mm,
        cy: Mm,
        radius: Mm,
    },
    FillRect(Rect),
    StrokeRect(Rect),
    DrawLine {
        x1: Mm,
        y1: Mm,
        x2: Mm,
        y2: Mm,
    },
    FillCircle {
        cx: Mm,
        cy: Mm,
        radius: Mm,
    },
    StrokeCircle {
        cx: Mm,
        cy: Mm,
        radius: Mm,
    },
    DrawText {
        x: Mm,
        y: Mm,
        size: Mm,
        weight: FontWeight,
        align: TextAlign,
        text: String,
    },
    // Bitmap resource stretched into the rect. The resource is resolved
    // by the render target's settle step; an unresolved id degrades to
    // the slot background.
    DrawImage {
        rect: Rect,
        resource_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

/// A finished card side (or any fixed-size visual document) ready to be
/// mounted on a render target.
#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

impl Document {
    /// Resource ids referenced by any `DrawImage` command, in first-use
    /// order without duplicates. The settle step resolves exactly these.
    pub fn image_resource_ids(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for page in &self.pages {
            for command in &page.commands {
                if let Command::DrawImage { resource_id, .. } = command {
                    if !seen.iter().any(|known: &String| known == resource_id) {
                        seen.push(resource_id.clone());
                    }
                }
            }
        }
        seen
    }
}

#[derive(Debug, Clone)]
struct DrawState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Mm,
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<DrawState>,
    current_state: DrawState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::new(),
            state_stack: Vec::new(),
            current_state: DrawState {
                fill_color: Color::BLACK,
                stroke_color: Color::BLACK,
                line_width: Mm::from_f32(0.2),
            },
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Mm) {
        let width = if width < Mm::ZERO { Mm::ZERO } else { width };
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_dash(&mut self, pattern: Vec<Mm>, phase: Mm) {
        self.current
            .commands
            .push(Command::SetDash { pattern, phase });
    }

    pub fn clip_circle(&mut self, cx: Mm, cy: Mm, radius: Mm) {
        self.current
            .commands
            .push(Command::ClipCircle { cx, cy, radius });
    }

    pub fn fill_rect(&mut self, rect: Rect) {
        self.current.commands.push(Command::FillRect(rect));
    }

    pub fn stroke_rect(&mut self, rect: Rect) {
        self.current.commands.push(Command::StrokeRect(rect));
    }

    pub fn draw_line(&mut self, x1: Mm, y1: Mm, x2: Mm, y2: Mm) {
        self.current.commands.push(Command::DrawLine { x1, y1, x2, y2 });
    }

    pub fn fill_circle(&mut self, cx: Mm, cy: Mm, radius: Mm) {
        self.current
            .commands
            .push(Command::FillCircle { cx, cy, radius });
    }

    pub fn stroke_circle(&mut self, cx: Mm, cy: Mm, radius: Mm) {
        self.current
            .commands
            .push(Command::StrokeCircle { cx, cy, radius });
    }

    pub fn draw_text(
        &mut self,
        x: Mm,
        y: Mm,
        size: Mm,
        weight: FontWeight,
        align: TextAlign,
        text: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawText {
            x,
            y,
            size,
            weight,
            align,
            text: text.into(),
        });
    }

    pub fn draw_image(&mut self, rect: Rect, resource_id: impl Into<String>) {
        self.current.commands.push(Command::DrawImage {
            rect,
            resource_id: resource_id.into(),
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::replace(&mut self.current, Page::new());
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = DrawState {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Mm::from_f32(0.2),
        };
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}
