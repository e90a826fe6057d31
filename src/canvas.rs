use crate::types::Color;

/// Content-stream operators, with coordinates already in points (PDF space).
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op<'a> {
    LineCap(u8),
    LineWidth(f64),
    StrokeColor(&'a str),
    FillColor(&'a str),
    SelectFont {
        index: usize,
        size: f64,
    },
    WordSpacing(f64),
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        paint: &'static str,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    // Single positioned string; `text` is already encoded for the active font.
    Text {
        x: f64,
        y: f64,
        text: &'a [u8],
    },
    Image {
        width: f64,
        height: f64,
        x: f64,
        y: f64,
        index: usize,
    },
}

impl Op<'_> {
    pub(crate) fn render_into(&self, out: &mut Vec<u8>) {
        match self {
            Op::LineCap(cap) => out.extend_from_slice(format!("{cap} J").as_bytes()),
            Op::LineWidth(w) => out.extend_from_slice(format!("{} w", fmt2(*w)).as_bytes()),
            Op::StrokeColor(op) | Op::FillColor(op) => out.extend_from_slice(op.as_bytes()),
            Op::SelectFont { index, size } => {
                out.extend_from_slice(format!("BT /F{} {} Tf ET", index, fmt2(*size)).as_bytes())
            }
            Op::WordSpacing(ws) => out.extend_from_slice(format!("{} Tw", fmt3(*ws)).as_bytes()),
            Op::Rect {
                x,
                y,
                width,
                height,
                paint,
            } => out.extend_from_slice(
                format!(
                    "{} {} {} {} re {}",
                    fmt2(*x),
                    fmt2(*y),
                    fmt2(*width),
                    fmt2(*height),
                    paint
                )
                .as_bytes(),
            ),
            Op::Line { x1, y1, x2, y2 } => out.extend_from_slice(
                format!(
                    "{} {} m {} {} l S",
                    fmt2(*x1),
                    fmt2(*y1),
                    fmt2(*x2),
                    fmt2(*y2)
                )
                .as_bytes(),
            ),
            Op::Text { x, y, text } => {
                out.extend_from_slice(format!("BT {} {} Td (", fmt2(*x), fmt2(*y)).as_bytes());
                out.extend_from_slice(&escape_literal(text));
                out.extend_from_slice(b") Tj ET");
            }
            Op::Image {
                width,
                height,
                x,
                y,
                index,
            } => out.extend_from_slice(
                format!(
                    "q {} 0 0 {} {} {} cm /I{} Do Q",
                    fmt2(*width),
                    fmt2(*height),
                    fmt2(*x),
                    fmt2(*y),
                    index
                )
                .as_bytes(),
            ),
        }
    }

    pub(crate) fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.render_into(&mut out);
        out
    }
}

/// Colors and line width carried from page to page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GraphicState {
    pub(crate) draw_color: String,
    pub(crate) fill_color: String,
    pub(crate) text_color: String,
    // Set when the text color differs from the fill color.
    pub(crate) color_flag: bool,
    pub(crate) line_width: f64,
}

pub(crate) const DEFAULT_DRAW_COLOR: &str = "0 G";
pub(crate) const DEFAULT_FILL_COLOR: &str = "0 g";

impl GraphicState {
    pub(crate) fn new(line_width: f64) -> Self {
        Self {
            draw_color: DEFAULT_DRAW_COLOR.to_string(),
            fill_color: DEFAULT_FILL_COLOR.to_string(),
            text_color: DEFAULT_FILL_COLOR.to_string(),
            color_flag: false,
            line_width,
        }
    }

    pub(crate) fn set_fill(&mut self, color: Color) {
        self.fill_color = color.operator(false);
        self.color_flag = self.fill_color != self.text_color;
    }

    pub(crate) fn set_text(&mut self, color: Color) {
        self.text_color = color.operator(false);
        self.color_flag = self.fill_color != self.text_color;
    }
}

pub(crate) fn fmt2(value: f64) -> String {
    format!("{:.2}", value)
}

pub(crate) fn fmt3(value: f64) -> String {
    format!("{:.3}", value)
}

/// Escapes a byte string for a PDF literal `( ... )`.
pub(crate) fn escape_literal(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for &b in input {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'(' => out.extend_from_slice(b"\\("),
            b')' => out.extend_from_slice(b"\\)"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(op: Op<'_>) -> String {
        String::from_utf8(op.render()).unwrap()
    }

    #[test]
    fn operators_use_two_decimals() {
        assert_eq!(text(Op::LineWidth(0.567)), "0.57 w");
        assert_eq!(
            text(Op::Rect {
                x: 10.0,
                y: 20.5,
                width: 30.126,
                height: -5.0,
                paint: "f"
            }),
            "10.00 20.50 30.13 -5.00 re f"
        );
        assert_eq!(
            text(Op::Line {
                x1: 0.0,
                y1: 1.0,
                x2: 2.0,
                y2: 3.0
            }),
            "0.00 1.00 m 2.00 3.00 l S"
        );
        assert_eq!(text(Op::SelectFont { index: 2, size: 12.0 }), "BT /F2 12.00 Tf ET");
        assert_eq!(text(Op::WordSpacing(1.23456)), "1.235 Tw");
    }

    #[test]
    fn text_is_escaped() {
        let op = Op::Text {
            x: 1.0,
            y: 2.0,
            text: b"a(b)\\c\r",
        };
        assert_eq!(text(op), "BT 1.00 2.00 Td (a\\(b\\)\\\\c\\r) Tj ET");
    }

    #[test]
    fn color_flag_tracks_fill_and_text() {
        let mut state = GraphicState::new(0.567);
        assert!(!state.color_flag);
        state.set_text(Color::Rgb(255, 0, 0));
        assert!(state.color_flag);
        state.set_fill(Color::Rgb(255, 0, 0));
        assert!(!state.color_flag);
    }
}
