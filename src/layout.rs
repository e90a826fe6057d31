use crate::canvas::Op;
use crate::document::Document;
use crate::error::Result;
use crate::font::RegisteredFont;
use crate::types::{Align, Border, LineBreak, LinkTarget};

/// Appearance and cursor movement of a single cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellOptions {
    pub border: Border,
    pub ln: LineBreak,
    pub align: Align,
    pub fill: bool,
    pub link: Option<LinkTarget>,
}

impl CellOptions {
    pub fn border(mut self, border: Border) -> Self {
        self.border = border;
        self
    }

    pub fn ln(mut self, ln: LineBreak) -> Self {
        self.ln = ln;
        self
    }

    pub fn align(mut self, align: Align) -> Self {
        self.align = align;
        self
    }

    pub fn fill(mut self, fill: bool) -> Self {
        self.fill = fill;
        self
    }

    pub fn link(mut self, target: impl Into<LinkTarget>) -> Self {
        self.link = Some(target.into());
        self
    }
}

fn sides(border: Border) -> Border {
    match border {
        Border::Frame => Border::Sides {
            left: true,
            top: true,
            right: true,
            bottom: true,
        },
        other => other,
    }
}

fn has_bottom(border: Border) -> bool {
    matches!(sides(border), Border::Sides { bottom: true, .. })
}

impl Document {
    /// Width of `s` in user units with the current font.
    pub fn get_string_width(&self, s: &str) -> Result<f64> {
        let font = self.require_font()?;
        Ok(self.encoded_width(&font, &font.encode(s)))
    }

    fn encoded_width(&self, font: &RegisteredFont, encoded: &[u8]) -> f64 {
        font.text_width(encoded) as f64 * self.font_size / 1000.0
    }

    /// Prints a rectangular cell with optional border, background, text and
    /// link. `w == 0` extends the cell to the right margin.
    pub fn cell(&mut self, w: f64, h: f64, txt: &str, options: &CellOptions) -> Result<()> {
        let encoded = match &self.current_font {
            Some(font) => font.encode(txt),
            None => txt.bytes().collect(),
        };
        self.cell_bytes(w, h, &encoded, options)
    }

    pub(crate) fn cell_bytes(
        &mut self,
        w: f64,
        h: f64,
        txt: &[u8],
        options: &CellOptions,
    ) -> Result<()> {
        let k = self.k;
        if self.should_break(h) {
            let x = self.x;
            let ws = self.ws;
            if ws > 0.0 {
                self.ws = 0.0;
                self.out(b"0 Tw")?;
            }
            self.break_page()?;
            self.x = x;
            if ws > 0.0 {
                self.ws = ws;
                self.emit(Op::WordSpacing(ws * k))?;
            }
        }
        let w = if w == 0.0 { self.w - self.r_margin - self.x } else { w };
        let (x, y) = (self.x, self.y);
        let top = (self.h - y) * k;
        let bottom = (self.h - (y + h)) * k;

        let mut ops: Vec<Vec<u8>> = Vec::new();
        let frame = options.border == Border::Frame;
        if options.fill || frame {
            let paint = match (options.fill, frame) {
                (true, true) => "B",
                (true, false) => "f",
                _ => "S",
            };
            ops.push(
                Op::Rect {
                    x: x * k,
                    y: top,
                    width: w * k,
                    height: -h * k,
                    paint,
                }
                .render(),
            );
        }
        if let Border::Sides {
            left,
            top: upper,
            right,
            bottom: lower,
        } = options.border
        {
            let (x1, x2) = (x * k, (x + w) * k);
            let edges = [
                (left, x1, top, x1, bottom),
                (upper, x1, top, x2, top),
                (right, x2, top, x2, bottom),
                (lower, x1, bottom, x2, bottom),
            ];
            for (on, x1, y1, x2, y2) in edges {
                if on {
                    ops.push(Op::Line { x1, y1, x2, y2 }.render());
                }
            }
        }
        if !txt.is_empty() {
            let font = self.require_font()?;
            let width = self.encoded_width(&font, txt);
            let dx = match options.align {
                Align::Right => w - self.c_margin - width,
                Align::Center => (w - width) / 2.0,
                Align::Left | Align::Justify => self.c_margin,
            };
            let baseline = y + 0.5 * h + 0.3 * self.font_size;
            let mut s = Op::Text {
                x: (x + dx) * k,
                y: (self.h - baseline) * k,
                text: txt,
            }
            .render();
            if self.underline {
                s.push(b' ');
                s.extend_from_slice(&self.underline_op(&font, x + dx, baseline, txt));
            }
            if self.graphics.color_flag {
                s = self.wrap_text_color(s);
            }
            ops.push(s);
            if let Some(link) = options.link.clone() {
                let font_size = self.font_size;
                self.link(x + dx, y + 0.5 * h - 0.5 * font_size, width, font_size, link)?;
            }
        }
        if !ops.is_empty() {
            self.out(&ops.join(&b' '))?;
        }
        self.lasth = h;
        match options.ln {
            LineBreak::Right => self.x += w,
            LineBreak::NextLine => {
                self.y += h;
                self.x = self.l_margin;
            }
            LineBreak::Below => self.y += h,
        }
        Ok(())
    }

    /// Prints text with automatic line breaks at the cell width (the right
    /// margin when `w == 0`). Each line is a cell; the cursor ends below the
    /// block at the left margin.
    pub fn multi_cell(
        &mut self,
        w: f64,
        h: f64,
        txt: &str,
        border: Border,
        align: Align,
        fill: bool,
    ) -> Result<()> {
        let font = self.require_font()?;
        let w = if w == 0.0 { self.w - self.r_margin - self.x } else { w };
        let wmax = (w - 2.0 * self.c_margin) * 1000.0 / self.font_size;
        let s: Vec<u8> = font.encode(txt).into_iter().filter(|&c| c != b'\r').collect();
        let nb = if s.last() == Some(&b'\n') { s.len() - 1 } else { s.len() };

        let all = sides(border);
        let first = all.without_bottom();
        let middle = all.without_top().without_bottom();
        let mut first_line = true;
        let line = |doc: &mut Document, text: &[u8], first_line: bool| {
            let border = if first_line { first } else { middle };
            let options = CellOptions::default()
                .border(border)
                .ln(LineBreak::Below)
                .align(align)
                .fill(fill);
            doc.cell_bytes(w, h, text, &options)
        };

        let mut sep: Option<usize> = None;
        let (mut i, mut j) = (0usize, 0usize);
        let mut l = 0.0f64;
        let mut ls = 0.0f64;
        let mut ns = 0usize;
        while i < nb {
            let c = s[i];
            if c == b'\n' {
                self.reset_word_spacing()?;
                line(self, &s[j..i], first_line)?;
                i += 1;
                sep = None;
                j = i;
                l = 0.0;
                ns = 0;
                first_line = false;
                continue;
            }
            if c == b' ' {
                sep = Some(i);
                ls = l;
                ns += 1;
            }
            l += font.width(c) as f64;
            if l > wmax {
                match sep {
                    None => {
                        if i == j {
                            i += 1;
                        }
                        self.reset_word_spacing()?;
                        line(self, &s[j..i], first_line)?;
                    }
                    Some(space) => {
                        if align == Align::Justify {
                            self.ws = if ns > 1 {
                                (wmax - ls) / 1000.0 * self.font_size / (ns - 1) as f64
                            } else {
                                0.0
                            };
                            self.emit(Op::WordSpacing(self.ws * self.k))?;
                        }
                        line(self, &s[j..space], first_line)?;
                        i = space + 1;
                    }
                }
                sep = None;
                j = i;
                l = 0.0;
                ns = 0;
                first_line = false;
            } else {
                i += 1;
            }
        }
        self.reset_word_spacing()?;
        let last = if has_bottom(border) {
            if first_line { all } else { all.without_top() }
        } else if first_line {
            first
        } else {
            middle
        };
        let options = CellOptions::default()
            .border(last)
            .ln(LineBreak::Below)
            .align(align)
            .fill(fill);
        self.cell_bytes(w, h, &s[j..i.min(nb)], &options)?;
        self.x = self.l_margin;
        Ok(())
    }

    fn reset_word_spacing(&mut self) -> Result<()> {
        if self.ws > 0.0 {
            self.ws = 0.0;
            self.out(b"0 Tw")?;
        }
        Ok(())
    }

    /// Prints flowing text from the cursor. Lines wrap at the right margin
    /// and continue at the left margin; the cursor ends after the last
    /// fragment.
    pub fn write(&mut self, h: f64, txt: &str, link: Option<LinkTarget>) -> Result<()> {
        let font = self.require_font()?;
        let mut w = self.w - self.r_margin - self.x;
        let mut wmax = (w - 2.0 * self.c_margin) * 1000.0 / self.font_size;
        let s: Vec<u8> = font.encode(txt).into_iter().filter(|&c| c != b'\r').collect();
        let nb = s.len();
        let options = CellOptions {
            ln: LineBreak::Below,
            link,
            ..CellOptions::default()
        };

        let mut sep: Option<usize> = None;
        let (mut i, mut j) = (0usize, 0usize);
        let mut l = 0.0f64;
        let mut first_line = true;
        while i < nb {
            let c = s[i];
            if c == b'\n' {
                self.cell_bytes(w, h, &s[j..i], &options)?;
                i += 1;
                sep = None;
                j = i;
                l = 0.0;
                if first_line {
                    self.x = self.l_margin;
                    w = self.w - self.r_margin - self.x;
                    wmax = (w - 2.0 * self.c_margin) * 1000.0 / self.font_size;
                    first_line = false;
                }
                continue;
            }
            if c == b' ' {
                sep = Some(i);
            }
            l += font.width(c) as f64;
            if l > wmax {
                match sep {
                    None if self.x > self.l_margin => {
                        // The word does not fit in what is left of the line:
                        // start it again at the left margin.
                        self.x = self.l_margin;
                        self.y += h;
                        w = self.w - self.r_margin - self.x;
                        wmax = (w - 2.0 * self.c_margin) * 1000.0 / self.font_size;
                        i = j;
                        l = 0.0;
                        first_line = false;
                        continue;
                    }
                    None => {
                        if i == j {
                            i += 1;
                        }
                        self.cell_bytes(w, h, &s[j..i], &options)?;
                    }
                    Some(space) => {
                        self.cell_bytes(w, h, &s[j..space], &options)?;
                        i = space + 1;
                    }
                }
                sep = None;
                j = i;
                l = 0.0;
                if first_line {
                    self.x = self.l_margin;
                    w = self.w - self.r_margin - self.x;
                    wmax = (w - 2.0 * self.c_margin) * 1000.0 / self.font_size;
                    first_line = false;
                }
            } else {
                i += 1;
            }
        }
        if i != j {
            let options = CellOptions {
                ln: LineBreak::Right,
                ..options
            };
            self.cell_bytes(l / 1000.0 * self.font_size, h, &s[j..], &options)?;
        }
        Ok(())
    }

    /// Line feed: back to the left margin and down by `h`, or by the height
    /// of the last cell.
    pub fn ln(&mut self, h: Option<f64>) {
        self.x = self.l_margin;
        self.y += h.unwrap_or(self.lasth);
    }

    pub(crate) fn underline_op(&self, font: &RegisteredFont, x: f64, y: f64, txt: &[u8]) -> Vec<u8> {
        let def = font.definition();
        let spaces = txt.iter().filter(|&&c| c == b' ').count() as f64;
        let w = self.encoded_width(font, txt) + self.ws * spaces;
        let up = def.underline_position as f64;
        let ut = def.underline_thickness as f64;
        Op::Rect {
            x: x * self.k,
            y: (self.h - (y - up / 1000.0 * self.font_size)) * self.k,
            width: w * self.k,
            height: -ut / 1000.0 * self.font_size_pt,
            paint: "f",
        }
        .render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Orientation, PageFormat, Unit};

    fn doc() -> Document {
        let mut doc = Document::new(Orientation::Portrait, Unit::Millimeter, PageFormat::A4).unwrap();
        doc.add_page().unwrap();
        doc.set_font("Helvetica", "", 12.0).unwrap();
        doc
    }

    fn content(doc: &Document) -> String {
        String::from_utf8_lossy(&doc.pages[doc.page - 1].content).into_owned()
    }

    fn text_lines(doc: &Document) -> Vec<String> {
        content(doc)
            .lines()
            .filter(|l| l.contains(" Tj "))
            .map(|l| {
                let start = l.find('(').unwrap() + 1;
                let end = l.rfind(") Tj").unwrap();
                l[start..end].to_string()
            })
            .collect()
    }

    #[test]
    fn string_width_uses_core_metrics() {
        let doc = doc();
        // Helvetica 'H' is 722 units wide.
        let expected = 722.0 * doc.font_size() / 1000.0;
        assert!((doc.get_string_width("H").unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn hello_cell_text_and_cursor() {
        let mut doc = doc();
        doc.cell(40.0, 10.0, "Hello", &CellOptions::default()).unwrap();
        assert!(content(&doc).contains("(Hello) Tj ET"));
        assert!((doc.get_x() - (doc.left_margin() + 40.0)).abs() < 1e-9);
        doc.ln(None);
        assert_eq!(doc.get_x(), doc.left_margin());
        assert!((doc.get_y() - (doc.top_margin() + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn framed_filled_cell_uses_b_operator() {
        let mut doc = doc();
        let options = CellOptions::default().border(Border::Frame).fill(true);
        doc.cell(20.0, 5.0, "", &options).unwrap();
        assert!(content(&doc).trim_end().ends_with("re B"));
    }

    #[test]
    fn side_borders_draw_lines() {
        let mut doc = doc();
        let options = CellOptions::default().border(Border::sides("LB"));
        doc.cell(20.0, 5.0, "", &options).unwrap();
        assert_eq!(content(&doc).matches(" l S").count(), 2);
    }

    #[test]
    fn right_aligned_text_ends_at_cell_margin() {
        let mut doc = Document::new(Orientation::Portrait, Unit::Point, PageFormat::A4).unwrap();
        doc.add_page().unwrap();
        doc.set_font("Courier", "", 10.0).unwrap();
        doc.set_cell_margin(2.0);
        doc.set_x(100.0);
        let options = CellOptions::default().align(Align::Right);
        doc.cell(100.0, 20.0, "abcd", &options).unwrap();
        // Courier glyphs are 600 units: 4 * 6pt = 24pt; 100 + 100 - 2 - 24 = 174
        assert!(content(&doc).contains("BT 174.00 "));
    }

    #[test]
    fn automatic_page_break_in_cells() {
        let mut doc = doc();
        for _ in 0..40 {
            let options = CellOptions::default().ln(LineBreak::NextLine);
            doc.cell(0.0, 10.0, "line", &options).unwrap();
        }
        assert!(doc.page_no() >= 2);
    }

    #[test]
    fn disabled_auto_break_stays_on_one_page() {
        let mut doc = doc();
        doc.set_auto_page_break(false, 0.0);
        for _ in 0..40 {
            let options = CellOptions::default().ln(LineBreak::NextLine);
            doc.cell(0.0, 10.0, "line", &options).unwrap();
        }
        assert_eq!(doc.page_no(), 1);
    }

    #[test]
    fn multi_cell_lines_fit_the_width() {
        let mut doc = doc();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(12);
        doc.multi_cell(60.0, 5.0, &text, Border::None, Align::Left, false)
            .unwrap();
        let lines = text_lines(&doc);
        assert!(lines.len() > 3);
        let wmax = 60.0 - 2.0 * doc.cell_margin();
        for line in &lines {
            assert!(doc.get_string_width(line).unwrap() <= wmax + 1e-9, "{line}");
        }
        assert_eq!(doc.get_x(), doc.left_margin());
    }

    #[test]
    fn multi_cell_honours_explicit_breaks() {
        let mut doc = doc();
        doc.multi_cell(0.0, 5.0, "one\r\ntwo\nthree\n", Border::None, Align::Left, false)
            .unwrap();
        assert_eq!(text_lines(&doc), vec!["one", "two", "three"]);
    }

    #[test]
    fn multi_cell_forces_break_inside_long_words() {
        let mut doc = doc();
        let word = "x".repeat(200);
        doc.multi_cell(30.0, 5.0, &word, Border::None, Align::Left, false)
            .unwrap();
        let lines = text_lines(&doc);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
    }

    #[test]
    fn justified_spacing_fills_the_line() {
        let mut doc = doc();
        let text = "aa bb cc dd ee ff gg hh ii jj kk ll mm nn oo pp qq rr ss tt uu vv ww";
        doc.multi_cell(50.0, 5.0, text, Border::None, Align::Justify, false)
            .unwrap();
        let page = content(&doc);
        let tw: f64 = page
            .lines()
            .find(|l| l.ends_with(" Tw") && *l != "0 Tw")
            .map(|l| l.trim_end_matches(" Tw").parse().unwrap())
            .unwrap();
        let first = &text_lines(&doc)[0];
        let spaces = first.matches(' ').count() as f64;
        let width = doc.get_string_width(first).unwrap();
        let wmax = 50.0 - 2.0 * doc.cell_margin();
        let filled = width + spaces * tw / doc.scale_factor();
        assert!((filled - wmax).abs() < 0.01, "{filled} vs {wmax}");
        assert!(page.contains("0 Tw"));
    }

    #[test]
    fn multi_cell_frame_splits_borders() {
        let mut doc = doc();
        let text = "word ".repeat(40);
        doc.multi_cell(40.0, 5.0, text.trim_end(), Border::Frame, Align::Left, false)
            .unwrap();
        let page = content(&doc);
        let lines = text_lines(&doc).len();
        // Left and right edges on every line, plus a top and a bottom edge.
        assert_eq!(page.matches(" l S").count(), 2 * lines + 2);
    }

    #[test]
    fn write_flows_and_wraps_to_left_margin() {
        let mut doc = doc();
        doc.set_x(150.0);
        let text = "flowing words ".repeat(30);
        doc.write(5.0, &text, None).unwrap();
        let lines = text_lines(&doc);
        assert!(lines.len() > 2);
        assert!(doc.get_y() > doc.top_margin());
        assert!(doc.get_x() > doc.left_margin());
        let right = doc.page_width() - doc.right_margin();
        assert!(doc.get_x() <= right + 1e-9);
    }

    #[test]
    fn underline_adds_rectangle() {
        let mut doc = doc();
        doc.set_font("", "U", 0.0).unwrap();
        doc.cell(0.0, 10.0, "under", &CellOptions::default()).unwrap();
        let page = content(&doc);
        let line = page.lines().find(|l| l.contains("(under)")).unwrap();
        assert!(line.ends_with("re f"));
    }

    #[test]
    fn cell_link_registers_annotation() {
        let mut doc = doc();
        let options = CellOptions::default().link("https://example.com");
        doc.cell(30.0, 10.0, "site", &options).unwrap();
        assert_eq!(doc.pages[0].links.len(), 1);
    }
}
