use crate::canvas::{DEFAULT_DRAW_COLOR, DEFAULT_FILL_COLOR, GraphicState, Op};
use crate::error::{Result, ScribeError};
use crate::font::{CORE_FAMILIES, FontRegistry, RegisteredFont, normalize_style};
use crate::images::{ImageInfo, ImageKind, content_key, decode_data_uri, resolve_size};
use crate::metrics::DocumentMetrics;
use crate::pdf::ObjectWriter;
use crate::types::{
    Color, LayoutMode, LinkId, LinkTarget, Orientation, PageFormat, PdfVersion, RectStyle, Size,
    Unit, ZoomMode,
};
use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Lifecycle of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    NoPage,
    PageOpen,
    PageEnded,
    Closed,
}

/// Link annotation rectangle in points, origin at the bottom left.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageLink {
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
    pub(crate) target: LinkTarget,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Page {
    pub(crate) content: Vec<u8>,
    // Points; only set when the page differs from the default size.
    pub(crate) size: Option<Size>,
    pub(crate) rotation: Option<i32>,
    pub(crate) links: Vec<PageLink>,
    pub(crate) object_number: Option<usize>,
}

/// Public view of a page, used by collaborators that reference pages
/// (outlines, named destinations).
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub number: usize,
    /// Page size in points when it differs from the document default.
    pub size: Option<Size>,
    pub rotation: Option<i32>,
    /// Assigned while the document is being closed.
    pub object_number: Option<usize>,
}

// `page == 0` means the destination has not been set yet.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LinkDest {
    pub(crate) page: usize,
    pub(crate) y: f64,
}

/// Callbacks into client code. Every method has a no-op default.
///
/// The hooks object is detached from the document while a callback runs, so
/// a callback may freely draw on the document it receives.
pub trait DocumentHooks: Send {
    /// Runs at the top of every new page.
    fn header(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// Runs before a page is ended.
    fn footer(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// Decides whether an automatic page break may happen.
    fn accept_page_break(&mut self, doc: &Document) -> bool {
        doc.auto_page_break()
    }

    /// Runs after the resource dictionary is written; may emit extra objects.
    fn put_resources(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }

    /// Runs inside the catalog dictionary; may emit extra entries.
    fn put_catalog(&mut self, _doc: &mut Document) -> Result<()> {
        Ok(())
    }
}

/// Where and how large to draw an image. `x`/`y` default to the cursor; an
/// unset `y` also advances the cursor and may trigger a page break.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImagePlacement {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: f64,
    pub height: f64,
    pub link: Option<LinkTarget>,
}

impl ImagePlacement {
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    pub fn flowing() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn link(mut self, target: impl Into<LinkTarget>) -> Self {
        self.link = Some(target.into());
        self
    }
}

/// A PDF document under construction.
pub struct Document {
    pub(crate) state: DocState,
    pub(crate) page: usize,
    pub(crate) pages: Vec<Page>,
    pub(crate) writer: ObjectWriter,
    pub(crate) compress: bool,
    pub(crate) k: f64,
    pub(crate) def_orientation: Orientation,
    pub(crate) cur_orientation: Orientation,
    pub(crate) def_page_size: Size,
    pub(crate) cur_page_size: Size,
    pub(crate) cur_rotation: i32,
    pub(crate) w_pt: f64,
    pub(crate) h_pt: f64,
    pub(crate) w: f64,
    pub(crate) h: f64,
    pub(crate) l_margin: f64,
    pub(crate) t_margin: f64,
    pub(crate) r_margin: f64,
    pub(crate) b_margin: f64,
    pub(crate) c_margin: f64,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) lasth: f64,
    pub(crate) graphics: GraphicState,
    pub(crate) fonts: FontRegistry,
    pub(crate) font_family: String,
    pub(crate) font_style: String,
    pub(crate) underline: bool,
    pub(crate) current_font: Option<Arc<RegisteredFont>>,
    pub(crate) font_size_pt: f64,
    pub(crate) font_size: f64,
    pub(crate) with_alpha: bool,
    pub(crate) ws: f64,
    pub(crate) images: IndexMap<String, ImageInfo>,
    pub(crate) links: Vec<LinkDest>,
    pub(crate) auto_page_break: bool,
    pub(crate) page_break_trigger: f64,
    pub(crate) in_header: bool,
    pub(crate) in_footer: bool,
    pub(crate) alias_nb_pages: Option<String>,
    pub(crate) zoom_mode: ZoomMode,
    pub(crate) layout_mode: LayoutMode,
    pub(crate) metadata: IndexMap<&'static str, String>,
    pub(crate) pdf_version: PdfVersion,
    pub(crate) creation_date: Option<DateTime<FixedOffset>>,
    pub(crate) hooks: Option<Box<dyn DocumentHooks>>,
    pub(crate) metrics: Option<DocumentMetrics>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("state", &self.state)
            .field("page", &self.page)
            .field("fonts", &self.fonts.len())
            .field("images", &self.images.len())
            .field("pdf_version", &self.pdf_version)
            .finish()
    }
}

impl Document {
    /// Short form of [`crate::DocumentBuilder`]: no font directory, default
    /// margins and display mode.
    pub fn new(orientation: Orientation, unit: Unit, format: PageFormat) -> Result<Self> {
        Self::with_font_path(orientation, unit, format, None)
    }

    pub(crate) fn with_font_path(
        orientation: Orientation,
        unit: Unit,
        format: PageFormat,
        font_path: Option<PathBuf>,
    ) -> Result<Self> {
        let k = unit.scale_factor();
        let size = checked_size(format, k)?;
        let (w, h) = match orientation {
            Orientation::Portrait => (size.width, size.height),
            Orientation::Landscape => (size.height, size.width),
        };
        let margin = 28.35 / k;
        let mut doc = Self {
            state: DocState::NoPage,
            page: 0,
            pages: Vec::new(),
            writer: ObjectWriter::new(),
            compress: true,
            k,
            def_orientation: orientation,
            cur_orientation: orientation,
            def_page_size: size,
            cur_page_size: size,
            cur_rotation: 0,
            w_pt: w * k,
            h_pt: h * k,
            w,
            h,
            l_margin: margin,
            t_margin: margin,
            r_margin: margin,
            b_margin: 2.0 * margin,
            c_margin: margin / 10.0,
            x: 0.0,
            y: 0.0,
            lasth: 0.0,
            graphics: GraphicState::new(0.567 / k),
            fonts: FontRegistry::new(font_path),
            font_family: String::new(),
            font_style: String::new(),
            underline: false,
            current_font: None,
            font_size_pt: 12.0,
            font_size: 12.0 / k,
            with_alpha: false,
            ws: 0.0,
            images: IndexMap::new(),
            links: Vec::new(),
            auto_page_break: true,
            page_break_trigger: 0.0,
            in_header: false,
            in_footer: false,
            alias_nb_pages: None,
            zoom_mode: ZoomMode::Default,
            layout_mode: LayoutMode::Default,
            metadata: IndexMap::new(),
            pdf_version: PdfVersion::V1_3,
            creation_date: None,
            hooks: None,
            metrics: None,
        };
        doc.set_auto_page_break(true, 2.0 * margin);
        Ok(doc)
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn DocumentHooks>) {
        self.hooks = Some(hooks);
    }

    pub fn state(&self) -> DocState {
        self.state
    }

    // ---- margins ----

    /// Sets left, top and right margins; the right margin defaults to the left one.
    pub fn set_margins(&mut self, left: f64, top: f64, right: Option<f64>) {
        self.l_margin = left;
        self.t_margin = top;
        self.r_margin = right.unwrap_or(left);
    }

    pub fn set_left_margin(&mut self, margin: f64) {
        self.l_margin = margin;
        if self.page > 0 && self.x < margin {
            self.x = margin;
        }
    }

    pub fn set_top_margin(&mut self, margin: f64) {
        self.t_margin = margin;
    }

    pub fn set_right_margin(&mut self, margin: f64) {
        self.r_margin = margin;
    }

    pub fn set_auto_page_break(&mut self, auto: bool, margin: f64) {
        self.auto_page_break = auto;
        self.b_margin = margin;
        self.page_break_trigger = self.h - margin;
    }

    pub fn auto_page_break(&self) -> bool {
        self.auto_page_break
    }

    pub fn left_margin(&self) -> f64 {
        self.l_margin
    }

    pub fn top_margin(&self) -> f64 {
        self.t_margin
    }

    pub fn right_margin(&self) -> f64 {
        self.r_margin
    }

    pub fn bottom_margin(&self) -> f64 {
        self.b_margin
    }

    pub fn cell_margin(&self) -> f64 {
        self.c_margin
    }

    pub fn set_cell_margin(&mut self, margin: f64) {
        self.c_margin = margin;
    }

    // ---- display and metadata ----

    pub fn set_display_mode(&mut self, zoom: ZoomMode, layout: LayoutMode) {
        self.zoom_mode = zoom;
        self.layout_mode = layout;
    }

    pub fn set_compression(&mut self, compress: bool) {
        self.compress = compress;
    }

    pub fn set_title(&mut self, title: &str) {
        self.metadata.insert("Title", title.to_string());
    }

    pub fn set_author(&mut self, author: &str) {
        self.metadata.insert("Author", author.to_string());
    }

    pub fn set_subject(&mut self, subject: &str) {
        self.metadata.insert("Subject", subject.to_string());
    }

    pub fn set_keywords(&mut self, keywords: &str) {
        self.metadata.insert("Keywords", keywords.to_string());
    }

    pub fn set_creator(&mut self, creator: &str) {
        self.metadata.insert("Creator", creator.to_string());
    }

    /// Overrides the CreationDate written to the Info dictionary.
    pub fn set_creation_date(&mut self, date: DateTime<FixedOffset>) {
        self.creation_date = Some(date);
    }

    /// Every occurrence of `alias` in page content is replaced by the page
    /// count when the document is closed.
    pub fn alias_nb_pages(&mut self, alias: &str) {
        self.alias_nb_pages = Some(alias.to_string());
    }

    pub fn pdf_version(&self) -> PdfVersion {
        self.pdf_version
    }

    // ---- lifecycle ----

    /// Starts a new page with the document's default orientation and size.
    pub fn add_page(&mut self) -> Result<()> {
        self.add_page_with(None, None, 0)
    }

    pub fn add_page_with(
        &mut self,
        orientation: Option<Orientation>,
        format: Option<PageFormat>,
        rotation: i32,
    ) -> Result<()> {
        let size = format.map(|f| checked_size(f, self.k)).transpose()?;
        self.start_page(orientation, size, rotation)
    }

    fn start_page(
        &mut self,
        orientation: Option<Orientation>,
        size: Option<Size>,
        rotation: i32,
    ) -> Result<()> {
        if self.state == DocState::Closed {
            return Err(ScribeError::state("the document is closed"));
        }
        if rotation % 90 != 0 {
            return Err(ScribeError::config(format!("incorrect rotation value: {rotation}")));
        }
        let family = self.font_family.clone();
        let style = self.styled();
        let font_size = self.font_size_pt;
        let saved = self.graphics.clone();
        if self.page > 0 {
            self.in_footer = true;
            let footer = self.run_hook(|hooks, doc| hooks.footer(doc));
            self.in_footer = false;
            footer?;
            self.end_page();
        }
        self.begin_page(orientation, size, rotation);

        self.emit(Op::LineCap(2))?;
        self.emit(Op::LineWidth(saved.line_width * self.k))?;
        if !family.is_empty() {
            self.set_font(&family, &style, font_size)?;
        }
        if saved.draw_color != DEFAULT_DRAW_COLOR {
            self.emit(Op::StrokeColor(&saved.draw_color))?;
        }
        if saved.fill_color != DEFAULT_FILL_COLOR {
            self.emit(Op::FillColor(&saved.fill_color))?;
        }

        self.in_header = true;
        let header = self.run_hook(|hooks, doc| hooks.header(doc));
        self.in_header = false;
        header?;

        if self.graphics.line_width != saved.line_width {
            self.graphics.line_width = saved.line_width;
            self.emit(Op::LineWidth(saved.line_width * self.k))?;
        }
        if !family.is_empty()
            && (family != self.font_family
                || style != self.styled()
                || font_size != self.font_size_pt)
        {
            self.set_font(&family, &style, font_size)?;
        }
        if self.graphics.draw_color != saved.draw_color {
            self.emit(Op::StrokeColor(&saved.draw_color))?;
            self.graphics.draw_color = saved.draw_color;
        }
        if self.graphics.fill_color != saved.fill_color {
            self.emit(Op::FillColor(&saved.fill_color))?;
            self.graphics.fill_color = saved.fill_color;
        }
        self.graphics.text_color = saved.text_color;
        self.graphics.color_flag = saved.color_flag;
        Ok(())
    }

    fn begin_page(&mut self, orientation: Option<Orientation>, size: Option<Size>, rotation: i32) {
        self.page += 1;
        self.pages.push(Page::default());
        self.state = DocState::PageOpen;
        self.x = self.l_margin;
        self.y = self.t_margin;
        self.font_family.clear();

        let orientation = orientation.unwrap_or(self.def_orientation);
        let size = size.unwrap_or(self.def_page_size);
        if orientation != self.cur_orientation || size != self.cur_page_size {
            let (w, h) = match orientation {
                Orientation::Portrait => (size.width, size.height),
                Orientation::Landscape => (size.height, size.width),
            };
            self.w = w;
            self.h = h;
            self.w_pt = w * self.k;
            self.h_pt = h * self.k;
            self.page_break_trigger = h - self.b_margin;
            self.cur_orientation = orientation;
            self.cur_page_size = size;
        }
        let page_size = (orientation != self.def_orientation || size != self.def_page_size)
            .then(|| Size::new(self.w_pt, self.h_pt));
        let page_rotation = (rotation != 0).then_some(rotation);
        self.cur_rotation = rotation;
        if let Some(page) = self.pages.last_mut() {
            page.size = page_size;
            page.rotation = page_rotation;
        }
        debug!("page {} opened ({:.2}x{:.2}pt)", self.page, self.w_pt, self.h_pt);
    }

    fn end_page(&mut self) {
        self.state = DocState::PageEnded;
    }

    /// Runs the footer, ends the last page and serializes the document.
    /// Does nothing once the document is closed.
    pub fn close(&mut self) -> Result<()> {
        if self.state == DocState::Closed {
            return Ok(());
        }
        if self.page == 0 {
            self.add_page()?;
        }
        self.in_footer = true;
        let footer = self.run_hook(|hooks, doc| hooks.footer(doc));
        self.in_footer = false;
        footer?;
        self.end_page();
        self.end_doc()
    }

    /// Build summary; available once the document is closed.
    pub fn metrics(&self) -> Option<&DocumentMetrics> {
        self.metrics.as_ref()
    }

    pub(crate) fn run_hook(
        &mut self,
        call: impl FnOnce(&mut dyn DocumentHooks, &mut Document) -> Result<()>,
    ) -> Result<()> {
        match self.hooks.take() {
            Some(mut hooks) => {
                let result = call(hooks.as_mut(), self);
                self.hooks = Some(hooks);
                result
            }
            None => Ok(()),
        }
    }

    fn accept_page_break(&mut self) -> bool {
        match self.hooks.take() {
            Some(mut hooks) => {
                let accept = hooks.accept_page_break(self);
                self.hooks = Some(hooks);
                accept
            }
            None => self.auto_page_break,
        }
    }

    /// True when content of height `h` at the cursor must go to a new page.
    pub(crate) fn should_break(&mut self, h: f64) -> bool {
        self.y + h > self.page_break_trigger
            && !self.in_header
            && !self.in_footer
            && self.accept_page_break()
    }

    /// Adds a page with the current orientation, size and rotation.
    pub(crate) fn break_page(&mut self) -> Result<()> {
        self.start_page(
            Some(self.cur_orientation),
            Some(self.cur_page_size),
            self.cur_rotation,
        )
    }

    // ---- content routing ----

    /// Appends one operator line to the open page, or to the file while the
    /// object writer runs.
    pub(crate) fn out(&mut self, bytes: &[u8]) -> Result<()> {
        match self.state {
            DocState::PageOpen => {
                let page = self
                    .pages
                    .last_mut()
                    .ok_or_else(|| ScribeError::state("no page has been added yet"))?;
                page.content.extend_from_slice(bytes);
                page.content.push(b'\n');
                Ok(())
            }
            DocState::PageEnded => {
                self.writer.put_bytes(bytes);
                Ok(())
            }
            DocState::NoPage => Err(ScribeError::state("no page has been added yet")),
            DocState::Closed => Err(ScribeError::state("the document is closed")),
        }
    }

    pub(crate) fn emit(&mut self, op: Op<'_>) -> Result<()> {
        self.out(&op.render())
    }

    // ---- geometry ----

    pub fn page_no(&self) -> usize {
        self.page
    }

    pub fn scale_factor(&self) -> f64 {
        self.k
    }

    /// Current page width in user units.
    pub fn page_width(&self) -> f64 {
        self.w
    }

    /// Current page height in user units.
    pub fn page_height(&self) -> f64 {
        self.h
    }

    pub fn page_record(&self, number: usize) -> Option<PageRecord> {
        let page = self.pages.get(number.checked_sub(1)?)?;
        Some(PageRecord {
            number,
            size: page.size,
            rotation: page.rotation,
            object_number: page.object_number,
        })
    }

    pub fn get_x(&self) -> f64 {
        self.x
    }

    /// Negative values are measured from the right edge.
    pub fn set_x(&mut self, x: f64) {
        self.x = if x >= 0.0 { x } else { self.w + x };
    }

    pub fn get_y(&self) -> f64 {
        self.y
    }

    /// Negative values are measured from the bottom edge. With `reset_x`
    /// the abscissa returns to the left margin.
    pub fn set_y(&mut self, y: f64, reset_x: bool) {
        self.y = if y >= 0.0 { y } else { self.h + y };
        if reset_x {
            self.x = self.l_margin;
        }
    }

    pub fn set_xy(&mut self, x: f64, y: f64) {
        self.set_x(x);
        self.set_y(y, false);
    }

    // ---- colors and drawing ----

    pub fn set_draw_color(&mut self, color: Color) -> Result<()> {
        self.graphics.draw_color = color.operator(true);
        if self.page > 0 {
            let op = self.graphics.draw_color.clone();
            self.emit(Op::StrokeColor(&op))?;
        }
        Ok(())
    }

    pub fn set_fill_color(&mut self, color: Color) -> Result<()> {
        self.graphics.set_fill(color);
        if self.page > 0 {
            let op = self.graphics.fill_color.clone();
            self.emit(Op::FillColor(&op))?;
        }
        Ok(())
    }

    pub fn set_text_color(&mut self, color: Color) {
        self.graphics.set_text(color);
    }

    pub fn set_line_width(&mut self, width: f64) -> Result<()> {
        self.graphics.line_width = width;
        if self.page > 0 {
            self.emit(Op::LineWidth(width * self.k))?;
        }
        Ok(())
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> Result<()> {
        let (k, h) = (self.k, self.h);
        self.emit(Op::Line {
            x1: x1 * k,
            y1: (h - y1) * k,
            x2: x2 * k,
            y2: (h - y2) * k,
        })
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: RectStyle) -> Result<()> {
        let k = self.k;
        self.emit(Op::Rect {
            x: x * k,
            y: (self.h - y) * k,
            width: w * k,
            height: -h * k,
            paint: style.operator(),
        })
    }

    /// Prints a string with its baseline starting at (`x`, `y`).
    pub fn text(&mut self, x: f64, y: f64, txt: &str) -> Result<()> {
        let font = self.require_font()?;
        let encoded = font.encode(txt);
        let mut s = Op::Text {
            x: x * self.k,
            y: (self.h - y) * self.k,
            text: &encoded,
        }
        .render();
        if self.underline && !encoded.is_empty() {
            s.push(b' ');
            s.extend_from_slice(&self.underline_op(&font, x, y, &encoded));
        }
        if self.graphics.color_flag {
            s = self.wrap_text_color(s);
        }
        self.out(&s)
    }

    pub(crate) fn wrap_text_color(&self, s: Vec<u8>) -> Vec<u8> {
        let mut wrapped = Vec::with_capacity(s.len() + self.graphics.text_color.len() + 4);
        wrapped.extend_from_slice(b"q ");
        wrapped.extend_from_slice(self.graphics.text_color.as_bytes());
        wrapped.push(b' ');
        wrapped.extend_from_slice(&s);
        wrapped.extend_from_slice(b" Q");
        wrapped
    }

    // ---- fonts ----

    /// Registers a font from a definition file (see [`FontRegistry::add_font`]).
    pub fn add_font(&mut self, family: &str, style: &str, file: Option<&str>) -> Result<()> {
        self.fonts.add_font(family, style, file).map(|_| ())
    }

    /// Registers a ready-made definition, with the bytes of its font program
    /// when it embeds one.
    pub fn add_font_definition(
        &mut self,
        family: &str,
        style: &str,
        definition: crate::font::FontDefinition,
        file_data: Option<Vec<u8>>,
    ) -> Result<()> {
        self.fonts
            .add_definition(family, style, definition, file_data)
            .map(|_| ())
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    /// Selects a font. An empty family keeps the current one, `U` in the
    /// style turns underlining on, and a zero size keeps the current size.
    pub fn set_font(&mut self, family: &str, style: &str, size: f64) -> Result<()> {
        let mut family = if family.is_empty() {
            self.font_family.clone()
        } else {
            family.to_lowercase()
        };
        let (mut style, underline) = normalize_style(style);
        self.underline = underline;
        let size = if size == 0.0 { self.font_size_pt } else { size };
        if self.font_family == family && self.font_style == style && self.font_size_pt == size {
            return Ok(());
        }

        let mut key = format!("{family}{style}");
        let font = match self.fonts.get(&key) {
            Some(font) => font,
            None => {
                if family == "arial" {
                    family = "helvetica".to_string();
                }
                if !CORE_FAMILIES.contains(&family.as_str()) {
                    return Err(ScribeError::resource(format!(
                        "undefined font: {family} {style}"
                    )));
                }
                if family == "symbol" || family == "zapfdingbats" {
                    style.clear();
                }
                key = format!("{family}{style}");
                match self.fonts.get(&key) {
                    Some(font) => font,
                    None => self.fonts.add_font(&family, &style, None)?,
                }
            }
        };

        self.font_family = family;
        self.font_style = style;
        self.font_size_pt = size;
        self.font_size = size / self.k;
        let index = font.index();
        self.current_font = Some(font);
        if self.page > 0 {
            self.emit(Op::SelectFont { index, size })?;
        }
        Ok(())
    }

    pub fn set_font_size(&mut self, size: f64) -> Result<()> {
        if self.font_size_pt == size {
            return Ok(());
        }
        self.font_size_pt = size;
        self.font_size = size / self.k;
        if self.page > 0 {
            if let Some(index) = self.current_font.as_ref().map(|f| f.index()) {
                self.emit(Op::SelectFont { index, size })?;
            }
        }
        Ok(())
    }

    /// Current font size in user units.
    pub fn font_size(&self) -> f64 {
        self.font_size
    }

    pub fn font_size_pt(&self) -> f64 {
        self.font_size_pt
    }

    pub(crate) fn require_font(&self) -> Result<Arc<RegisteredFont>> {
        self.current_font
            .clone()
            .ok_or_else(|| ScribeError::state("no font has been set"))
    }

    fn styled(&self) -> String {
        if self.underline {
            format!("{}U", self.font_style)
        } else {
            self.font_style.clone()
        }
    }

    // ---- links ----

    /// Creates an internal link; its destination is set with [`Self::set_link`].
    pub fn add_link(&mut self) -> LinkId {
        self.links.push(LinkDest::default());
        LinkId(self.links.len())
    }

    /// Points `link` at ordinate `y` of `page`.
    ///
    /// `y: None` means the current y, not the top of the page; pass
    /// `Some(0.0)` for the top. `page: None` means the current page.
    pub fn set_link(&mut self, link: LinkId, y: Option<f64>, page: Option<usize>) -> Result<()> {
        let y = y.unwrap_or(self.y);
        let page = page.unwrap_or(self.page);
        let dest = link
            .0
            .checked_sub(1)
            .and_then(|i| self.links.get_mut(i))
            .ok_or_else(|| ScribeError::config(format!("unknown link: {}", link.0)))?;
        dest.page = page;
        dest.y = y;
        Ok(())
    }

    /// Puts a clickable area on the current page.
    pub fn link(&mut self, x: f64, y: f64, w: f64, h: f64, target: impl Into<LinkTarget>) -> Result<()> {
        if self.state != DocState::PageOpen {
            return Err(ScribeError::state("no page is open"));
        }
        let (k, h_pt) = (self.k, self.h_pt);
        let target = target.into();
        if let Some(page) = self.pages.last_mut() {
            page.links.push(PageLink {
                x: x * k,
                y: h_pt - y * k,
                width: w * k,
                height: h * k,
                target,
            });
        }
        Ok(())
    }

    // ---- images ----

    /// Draws an image from a file path or a `data:` URI. The type comes from
    /// `image_type`, the extension or the URI's MIME type.
    pub fn image(
        &mut self,
        file: &str,
        image_type: Option<&str>,
        placement: &ImagePlacement,
    ) -> Result<()> {
        let index = self.register_image(file.to_string(), || {
            if file.starts_with("data:") {
                let (kind, data) = decode_data_uri(file)?;
                return kind.parse(&data, "data URI");
            }
            let kind = ImageKind::detect(file, image_type)?;
            let data = std::fs::read(file).map_err(|err| {
                ScribeError::resource(format!("can't open image file {file}: {err}"))
            })?;
            kind.parse(&data, file)
        })?;
        self.place_image(index, placement)
    }

    /// Draws an image held in memory. Identical bytes are embedded once.
    pub fn image_data(
        &mut self,
        data: &[u8],
        image_type: &str,
        placement: &ImagePlacement,
    ) -> Result<()> {
        let key = content_key(data);
        let index = self.register_image(key.clone(), || {
            ImageKind::detect(&key, Some(image_type))?.parse(data, &key)
        })?;
        self.place_image(index, placement)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    fn register_image(
        &mut self,
        key: String,
        load: impl FnOnce() -> Result<ImageInfo>,
    ) -> Result<usize> {
        if let Some(index) = self.images.get_index_of(&key) {
            return Ok(index);
        }
        let mut info = load()?;
        info.index = self.images.len() + 1;
        if info.soft_mask.is_some() {
            self.with_alpha = true;
            if self.pdf_version < PdfVersion::V1_4 {
                self.pdf_version = PdfVersion::V1_4;
            }
        }
        debug!(
            "image /I{} registered: {}x{} {}",
            info.index, info.width, info.height, info.color_space
        );
        let (index, _) = self.images.insert_full(key, info);
        Ok(index)
    }

    fn place_image(&mut self, slot: usize, placement: &ImagePlacement) -> Result<()> {
        let (_, info) = self
            .images
            .get_index(slot)
            .ok_or_else(|| ScribeError::resource("image is not registered"))?;
        let (w, h) = resolve_size(info, placement.width, placement.height, self.k);
        let index = info.index;

        let y = match placement.y {
            Some(y) => y,
            None => {
                if self.should_break(h) {
                    let x = self.x;
                    self.break_page()?;
                    self.x = x;
                }
                let y = self.y;
                self.y += h;
                y
            }
        };
        let x = placement.x.unwrap_or(self.x);
        let k = self.k;
        self.emit(Op::Image {
            width: w * k,
            height: h * k,
            x: x * k,
            y: (self.h - (y + h)) * k,
            index,
        })?;
        if let Some(target) = placement.link.clone() {
            self.link(x, y, w, h, target)?;
        }
        Ok(())
    }
}

fn checked_size(format: PageFormat, k: f64) -> Result<Size> {
    let size = format.user_size(k);
    if !(size.width > 0.0 && size.height > 0.0) {
        return Err(ScribeError::config(format!(
            "page size must be positive: {}x{}",
            size.width, size.height
        )));
    }
    Ok(size)
}
