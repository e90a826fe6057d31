use crate::canvas::{escape_literal, fmt2};
use crate::document::{DocState, Document};
use crate::error::{Result, ScribeError};
use crate::font::{FontType, RegisteredFont, to_unicode_cmap};
use crate::images::{ColorSpace, ImageFilter, ImageInfo, zlib};
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::types::{LayoutMode, LinkTarget, Orientation, ZoomMode};
use chrono::Local;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

const PRODUCER: &str = concat!("pdfscribe ", env!("CARGO_PKG_VERSION"));

/// Output buffer plus the object-number to byte-offset table.
///
/// Objects 1 (page tree root) and 2 (resource dictionary) are reserved, so
/// numbering of other objects starts at 3.
#[derive(Debug)]
pub(crate) struct ObjectWriter {
    buffer: Vec<u8>,
    offsets: Vec<Option<usize>>,
    n: usize,
}

impl ObjectWriter {
    pub(crate) fn new() -> Self {
        Self {
            buffer: Vec::new(),
            offsets: vec![None; 3],
            n: 2,
        }
    }

    pub(crate) fn put(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        self.buffer.push(b'\n');
    }

    pub(crate) fn offset(&self) -> usize {
        self.buffer.len()
    }

    pub(crate) fn count(&self) -> usize {
        self.n
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Starts object `number`, or the next free number, and returns it.
    pub(crate) fn new_object(&mut self, number: Option<usize>) -> usize {
        let number = number.unwrap_or_else(|| {
            self.n += 1;
            self.n
        });
        if self.offsets.len() <= number {
            self.offsets.resize(number + 1, None);
        }
        self.offsets[number] = Some(self.buffer.len());
        self.put(&format!("{number} 0 obj"));
        number
    }

    pub(crate) fn put_stream(&mut self, data: &[u8]) {
        self.put("stream");
        self.put_bytes(data);
        self.put("endstream");
    }

    /// Writes `data` as a complete stream object, zlib-compressed when asked.
    pub(crate) fn put_stream_object(&mut self, data: &[u8], compress: bool) -> Result<usize> {
        let (entries, body) = if compress {
            let packed = zlib(data)?;
            (format!("/Filter /FlateDecode /Length {}", packed.len()), packed)
        } else {
            (format!("/Length {}", data.len()), data.to_vec())
        };
        let number = self.new_object(None);
        self.put(&format!("<<{entries}>>"));
        self.put_stream(&body);
        self.put("endobj");
        Ok(number)
    }

    // The file ends right after the marker, without a newline.
    fn finish(&mut self) {
        self.buffer.extend_from_slice(b"%%EOF");
    }

    fn put_xref(&mut self) -> Result<usize> {
        let start = self.offset();
        self.put("xref");
        self.put(&format!("0 {}", self.n + 1));
        self.put("0000000000 65535 f ");
        for number in 1..=self.n {
            let offset = self
                .offsets
                .get(number)
                .copied()
                .flatten()
                .ok_or_else(|| ScribeError::state(format!("object {number} was never written")))?;
            self.put(&format!("{offset:010} 00000 n "));
        }
        Ok(start)
    }
}

/// Literal string for text outside content streams: ASCII as-is, anything
/// else as UTF-16BE with a byte order mark.
pub(crate) fn text_string(s: &str) -> Vec<u8> {
    let raw: Vec<u8> = if s.is_ascii() {
        s.as_bytes().to_vec()
    } else {
        let mut utf16 = vec![0xFE, 0xFF];
        for unit in s.encode_utf16() {
            utf16.extend_from_slice(&unit.to_be_bytes());
        }
        utf16
    };
    let mut out = Vec::with_capacity(raw.len() + 2);
    out.push(b'(');
    out.extend_from_slice(&escape_literal(&raw));
    out.push(b')');
    out
}

fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            out.extend_from_slice(replacement);
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

// Image XObject fields, borrowed from an `ImageInfo` or describing its soft mask.
struct XObject<'a> {
    width: u32,
    height: u32,
    color_space: ColorSpace,
    bits_per_component: u8,
    filter: ImageFilter,
    decode_parms: Option<String>,
    palette: &'a [u8],
    transparency: Option<&'a [u16]>,
    data: &'a [u8],
    soft_mask: Option<&'a [u8]>,
}

impl<'a> From<&'a ImageInfo> for XObject<'a> {
    fn from(info: &'a ImageInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            color_space: info.color_space,
            bits_per_component: info.bits_per_component,
            filter: info.filter,
            decode_parms: info.decode_parms.clone(),
            palette: &info.palette,
            transparency: info.transparency.as_deref(),
            data: &info.data,
            soft_mask: info.soft_mask.as_deref(),
        }
    }
}

fn put_image(writer: &mut ObjectWriter, compress: bool, image: &XObject<'_>) -> Result<usize> {
    let number = writer.new_object(None);
    writer.put("<</Type /XObject");
    writer.put("/Subtype /Image");
    writer.put(&format!("/Width {}", image.width));
    writer.put(&format!("/Height {}", image.height));
    if image.color_space == ColorSpace::Indexed {
        writer.put(&format!(
            "/ColorSpace [/Indexed /DeviceRGB {} {} 0 R]",
            (image.palette.len() / 3).saturating_sub(1),
            number + 1
        ));
    } else {
        writer.put(&format!("/ColorSpace /{}", image.color_space));
        if image.color_space == ColorSpace::DeviceCmyk {
            writer.put("/Decode [1 0 1 0 1 0 1 0]");
        }
    }
    writer.put(&format!("/BitsPerComponent {}", image.bits_per_component));
    writer.put(&format!("/Filter /{}", image.filter));
    if let Some(parms) = &image.decode_parms {
        writer.put(&format!("/DecodeParms <<{parms}>>"));
    }
    if let Some(keys) = image.transparency {
        let mask: String = keys.iter().map(|t| format!("{t} {t} ")).collect();
        writer.put(&format!("/Mask [{mask}]"));
    }
    if image.soft_mask.is_some() {
        writer.put(&format!("/SMask {} 0 R", number + 1));
    }
    writer.put(&format!("/Length {}>>", image.data.len()));
    writer.put_stream(image.data);
    writer.put("endobj");

    if let Some(alpha) = image.soft_mask {
        let mask = XObject {
            width: image.width,
            height: image.height,
            color_space: ColorSpace::DeviceGray,
            bits_per_component: 8,
            filter: image.filter,
            decode_parms: Some(format!(
                "/Predictor 15 /Colors 1 /BitsPerComponent 8 /Columns {}",
                image.width
            )),
            palette: &[],
            transparency: None,
            data: alpha,
            soft_mask: None,
        };
        put_image(writer, compress, &mask)?;
    }
    if image.color_space == ColorSpace::Indexed {
        writer.put_stream_object(image.palette, compress)?;
    }
    Ok(number)
}

impl Document {
    fn ensure_writing(&self) -> Result<()> {
        match self.state {
            DocState::PageEnded => Ok(()),
            DocState::Closed => Err(ScribeError::state("the document is closed")),
            _ => Err(ScribeError::state(
                "objects can only be written while the document is being closed",
            )),
        }
    }

    /// Starts the next numbered object and returns its number.
    pub fn new_object(&mut self) -> Result<usize> {
        self.ensure_writing()?;
        Ok(self.writer.new_object(None))
    }

    /// Appends a line to the file.
    pub fn put(&mut self, s: &str) -> Result<()> {
        self.put_bytes(s.as_bytes())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_writing()?;
        self.writer.put_bytes(bytes);
        Ok(())
    }

    /// Appends `stream ... endstream` around `data`.
    pub fn put_stream(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_writing()?;
        self.writer.put_stream(data);
        Ok(())
    }

    /// Writes a complete stream object, compressed when compression is on.
    pub fn put_stream_object(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_writing()?;
        self.writer.put_stream_object(data, self.compress)
    }

    /// Highest object number allocated so far.
    pub fn object_count(&self) -> usize {
        self.writer.count()
    }

    /// Encodes text for use as a PDF string outside content streams.
    pub fn text_string(&self, s: &str) -> Vec<u8> {
        text_string(s)
    }

    /// The finished file, once the document is closed.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        (self.state == DocState::Closed).then(|| self.writer.bytes())
    }

    fn default_page_height_pt(&self) -> f64 {
        match self.def_orientation {
            Orientation::Portrait => self.def_page_size.height * self.k,
            Orientation::Landscape => self.def_page_size.width * self.k,
        }
    }

    fn check_links(&self) -> Result<()> {
        for page in &self.pages {
            for link in &page.links {
                if let LinkTarget::Internal(id) = &link.target {
                    let dest = id.0.checked_sub(1).and_then(|i| self.links.get(i));
                    match dest {
                        Some(dest) if dest.page >= 1 && dest.page <= self.pages.len() => {}
                        _ => {
                            return Err(ScribeError::state(format!(
                                "link {} has no destination page",
                                id.0
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn end_doc(&mut self) -> Result<()> {
        let started = std::time::Instant::now();
        self.check_links()?;
        self.writer.put(&format!("%PDF-{}", self.pdf_version));
        let pages = self.put_pages()?;
        self.put_resources()?;

        self.writer.new_object(None);
        self.writer.put("<<");
        self.put_info();
        self.writer.put(">>");
        self.writer.put("endobj");

        self.writer.new_object(None);
        self.writer.put("<<");
        self.put_catalog()?;
        self.writer.put(">>");
        self.writer.put("endobj");

        let xref = self.writer.put_xref()?;
        let n = self.writer.count();
        self.writer.put("trailer");
        self.writer.put("<<");
        self.writer.put(&format!("/Size {}", n + 1));
        self.writer.put(&format!("/Root {n} 0 R"));
        self.writer.put(&format!("/Info {} 0 R", n - 1));
        self.writer.put(">>");
        self.writer.put("startxref");
        self.writer.put(&xref.to_string());
        self.writer.finish();
        self.state = DocState::Closed;

        let metrics = DocumentMetrics {
            pages,
            object_count: n,
            font_count: self.fonts.len(),
            image_count: self.images.len(),
            total_bytes: self.writer.offset(),
            write_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        debug!(
            "document closed: {} pages, {} objects, {} bytes",
            metrics.pages.len(),
            metrics.object_count,
            metrics.total_bytes
        );
        self.metrics = Some(metrics);
        Ok(())
    }

    fn put_pages(&mut self) -> Result<Vec<PageMetrics>> {
        let first = self.writer.count() + 1;
        for (i, page) in self.pages.iter_mut().enumerate() {
            page.object_number = Some(first + 2 * i);
        }
        let mut metrics = Vec::with_capacity(self.pages.len());
        for i in 0..self.pages.len() {
            metrics.push(self.put_page(i)?);
        }

        let k = self.k;
        self.writer.new_object(Some(1));
        self.writer.put("<</Type /Pages");
        let kids: String = self
            .pages
            .iter()
            .filter_map(|p| p.object_number)
            .map(|n| format!("{n} 0 R "))
            .collect();
        self.writer.put(&format!("/Kids [{kids}]"));
        self.writer.put(&format!("/Count {}", self.pages.len()));
        let (w, h) = match self.def_orientation {
            Orientation::Portrait => (self.def_page_size.width, self.def_page_size.height),
            Orientation::Landscape => (self.def_page_size.height, self.def_page_size.width),
        };
        self.writer
            .put(&format!("/MediaBox [0 0 {} {}]", fmt2(w * k), fmt2(h * k)));
        self.writer.put(">>");
        self.writer.put("endobj");
        Ok(metrics)
    }

    fn put_page(&mut self, i: usize) -> Result<PageMetrics> {
        let annots = self.annotations(i)?;
        let page = &self.pages[i];
        let number = self.writer.new_object(None);
        self.writer.put("<</Type /Page");
        self.writer.put("/Parent 1 0 R");
        if let Some(size) = page.size {
            self.writer.put(&format!(
                "/MediaBox [0 0 {} {}]",
                fmt2(size.width),
                fmt2(size.height)
            ));
        }
        if let Some(rotation) = page.rotation {
            self.writer.put(&format!("/Rotate {rotation}"));
        }
        self.writer.put("/Resources 2 0 R");
        if let Some(annots) = &annots {
            self.writer.put_bytes(annots);
        }
        if self.with_alpha {
            self.writer
                .put("/Group <</Type /Group /S /Transparency /CS /DeviceRGB>>");
        }
        self.writer.put(&format!("/Contents {} 0 R>>", number + 1));
        self.writer.put("endobj");

        let content = match &self.alias_nb_pages {
            Some(alias) => replace_bytes(
                &page.content,
                alias.as_bytes(),
                self.pages.len().to_string().as_bytes(),
            ),
            None => page.content.clone(),
        };
        self.writer.put_stream_object(&content, self.compress)?;
        Ok(PageMetrics {
            page_number: i + 1,
            object_number: number,
            content_bytes: content.len(),
            link_count: page.links.len(),
        })
    }

    fn annotations(&self, i: usize) -> Result<Option<Vec<u8>>> {
        let page = &self.pages[i];
        if page.links.is_empty() {
            return Ok(None);
        }
        let mut annots = b"/Annots [".to_vec();
        for link in &page.links {
            let rect = format!(
                "{} {} {} {}",
                fmt2(link.x),
                fmt2(link.y),
                fmt2(link.x + link.width),
                fmt2(link.y - link.height)
            );
            annots.extend_from_slice(
                format!("<</Type /Annot /Subtype /Link /Rect [{rect}] /Border [0 0 0] ").as_bytes(),
            );
            match &link.target {
                LinkTarget::Uri(uri) => {
                    annots.extend_from_slice(b"/A <</S /URI /URI ");
                    annots.extend_from_slice(&text_string(uri));
                    annots.extend_from_slice(b">>>>");
                }
                LinkTarget::Internal(id) => {
                    let dest = id
                        .0
                        .checked_sub(1)
                        .and_then(|i| self.links.get(i))
                        .ok_or_else(|| ScribeError::state(format!("unknown link: {}", id.0)))?;
                    let target = dest
                        .page
                        .checked_sub(1)
                        .and_then(|p| self.pages.get(p))
                        .ok_or_else(|| {
                            ScribeError::state(format!("link {} has no destination page", id.0))
                        })?;
                    let height = target
                        .size
                        .map(|s| s.height)
                        .unwrap_or_else(|| self.default_page_height_pt());
                    let object = target.object_number.unwrap_or_default();
                    annots.extend_from_slice(
                        format!(
                            "/Dest [{object} 0 R /XYZ 0 {} null]>>",
                            fmt2(height - dest.y * self.k)
                        )
                        .as_bytes(),
                    );
                }
            }
        }
        annots.push(b']');
        Ok(Some(annots))
    }

    fn put_resources(&mut self) -> Result<()> {
        let fonts = self.put_fonts()?;
        let images = self.put_images()?;

        self.writer.new_object(Some(2));
        self.writer.put("<<");
        self.writer.put("/ProcSet [/PDF /Text /ImageB /ImageC /ImageI]");
        self.writer.put("/Font <<");
        for (index, number) in fonts {
            self.writer.put(&format!("/F{index} {number} 0 R"));
        }
        self.writer.put(">>");
        self.writer.put("/XObject <<");
        for (index, number) in images {
            self.writer.put(&format!("/I{index} {number} 0 R"));
        }
        self.writer.put(">>");
        self.writer.put(">>");
        self.writer.put("endobj");

        self.run_hook(|hooks, doc| hooks.put_resources(doc))
    }

    fn put_fonts(&mut self) -> Result<Vec<(usize, usize)>> {
        let mut file_objects: HashMap<String, usize> = HashMap::new();
        for (name, file) in self.fonts.files() {
            let compressed = name.ends_with(".z");
            let data = match file.length2 {
                Some(length2) if !compressed => {
                    let l1 = file.length1;
                    let first = file.data.get(6..6 + l1);
                    let second = file.data.get(12 + l1..12 + l1 + length2);
                    match (first, second) {
                        (Some(a), Some(b)) => [a, b].concat(),
                        _ => {
                            return Err(ScribeError::resource(format!(
                                "font file is truncated: {name}"
                            )));
                        }
                    }
                }
                _ => file.data.clone(),
            };
            let number = self.writer.new_object(None);
            self.writer.put(&format!("<</Length {}", data.len()));
            if compressed {
                self.writer.put("/Filter /FlateDecode");
            }
            self.writer.put(&format!("/Length1 {}", file.length1));
            if let Some(length2) = file.length2 {
                self.writer.put(&format!("/Length2 {length2} /Length3 0"));
            }
            self.writer.put(">>");
            self.writer.put_stream(&data);
            self.writer.put("endobj");
            file_objects.insert(name.clone(), number);
        }

        let fonts: Vec<Arc<RegisteredFont>> = self.fonts.iter().cloned().collect();
        let mut encodings: HashMap<String, usize> = HashMap::new();
        let mut cmaps: HashMap<String, usize> = HashMap::new();
        let mut objects = Vec::with_capacity(fonts.len());
        for font in fonts {
            let def = font.definition();
            let encoding = def.encoding.clone().unwrap_or_default();
            let encoding_object = match &def.differences {
                Some(diff) => match encodings.get(&encoding) {
                    Some(number) => Some(*number),
                    None => {
                        let number = self.writer.new_object(None);
                        self.writer.put(&format!(
                            "<</Type /Encoding /BaseEncoding /WinAnsiEncoding /Differences [{diff}]>>"
                        ));
                        self.writer.put("endobj");
                        encodings.insert(encoding.clone(), number);
                        Some(number)
                    }
                },
                None => None,
            };
            let cmap_object = match &def.unicode_map {
                Some(map) => {
                    let key = def.encoding.clone().unwrap_or_else(|| def.name.clone());
                    match cmaps.get(&key) {
                        Some(number) => Some(*number),
                        None => {
                            let cmap = to_unicode_cmap(map);
                            let number = self.writer.put_stream_object(cmap.as_bytes(), self.compress)?;
                            cmaps.insert(key, number);
                            Some(number)
                        }
                    }
                }
                None => None,
            };

            let name = if def.subsetted {
                format!("AAAAAA+{}", def.name)
            } else {
                def.name.clone()
            };
            let number = match def.font_type {
                FontType::Core => {
                    let number = self.writer.new_object(None);
                    self.writer.put("<</Type /Font");
                    self.writer.put(&format!("/BaseFont /{name}"));
                    self.writer.put("/Subtype /Type1");
                    if name != "Symbol" && name != "ZapfDingbats" {
                        self.writer.put("/Encoding /WinAnsiEncoding");
                    }
                    if let Some(cmap) = cmap_object {
                        self.writer.put(&format!("/ToUnicode {cmap} 0 R"));
                    }
                    self.writer.put(">>");
                    self.writer.put("endobj");
                    number
                }
                FontType::Type1 | FontType::TrueType => {
                    let subtype = if def.font_type == FontType::Type1 { "Type1" } else { "TrueType" };
                    let descriptor = def.descriptor.as_ref().ok_or_else(|| {
                        ScribeError::resource(format!("font {} has no descriptor", def.name))
                    })?;
                    let number = self.writer.new_object(None);
                    self.writer.put("<</Type /Font");
                    self.writer.put(&format!("/BaseFont /{name}"));
                    self.writer.put(&format!("/Subtype /{subtype}"));
                    self.writer.put("/FirstChar 32 /LastChar 255");
                    self.writer.put(&format!("/Widths {} 0 R", number + 1));
                    self.writer.put(&format!("/FontDescriptor {} 0 R", number + 2));
                    match encoding_object {
                        Some(enc) => self.writer.put(&format!("/Encoding {enc} 0 R")),
                        None => self.writer.put("/Encoding /WinAnsiEncoding"),
                    }
                    if let Some(cmap) = cmap_object {
                        self.writer.put(&format!("/ToUnicode {cmap} 0 R"));
                    }
                    self.writer.put(">>");
                    self.writer.put("endobj");

                    self.writer.new_object(None);
                    let widths: String = def.widths[32..].iter().map(|w| format!("{w} ")).collect();
                    self.writer.put(&format!("[{widths}]"));
                    self.writer.put("endobj");

                    self.writer.new_object(None);
                    let mut desc = format!("<</Type /FontDescriptor /FontName /{name}");
                    desc.push_str(&descriptor.pdf_entries());
                    if let Some(file) = &def.file {
                        let file_object = file_objects.get(file).ok_or_else(|| {
                            ScribeError::resource(format!("font file not found: {file}"))
                        })?;
                        let suffix = if def.font_type == FontType::Type1 { "" } else { "2" };
                        desc.push_str(&format!(" /FontFile{suffix} {file_object} 0 R"));
                    }
                    self.writer.put(&format!("{desc}>>"));
                    self.writer.put("endobj");
                    number
                }
                FontType::Other => {
                    return Err(ScribeError::resource(format!(
                        "unsupported font type for {}",
                        def.name
                    )));
                }
            };
            objects.push((font.index(), number));
        }
        Ok(objects)
    }

    fn put_images(&mut self) -> Result<Vec<(usize, usize)>> {
        let mut objects = Vec::with_capacity(self.images.len());
        for info in self.images.values_mut() {
            let number = put_image(&mut self.writer, self.compress, &XObject::from(&*info))?;
            objects.push((info.index, number));
            info.data = Vec::new();
            info.soft_mask = None;
        }
        Ok(objects)
    }

    fn put_info(&mut self) {
        let date = self
            .creation_date
            .unwrap_or_else(|| Local::now().fixed_offset());
        let mut entries: Vec<(&str, String)> = self
            .metadata
            .iter()
            .map(|(key, value)| (*key, value.clone()))
            .collect();
        entries.push(("Producer", PRODUCER.to_string()));
        entries.push(("CreationDate", format!("D:{}", date.format("%Y%m%d%H%M%S"))));
        for (key, value) in entries {
            let mut line = format!("/{key} ").into_bytes();
            line.extend_from_slice(&text_string(&value));
            self.writer.put_bytes(&line);
        }
    }

    fn put_catalog(&mut self) -> Result<()> {
        let first = self
            .pages
            .first()
            .and_then(|p| p.object_number)
            .unwrap_or_default();
        self.writer.put("/Type /Catalog");
        self.writer.put("/Pages 1 0 R");
        match self.zoom_mode {
            ZoomMode::FullPage => self.writer.put(&format!("/OpenAction [{first} 0 R /Fit]")),
            ZoomMode::FullWidth => self
                .writer
                .put(&format!("/OpenAction [{first} 0 R /FitH null]")),
            ZoomMode::Real => self
                .writer
                .put(&format!("/OpenAction [{first} 0 R /XYZ null null 1]")),
            ZoomMode::Percent(zoom) => self.writer.put(&format!(
                "/OpenAction [{first} 0 R /XYZ null null {}]",
                fmt2(zoom / 100.0)
            )),
            ZoomMode::Default => {}
        }
        match self.layout_mode {
            LayoutMode::Single => self.writer.put("/PageLayout /SinglePage"),
            LayoutMode::Continuous => self.writer.put("/PageLayout /OneColumn"),
            LayoutMode::Two => self.writer.put("/PageLayout /TwoColumnLeft"),
            LayoutMode::Default => {}
        }
        self.run_hook(|hooks, doc| hooks.put_catalog(doc))
    }
}
