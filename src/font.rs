use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::error::{Result, ScribeError};

/// Families that can be selected without an explicit `add_font`.
pub(crate) const CORE_FAMILIES: [&str; 5] = ["courier", "helvetica", "times", "symbol", "zapfdingbats"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontType {
    Core,
    Type1,
    TrueType,
    #[serde(other)]
    Other,
}

/// Entries of the PDF `/FontDescriptor`, in 1/1000 em.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FontDescriptor {
    pub ascent: i32,
    pub descent: i32,
    pub cap_height: i32,
    pub flags: u32,
    #[serde(rename = "FontBBox")]
    pub font_bbox: [i32; 4],
    pub italic_angle: f64,
    pub stem_v: i32,
    pub missing_width: u16,
}

impl FontDescriptor {
    pub(crate) fn pdf_entries(&self) -> String {
        format!(
            " /Ascent {} /Descent {} /CapHeight {} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /StemV {} /MissingWidth {}",
            self.ascent,
            self.descent,
            self.cap_height,
            self.flags,
            self.font_bbox[0],
            self.font_bbox[1],
            self.font_bbox[2],
            self.font_bbox[3],
            self.italic_angle,
            self.stem_v,
            self.missing_width
        )
    }
}

/// One byte maps to a codepoint, or starts a run of `count` consecutive ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnicodeMapping {
    Single(u32),
    Range([u32; 2]),
}

/// Serialized font definition: what `add_font` reads from the font directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontDefinition {
    pub font_type: FontType,
    pub name: String,
    #[serde(default)]
    pub descriptor: Option<FontDescriptor>,
    pub underline_position: i32,
    pub underline_thickness: i32,
    pub widths: Vec<u16>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub differences: Option<String>,
    #[serde(default)]
    pub unicode_map: Option<BTreeMap<u8, UnicodeMapping>>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub original_size: Option<usize>,
    #[serde(default)]
    pub size1: Option<usize>,
    #[serde(default)]
    pub size2: Option<usize>,
    #[serde(default)]
    pub subsetted: bool,
}

impl FontDefinition {
    pub fn from_json(source: &str) -> Result<Self> {
        let mut def: FontDefinition = serde_json::from_str(source)
            .map_err(|err| ScribeError::resource(format!("could not read font definition: {err}")))?;
        def.encoding = def.encoding.map(|enc| enc.to_ascii_lowercase());
        def.validate()?;
        Ok(def)
    }

    fn validate(&self) -> Result<()> {
        if self.widths.len() != 256 {
            return Err(ScribeError::resource(format!(
                "font definition {} has {} widths, expected 256",
                self.name,
                self.widths.len()
            )));
        }
        if self.file.is_some() {
            let sized = match self.font_type {
                FontType::TrueType => self.original_size.is_some(),
                FontType::Type1 => self.size1.is_some() && self.size2.is_some(),
                _ => true,
            };
            if !sized {
                return Err(ScribeError::resource(format!(
                    "font definition {} names a file without its sizes",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Builds a cp1252 definition from TrueType/OpenType bytes. The whole
    /// font is embedded; returns the definition and the compressed font file.
    pub fn from_truetype(data: &[u8], file_name: &str) -> Result<(Self, Vec<u8>)> {
        let face = ttf_parser::Face::parse(data, 0)
            .map_err(|err| ScribeError::resource(format!("cannot parse TrueType font: {err}")))?;
        let units = face.units_per_em().max(1) as f64;
        let scale = |v: i16| (v as f64 * 1000.0 / units).round() as i32;

        let missing = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .map(|adv| (adv as f64 * 1000.0 / units).round() as u16)
            .unwrap_or(0);
        let widths = (0u16..=255)
            .map(|byte| {
                cp1252_char(byte as u8)
                    .and_then(|ch| face.glyph_index(ch))
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|adv| (adv as f64 * 1000.0 / units).round() as u16)
                    .unwrap_or(missing)
            })
            .collect::<Vec<_>>();

        let bbox = face.global_bounding_box();
        let ascent = scale(face.ascender());
        let italic_angle = face.italic_angle().unwrap_or(0.0) as f64;
        let mut flags = 32;
        if face.is_monospaced() {
            flags |= 1;
        }
        if italic_angle != 0.0 {
            flags |= 64;
        }
        let descriptor = FontDescriptor {
            ascent,
            descent: scale(face.descender()),
            cap_height: face.capital_height().map(scale).unwrap_or(ascent),
            flags,
            font_bbox: [
                scale(bbox.x_min),
                scale(bbox.y_min),
                scale(bbox.x_max),
                scale(bbox.y_max),
            ],
            italic_angle,
            stem_v: if face.is_bold() { 120 } else { 70 },
            missing_width: missing,
        };
        let (underline_position, underline_thickness) = face
            .underline_metrics()
            .map(|m| (scale(m.position), scale(m.thickness)))
            .unwrap_or((-100, 50));

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        let file = if file_name.ends_with(".z") {
            file_name.to_string()
        } else {
            format!("{file_name}.z")
        };
        let def = FontDefinition {
            font_type: FontType::TrueType,
            name: postscript_name(&face).unwrap_or_else(|| "EmbeddedFont".to_string()),
            descriptor: Some(descriptor),
            underline_position,
            underline_thickness,
            widths,
            encoding: Some("cp1252".to_string()),
            differences: None,
            unicode_map: Some(cp1252_unicode_map()),
            file: Some(file),
            original_size: Some(data.len()),
            size1: None,
            size2: None,
            subsetted: false,
        };
        Ok((def, compressed))
    }
}

fn postscript_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut fallback = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::POST_SCRIPT_NAME => {
                return Some(name.chars().filter(|c| !c.is_whitespace()).collect());
            }
            name_id::FULL_NAME if fallback.is_none() => fallback = Some(name),
            _ => {}
        }
    }
    fallback.map(|name| name.chars().filter(|c| !c.is_whitespace()).collect())
}

// Codepoints of cp1252 bytes 0x80..=0x9F; zero marks an unassigned byte.
const CP1252_HIGH: [u32; 32] = [
    0x20AC, 0, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021, 0x02C6, 0x2030, 0x0160, 0x2039,
    0x0152, 0, 0x017D, 0, 0, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014, 0x02DC,
    0x2122, 0x0161, 0x203A, 0x0153, 0, 0x017E, 0x0178,
];

pub(crate) fn cp1252_char(byte: u8) -> Option<char> {
    match byte {
        0x80..=0x9F => match CP1252_HIGH[(byte - 0x80) as usize] {
            0 => None,
            cp => char::from_u32(cp),
        },
        other => Some(other as char),
    }
}

/// The cp1252 Unicode map in its compact (single or run) form.
pub(crate) fn cp1252_unicode_map() -> BTreeMap<u8, UnicodeMapping> {
    let mut map = BTreeMap::new();
    map.insert(0, UnicodeMapping::Range([0, 128]));
    let mut byte = 0x80usize;
    while byte < 0xA0 {
        let cp = CP1252_HIGH[byte - 0x80];
        if cp == 0 {
            byte += 1;
            continue;
        }
        let mut run = 1;
        while byte + run < 0xA0 && CP1252_HIGH[byte + run - 0x80] == cp + run as u32 {
            run += 1;
        }
        let entry = if run == 1 {
            UnicodeMapping::Single(cp)
        } else {
            UnicodeMapping::Range([cp, run as u32])
        };
        map.insert(byte as u8, entry);
        byte += run;
    }
    map.insert(0xA0, UnicodeMapping::Range([0xA0, 96]));
    map
}

/// ToUnicode CMap for a byte-encoded font.
pub(crate) fn to_unicode_cmap(map: &BTreeMap<u8, UnicodeMapping>) -> String {
    let mut ranges = String::new();
    let mut range_count = 0;
    let mut chars = String::new();
    let mut char_count = 0;
    for (&code, mapping) in map {
        match mapping {
            UnicodeMapping::Range([start, count]) => {
                let last = code as u32 + count.saturating_sub(1);
                ranges.push_str(&format!("<{:02X}> <{:02X}> <{:04X}>\n", code, last, start));
                range_count += 1;
            }
            UnicodeMapping::Single(cp) => {
                chars.push_str(&format!("<{:02X}> <{:04X}>\n", code, cp));
                char_count += 1;
            }
        }
    }

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo\n<</Registry (Adobe)\n/Ordering (UCS)\n/Supplement 0\n>> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<00> <FF>\nendcodespacerange\n");
    if range_count > 0 {
        out.push_str(&format!("{range_count} beginbfrange\n"));
        out.push_str(&ranges);
        out.push_str("endbfrange\n");
    }
    if char_count > 0 {
        out.push_str(&format!("{char_count} beginbfchar\n"));
        out.push_str(&chars);
        out.push_str("endbfchar\n");
    }
    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend");
    out
}

fn builtin_definition(file: &str) -> Option<&'static str> {
    let source = match file {
        "courier.json" => include_str!("core_fonts/courier.json"),
        "courierb.json" => include_str!("core_fonts/courierb.json"),
        "courieri.json" => include_str!("core_fonts/courieri.json"),
        "courierbi.json" => include_str!("core_fonts/courierbi.json"),
        "helvetica.json" => include_str!("core_fonts/helvetica.json"),
        "helveticab.json" => include_str!("core_fonts/helveticab.json"),
        "helveticai.json" => include_str!("core_fonts/helveticai.json"),
        "helveticabi.json" => include_str!("core_fonts/helveticabi.json"),
        "times.json" => include_str!("core_fonts/times.json"),
        "timesb.json" => include_str!("core_fonts/timesb.json"),
        "timesi.json" => include_str!("core_fonts/timesi.json"),
        "timesbi.json" => include_str!("core_fonts/timesbi.json"),
        "symbol.json" => include_str!("core_fonts/symbol.json"),
        "zapfdingbats.json" => include_str!("core_fonts/zapfdingbats.json"),
        _ => return None,
    };
    Some(source)
}

/// Upper-cases a style, strips `U` and orders `IB` as `BI`.
pub(crate) fn normalize_style(style: &str) -> (String, bool) {
    let upper = style.to_ascii_uppercase();
    let underline = upper.contains('U');
    let mut style: String = upper.chars().filter(|c| *c != 'U').collect();
    if style == "IB" {
        style = "BI".to_string();
    }
    (style, underline)
}

/// A registered font. Immutable; shared by the layout routines.
#[derive(Debug)]
pub struct RegisteredFont {
    pub(crate) index: usize,
    pub(crate) key: String,
    pub(crate) definition: FontDefinition,
    encoder: HashMap<char, u8>,
}

impl RegisteredFont {
    fn new(index: usize, key: String, definition: FontDefinition) -> Self {
        let mut encoder = HashMap::new();
        match &definition.unicode_map {
            Some(map) => {
                for (&code, mapping) in map {
                    let (start, count) = match *mapping {
                        UnicodeMapping::Single(cp) => (cp, 1),
                        UnicodeMapping::Range([cp, count]) => (cp, count),
                    };
                    for offset in 0..count {
                        let byte = code as u32 + offset;
                        if let (Ok(byte), Some(ch)) = (u8::try_from(byte), char::from_u32(start + offset)) {
                            encoder.entry(ch).or_insert(byte);
                        }
                    }
                }
            }
            None => {
                for byte in 0..=255u8 {
                    encoder.insert(byte as char, byte);
                }
            }
        }
        Self {
            index,
            key,
            definition,
            encoder,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn font_type(&self) -> FontType {
        self.definition.font_type
    }

    pub fn definition(&self) -> &FontDefinition {
        &self.definition
    }

    /// Advance of one encoded byte, in 1/1000 em.
    pub fn width(&self, byte: u8) -> u16 {
        self.definition.widths[byte as usize]
    }

    /// Sum of the byte advances, in 1/1000 em.
    pub fn text_width(&self, encoded: &[u8]) -> u32 {
        encoded.iter().map(|&b| self.width(b) as u32).sum()
    }

    /// Encodes text for this font; characters it cannot represent become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(text.len());
        let mut replaced = 0usize;
        for ch in text.chars() {
            match self.encoder.get(&ch) {
                Some(&byte) => out.push(byte),
                None => {
                    out.push(b'?');
                    replaced += 1;
                }
            }
        }
        if replaced > 0 {
            warn!(
                "{} character(s) not encodable in font {} were replaced with '?'",
                replaced, self.definition.name
            );
        }
        out
    }
}

/// Embedded font program, keyed by its definition's file name.
#[derive(Debug, Clone)]
pub(crate) struct FontFile {
    pub(crate) data: Vec<u8>,
    pub(crate) length1: usize,
    pub(crate) length2: Option<usize>,
}

#[derive(Debug)]
pub struct FontRegistry {
    fonts: IndexMap<String, Arc<RegisteredFont>>,
    files: IndexMap<String, FontFile>,
    font_path: Option<PathBuf>,
}

impl FontRegistry {
    pub fn new(font_path: Option<PathBuf>) -> Self {
        Self {
            fonts: IndexMap::new(),
            files: IndexMap::new(),
            font_path,
        }
    }

    pub fn font_path(&self) -> Option<&Path> {
        self.font_path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Arc<RegisteredFont>> {
        self.fonts.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredFont>> {
        self.fonts.values()
    }

    pub(crate) fn files(&self) -> impl Iterator<Item = (&String, &FontFile)> {
        self.files.iter()
    }

    /// Registers `family` + `style` from a definition file. A no-op when the
    /// key is already registered.
    pub fn add_font(&mut self, family: &str, style: &str, file: Option<&str>) -> Result<Arc<RegisteredFont>> {
        let family = family.to_ascii_lowercase();
        let file = match file {
            Some(file) if !file.is_empty() => file.to_string(),
            _ => format!("{}{}.json", family.replace(' ', ""), style.to_ascii_lowercase()),
        };
        let (style, _) = normalize_style(style);
        let key = format!("{family}{style}");
        if let Some(existing) = self.fonts.get(&key) {
            return Ok(existing.clone());
        }
        if file.contains('/') || file.contains('\\') {
            return Err(ScribeError::resource(format!(
                "incorrect font definition file name: {file}"
            )));
        }
        let definition = self.load_definition(&file)?;
        self.register(key, definition, None)
    }

    /// Registers an already-built definition, optionally with the bytes of
    /// its font file (as produced by `FontDefinition::from_truetype`).
    pub fn add_definition(
        &mut self,
        family: &str,
        style: &str,
        definition: FontDefinition,
        file_data: Option<Vec<u8>>,
    ) -> Result<Arc<RegisteredFont>> {
        let (style, _) = normalize_style(style);
        let key = format!("{}{}", family.to_ascii_lowercase(), style);
        if let Some(existing) = self.fonts.get(&key) {
            return Ok(existing.clone());
        }
        definition.validate()?;
        self.register(key, definition, file_data)
    }

    fn register(
        &mut self,
        key: String,
        definition: FontDefinition,
        file_data: Option<Vec<u8>>,
    ) -> Result<Arc<RegisteredFont>> {
        if let Some(file) = definition.file.clone() {
            if !self.files.contains_key(&file) {
                let data = match file_data {
                    Some(data) => data,
                    None => self.read_font_file(&file)?,
                };
                let (length1, length2) = match definition.font_type {
                    FontType::TrueType => (definition.original_size.unwrap_or(data.len()), None),
                    _ => (definition.size1.unwrap_or(0), definition.size2),
                };
                self.files.insert(
                    file,
                    FontFile {
                        data,
                        length1,
                        length2,
                    },
                );
            }
        }
        let index = self.fonts.len() + 1;
        debug!("registered font {} as /F{} ({})", key, index, definition.name);
        let font = Arc::new(RegisteredFont::new(index, key.clone(), definition));
        self.fonts.insert(key, font.clone());
        Ok(font)
    }

    fn load_definition(&self, file: &str) -> Result<FontDefinition> {
        if let Some(dir) = &self.font_path {
            let path = dir.join(file);
            if path.is_file() {
                let source = fs::read_to_string(&path).map_err(|err| {
                    ScribeError::resource(format!("could not read font definition {}: {err}", path.display()))
                })?;
                return FontDefinition::from_json(&source);
            }
        }
        match builtin_definition(file) {
            Some(source) => FontDefinition::from_json(source),
            None => Err(ScribeError::resource(format!(
                "could not include font definition file: {file}"
            ))),
        }
    }

    fn read_font_file(&self, file: &str) -> Result<Vec<u8>> {
        let path = match &self.font_path {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        };
        fs::read(&path).map_err(|err| ScribeError::resource(format!("font file not found: {file} ({err})")))
    }
}
