use std::fmt;
use std::io::{self, Cursor, Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use byteorder::{BigEndian, ReadBytesExt};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use sha2::{Digest, Sha256};

use crate::error::{Result, ScribeError};

const PNG_SIGNATURE: [u8; 8] = [137, b'P', b'N', b'G', 13, 10, 26, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    Indexed,
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorSpace::DeviceGray => "DeviceGray",
            ColorSpace::DeviceRgb => "DeviceRGB",
            ColorSpace::DeviceCmyk => "DeviceCMYK",
            ColorSpace::Indexed => "Indexed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFilter {
    Dct,
    Flate,
}

impl fmt::Display for ImageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFilter::Dct => f.write_str("DCTDecode"),
            ImageFilter::Flate => f.write_str("FlateDecode"),
        }
    }
}

/// Raster normalized for embedding as an image XObject.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub(crate) index: usize,
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub bits_per_component: u8,
    pub filter: ImageFilter,
    pub decode_parms: Option<String>,
    pub palette: Vec<u8>,
    /// Color-key mask values (`/Mask`), one per component.
    pub transparency: Option<Vec<u16>>,
    pub data: Vec<u8>,
    /// Zlib-compressed alpha plane, same predictor layout as `data`.
    pub soft_mask: Option<Vec<u8>>,
}

impl ImageInfo {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    /// Resolves an explicit type, or the extension of `name` when `explicit` is empty.
    pub fn detect(name: &str, explicit: Option<&str>) -> Result<Self> {
        let kind = match explicit.filter(|t| !t.is_empty()) {
            Some(kind) => kind.to_ascii_lowercase(),
            None => match name.rfind('.') {
                Some(pos) if pos > 0 => name[pos + 1..].to_ascii_lowercase(),
                _ => {
                    return Err(ScribeError::resource(format!(
                        "image file has no extension and no type was specified: {name}"
                    )));
                }
            },
        };
        match kind.as_str() {
            "jpg" | "jpeg" => Ok(ImageKind::Jpeg),
            "png" => Ok(ImageKind::Png),
            "gif" => Ok(ImageKind::Gif),
            other => Err(ScribeError::resource(format!("unsupported image type: {other}"))),
        }
    }

    pub fn parse(self, data: &[u8], name: &str) -> Result<ImageInfo> {
        match self {
            ImageKind::Jpeg => parse_jpeg(data, name),
            ImageKind::Png => parse_png(data, name),
            ImageKind::Gif => parse_gif(data, name),
        }
    }
}

/// Decoded `data:` URI: the image type from its MIME subtype and the payload.
pub(crate) fn decode_data_uri(uri: &str) -> Result<(ImageKind, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| ScribeError::resource("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ScribeError::resource("malformed data URI"))?;
    let mut parts = header.split(';');
    let mime = parts.next().unwrap_or_default();
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(ScribeError::resource("data URI images must be base64 encoded"));
    }
    let subtype = mime.rsplit('/').next().unwrap_or_default();
    let kind = ImageKind::detect("", Some(subtype))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| ScribeError::resource(format!("invalid base64 image data: {err}")))?;
    Ok((kind, bytes))
}

/// Identity of in-memory image bytes.
pub(crate) fn content_key(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut key = String::with_capacity(7 + digest.len() * 2);
    key.push_str("sha256:");
    for b in digest {
        key.push_str(&format!("{b:02x}"));
    }
    key
}

/// Display size in user units. Negative values are a target DPI, zero on one
/// axis keeps the aspect ratio, zero on both means 96 dpi.
pub fn resolve_size(info: &ImageInfo, w: f64, h: f64, k: f64) -> (f64, f64) {
    let (mut w, mut h) = if w == 0.0 && h == 0.0 { (-96.0, -96.0) } else { (w, h) };
    if w < 0.0 {
        w = -(info.width as f64) * 72.0 / w / k;
    }
    if h < 0.0 {
        h = -(info.height as f64) * 72.0 / h / k;
    }
    if w == 0.0 {
        w = h * info.width as f64 / info.height as f64;
    }
    if h == 0.0 {
        h = w * info.height as f64 / info.width as f64;
    }
    (w, h)
}

fn truncated(err: io::Error) -> ScribeError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ScribeError::resource("unexpected end of stream")
    } else {
        ScribeError::Io(err)
    }
}

pub fn parse_jpeg(data: &[u8], name: &str) -> Result<ImageInfo> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(ScribeError::resource(format!("not a JPEG file: {name}")));
    }
    let mut cur = Cursor::new(&data[2..]);
    loop {
        let mut byte = cur.read_u8().map_err(truncated)?;
        if byte != 0xFF {
            return Err(ScribeError::resource(format!("incorrect JPEG file: {name}")));
        }
        while byte == 0xFF {
            byte = cur.read_u8().map_err(truncated)?;
        }
        let marker = byte;
        match marker {
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => {
                return Err(ScribeError::resource(format!("no frame header in JPEG file: {name}")));
            }
            _ => {}
        }
        let length = cur.read_u16::<BigEndian>().map_err(truncated)? as u64;
        if length < 2 {
            return Err(ScribeError::resource(format!("incorrect JPEG file: {name}")));
        }
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let bits = cur.read_u8().map_err(truncated)?;
            let height = cur.read_u16::<BigEndian>().map_err(truncated)? as u32;
            let width = cur.read_u16::<BigEndian>().map_err(truncated)? as u32;
            let channels = cur.read_u8().map_err(truncated)?;
            if width == 0 || height == 0 {
                return Err(ScribeError::resource(format!("incorrect JPEG file: {name}")));
            }
            let color_space = match channels {
                3 => ColorSpace::DeviceRgb,
                4 => ColorSpace::DeviceCmyk,
                _ => ColorSpace::DeviceGray,
            };
            return Ok(ImageInfo {
                index: 0,
                width,
                height,
                color_space,
                bits_per_component: bits,
                filter: ImageFilter::Dct,
                decode_parms: None,
                palette: Vec::new(),
                transparency: None,
                data: data.to_vec(),
                soft_mask: None,
            });
        }
        cur.set_position(cur.position() + length - 2);
        if cur.position() > cur.get_ref().len() as u64 {
            return Err(ScribeError::resource("unexpected end of stream"));
        }
    }
}

fn read_exact_vec(cur: &mut Cursor<&[u8]>, n: usize) -> Result<Vec<u8>> {
    let remaining = cur.get_ref().len() as u64 - cur.position().min(cur.get_ref().len() as u64);
    if (n as u64) > remaining {
        return Err(ScribeError::resource("unexpected end of stream"));
    }
    let mut buf = vec![0u8; n];
    cur.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

pub fn parse_png(data: &[u8], name: &str) -> Result<ImageInfo> {
    let mut cur = Cursor::new(data);
    if read_exact_vec(&mut cur, 8)? != PNG_SIGNATURE {
        return Err(ScribeError::resource(format!("not a PNG file: {name}")));
    }

    cur.read_u32::<BigEndian>().map_err(truncated)?;
    if read_exact_vec(&mut cur, 4)? != b"IHDR" {
        return Err(ScribeError::resource(format!("incorrect PNG file: {name}")));
    }
    let width = cur.read_u32::<BigEndian>().map_err(truncated)?;
    let height = cur.read_u32::<BigEndian>().map_err(truncated)?;
    if width == 0 || height == 0 {
        return Err(ScribeError::resource(format!("incorrect PNG file: {name}")));
    }
    let bpc = cur.read_u8().map_err(truncated)?;
    if bpc > 8 {
        return Err(ScribeError::resource(format!("16-bit depth not supported: {name}")));
    }
    let color_type = cur.read_u8().map_err(truncated)?;
    let color_space = match color_type {
        0 | 4 => ColorSpace::DeviceGray,
        2 | 6 => ColorSpace::DeviceRgb,
        3 => ColorSpace::Indexed,
        _ => return Err(ScribeError::resource(format!("unknown color type: {name}"))),
    };
    if cur.read_u8().map_err(truncated)? != 0 {
        return Err(ScribeError::resource(format!("unknown compression method: {name}")));
    }
    if cur.read_u8().map_err(truncated)? != 0 {
        return Err(ScribeError::resource(format!("unknown filter method: {name}")));
    }
    if cur.read_u8().map_err(truncated)? != 0 {
        return Err(ScribeError::resource(format!("interlacing not supported: {name}")));
    }
    cur.read_u32::<BigEndian>().map_err(truncated)?;
    let colors = if color_space == ColorSpace::DeviceRgb { 3 } else { 1 };
    let decode_parms = format!("/Predictor 15 /Colors {colors} /BitsPerComponent {bpc} /Columns {width}");

    let mut palette = Vec::new();
    let mut transparency = None;
    let mut idat = Vec::new();
    loop {
        let length = cur.read_u32::<BigEndian>().map_err(truncated)? as usize;
        let chunk = read_exact_vec(&mut cur, 4)?;
        match chunk.as_slice() {
            b"PLTE" => {
                palette = read_exact_vec(&mut cur, length)?;
                read_exact_vec(&mut cur, 4)?;
            }
            b"tRNS" => {
                let t = read_exact_vec(&mut cur, length)?;
                let at = |i: usize| t.get(i).copied().unwrap_or(0) as u16;
                transparency = match color_type {
                    0 => Some(vec![at(1)]),
                    2 => Some(vec![at(1), at(3), at(5)]),
                    _ => t.iter().position(|&a| a == 0).map(|pos| vec![pos as u16]),
                };
                read_exact_vec(&mut cur, 4)?;
            }
            b"IDAT" => {
                idat.extend_from_slice(&read_exact_vec(&mut cur, length)?);
                read_exact_vec(&mut cur, 4)?;
            }
            b"IEND" => break,
            _ => {
                read_exact_vec(&mut cur, length + 4)?;
            }
        }
        if length == 0 {
            break;
        }
    }

    if color_space == ColorSpace::Indexed && palette.is_empty() {
        return Err(ScribeError::resource(format!("missing palette in {name}")));
    }

    let mut info = ImageInfo {
        index: 0,
        width,
        height,
        color_space,
        bits_per_component: bpc,
        filter: ImageFilter::Flate,
        decode_parms: Some(decode_parms),
        palette,
        transparency,
        data: idat,
        soft_mask: None,
    };
    if color_type >= 4 {
        let channels = if color_type == 4 { 1 } else { 3 };
        let (color, alpha) = split_alpha(&info.data, width as usize, height as usize, channels, name)?;
        info.data = zlib(&color)?;
        info.soft_mask = Some(zlib(&alpha)?);
    }
    Ok(info)
}

/// Separates interleaved color+alpha scanlines into two planes, copying each
/// row's filter byte to both.
fn split_alpha(
    compressed: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    name: &str,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut raw = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut raw)
        .map_err(|err| ScribeError::resource(format!("corrupt image data in {name}: {err}")))?;
    let stride = (channels + 1)
        .checked_mul(width)
        .ok_or_else(|| ScribeError::resource(format!("incorrect PNG file: {name}")))?;
    let needed = stride
        .checked_add(1)
        .and_then(|row| row.checked_mul(height))
        .ok_or_else(|| ScribeError::resource(format!("incorrect PNG file: {name}")))?;
    if raw.len() < needed {
        return Err(ScribeError::resource(format!("truncated image data in {name}")));
    }
    let mut color = Vec::with_capacity(needed - width * height);
    let mut alpha = Vec::with_capacity((width + 1) * height);
    for row in raw.chunks_exact(stride + 1).take(height) {
        color.push(row[0]);
        alpha.push(row[0]);
        for pixel in row[1..].chunks_exact(channels + 1) {
            color.extend_from_slice(&pixel[..channels]);
            alpha.push(pixel[channels]);
        }
    }
    Ok((color, alpha))
}

pub(crate) fn zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// First frame only, re-encoded as a non-interlaced PNG.
pub fn parse_gif(data: &[u8], name: &str) -> Result<ImageInfo> {
    let frame = image::load_from_memory_with_format(data, ImageFormat::Gif)
        .map_err(|err| ScribeError::resource(format!("missing or incorrect image file: {name} ({err})")))?;
    let rgba = frame.to_rgba8();
    let (width, height) = rgba.dimensions();
    let opaque = rgba.pixels().all(|p| p.0[3] == 255);

    let mut png = Vec::new();
    let encoder = PngEncoder::new(&mut png);
    let written = if opaque {
        let rgb = frame.to_rgb8();
        encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
    } else {
        encoder.write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
    };
    written.map_err(|err| ScribeError::resource(format!("cannot convert GIF {name}: {err}")))?;
    parse_png(&png, name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};

    pub(crate) fn png_bytes(width: u32, height: u32, pixels: &[u8], color: ExtendedColorType) -> Vec<u8> {
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(pixels, width, height, color)
            .unwrap();
        out
    }

    pub(crate) fn jpeg_header(width: u16, height: u16, channels: u8) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        // APP0 segment to skip.
        out.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x06, b'J', b'F', b'I', b'F']);
        out.extend_from_slice(&[0xFF, 0xC0, 0x00, 8 + 3 * channels as u8, 8]);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.push(channels);
        for c in 0..channels {
            out.extend_from_slice(&[c + 1, 0x11, 0]);
        }
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    fn inflate(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        ZlibDecoder::new(data).read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn detects_kind_from_extension_or_type() {
        assert_eq!(ImageKind::detect("a/b.JPEG", None).unwrap(), ImageKind::Jpeg);
        assert_eq!(ImageKind::detect("logo", Some("PNG")).unwrap(), ImageKind::Png);
        assert!(matches!(
            ImageKind::detect("logo", None),
            Err(ScribeError::Resource(_))
        ));
        assert!(matches!(
            ImageKind::detect("x.bmp", None),
            Err(ScribeError::Resource(_))
        ));
    }

    #[test]
    fn jpeg_frame_header_is_read() {
        let info = parse_jpeg(&jpeg_header(640, 480, 3), "x.jpg").unwrap();
        assert_eq!((info.width, info.height), (640, 480));
        assert_eq!(info.color_space, ColorSpace::DeviceRgb);
        assert_eq!(info.bits_per_component, 8);
        assert_eq!(info.filter, ImageFilter::Dct);

        let cmyk = parse_jpeg(&jpeg_header(10, 20, 4), "x.jpg").unwrap();
        assert_eq!(cmyk.color_space, ColorSpace::DeviceCmyk);
        let gray = parse_jpeg(&jpeg_header(10, 20, 1), "x.jpg").unwrap();
        assert_eq!(gray.color_space, ColorSpace::DeviceGray);
    }

    #[test]
    fn non_jpeg_is_rejected() {
        assert!(matches!(parse_jpeg(b"GIF89a", "x.jpg"), Err(ScribeError::Resource(_))));
        assert!(matches!(
            parse_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00], "x.jpg"),
            Err(ScribeError::Resource(_))
        ));
    }

    #[test]
    fn rgb_png_keeps_compressed_data() {
        let pixels: Vec<u8> = (0..2 * 2 * 3).map(|v| v as u8 * 10).collect();
        let info = parse_png(&png_bytes(2, 2, &pixels, ExtendedColorType::Rgb8), "x.png").unwrap();
        assert_eq!(info.color_space, ColorSpace::DeviceRgb);
        assert_eq!(
            info.decode_parms.as_deref(),
            Some("/Predictor 15 /Colors 3 /BitsPerComponent 8 /Columns 2")
        );
        assert!(info.soft_mask.is_none());
        // Filter byte plus three samples per pixel on each row.
        assert_eq!(inflate(&info.data).len(), 2 * (1 + 2 * 3));
    }

    #[test]
    fn alpha_planes_reinterleave_to_original() {
        let (w, h) = (3u32, 2u32);
        let pixels: Vec<u8> = (0..(w * h * 4)).map(|v| (v * 7 % 251) as u8).collect();
        let info = parse_png(&png_bytes(w, h, &pixels, ExtendedColorType::Rgba8), "a.png").unwrap();
        let color = inflate(&info.data);
        let alpha = inflate(info.soft_mask.as_ref().unwrap());

        let stride_c = 1 + 3 * w as usize;
        let stride_a = 1 + w as usize;
        let mut raw = Vec::new();
        for row in 0..h as usize {
            let c = &color[row * stride_c..(row + 1) * stride_c];
            let a = &alpha[row * stride_a..(row + 1) * stride_a];
            assert_eq!(c[0], a[0]);
            raw.push(c[0]);
            for x in 0..w as usize {
                raw.extend_from_slice(&c[1 + 3 * x..1 + 3 * x + 3]);
                raw.push(a[1 + x]);
            }
        }
        let expected = inflate(&raw_idat(&png_bytes(w, h, &pixels, ExtendedColorType::Rgba8)));
        assert_eq!(raw, expected);
    }

    // Concatenated IDAT payload, read independently of `parse_png`.
    fn raw_idat(png: &[u8]) -> Vec<u8> {
        let mut pos = 8;
        let mut out = Vec::new();
        while pos + 8 <= png.len() {
            let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
            if &png[pos + 4..pos + 8] == b"IDAT" {
                out.extend_from_slice(&png[pos + 8..pos + 8 + len]);
            }
            pos += 12 + len;
        }
        out
    }

    fn chunk(out: &mut Vec<u8>, kind: &[u8], body: &[u8]) {
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(body);
        // CRC is not verified by the parser.
        out.extend_from_slice(&[0, 0, 0, 0]);
    }

    // Hand-built PNG with unfiltered scanlines and optional extra chunks.
    fn raw_png(width: u32, height: u32, color_type: u8, rows: &[u8], extra: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, color_type, 0, 0, 0]);
        chunk(&mut out, b"IHDR", &ihdr);
        for (kind, body) in extra {
            chunk(&mut out, kind, body);
        }
        chunk(&mut out, b"IDAT", &zlib(rows).unwrap());
        chunk(&mut out, b"IEND", &[]);
        out
    }

    #[test]
    fn gray_alpha_png_gets_soft_mask() {
        let rows = [0u8, 10, 255, 20, 0, 0, 30, 128, 40, 64];
        let info = parse_png(&raw_png(2, 2, 4, &rows, &[]), "g.png").unwrap();
        assert_eq!(info.color_space, ColorSpace::DeviceGray);
        assert_eq!(inflate(&info.data), vec![0, 10, 20, 0, 30, 40]);
        assert_eq!(inflate(info.soft_mask.as_ref().unwrap()), vec![0, 255, 0, 0, 128, 64]);
    }

    #[test]
    fn transparency_keys_are_read() {
        let palette = [0u8, 0, 0, 255, 255, 255, 9, 9, 9];
        let alpha = [255u8, 0, 255];
        let png = raw_png(
            2,
            1,
            3,
            &[0, 1, 2],
            &[(&b"PLTE"[..], &palette[..]), (&b"tRNS"[..], &alpha[..])],
        );
        let info = parse_png(&png, "p.png").unwrap();
        assert_eq!(info.color_space, ColorSpace::Indexed);
        assert_eq!(info.palette.len(), 9);
        assert_eq!(info.transparency, Some(vec![1]));

        let key = [0u8, 7, 0, 8, 0, 9];
        let rgb = raw_png(1, 1, 2, &[0, 1, 2, 3], &[(&b"tRNS"[..], &key[..])]);
        assert_eq!(parse_png(&rgb, "r.png").unwrap().transparency, Some(vec![7, 8, 9]));
    }

    #[test]
    fn indexed_png_without_palette_is_rejected() {
        let png = raw_png(1, 1, 3, &[0, 0], &[]);
        assert!(parse_png(&png, "p.png").unwrap_err().to_string().contains("missing palette"));
    }

    #[test]
    fn malformed_png_reports_resource_errors() {
        assert!(matches!(parse_png(b"\x89PNX\r\n\x1a\n", "x.png"), Err(ScribeError::Resource(_))));

        let good = png_bytes(1, 1, &[1, 2, 3], ExtendedColorType::Rgb8);
        let err = parse_png(&good[..20], "x.png").unwrap_err();
        assert!(err.to_string().contains("unexpected end of stream"));

        let mut interlaced = good.clone();
        interlaced[28] = 1;
        assert!(parse_png(&interlaced, "x.png").unwrap_err().to_string().contains("interlacing"));

        let mut deep = good.clone();
        deep[24] = 16;
        assert!(parse_png(&deep, "x.png").unwrap_err().to_string().contains("16-bit"));

        let mut filter = good;
        filter[27] = 1;
        assert!(parse_png(&filter, "x.png").unwrap_err().to_string().contains("filter method"));
    }

    #[test]
    fn oversized_alpha_png_is_a_resource_error() {
        let png = raw_png(0x8000_0000, 0x8000_0000, 6, &[0, 1, 2, 3, 4], &[]);
        let err = parse_png(&png, "huge.png").unwrap_err();
        assert!(matches!(err, ScribeError::Resource(_)));
        assert!(err.to_string().contains("huge.png"));
    }

    #[test]
    fn zero_sized_images_are_rejected() {
        let png = raw_png(0, 1, 2, &[0], &[]);
        assert!(matches!(parse_png(&png, "x.png"), Err(ScribeError::Resource(_))));
        assert!(matches!(
            parse_jpeg(&jpeg_header(0, 10, 3), "x.jpg"),
            Err(ScribeError::Resource(_))
        ));
        assert!(matches!(
            parse_jpeg(&jpeg_header(10, 0, 3), "x.jpg"),
            Err(ScribeError::Resource(_))
        ));
    }

    #[test]
    fn gif_goes_through_png_path() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
        let mut gif = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut gif);
            encoder.encode_frame(Frame::new(img)).unwrap();
        }
        let info = parse_gif(&gif, "x.gif").unwrap();
        assert_eq!((info.width, info.height), (2, 2));
        assert_eq!(info.filter, ImageFilter::Flate);
    }

    #[test]
    fn data_uri_decodes() {
        let png = png_bytes(1, 1, &[9, 9, 9], ExtendedColorType::Rgb8);
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        let (kind, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(kind, ImageKind::Png);
        assert_eq!(bytes, png);
        assert!(decode_data_uri("data:image/png,raw").is_err());
    }

    #[test]
    fn sizes_resolve_from_dpi_and_aspect() {
        let info = parse_jpeg(&jpeg_header(192, 96, 3), "x.jpg").unwrap();
        let (w, h) = resolve_size(&info, 0.0, 0.0, 1.0);
        assert!((w - 144.0).abs() < 1e-9 && (h - 72.0).abs() < 1e-9);
        let (w, h) = resolve_size(&info, 50.0, 0.0, 1.0);
        assert_eq!((w, h), (50.0, 25.0));
        let (w, h) = resolve_size(&info, 0.0, 10.0, 1.0);
        assert_eq!((w, h), (20.0, 10.0));
        let (w, _) = resolve_size(&info, -72.0, 5.0, 2.0);
        assert!((w - 96.0).abs() < 1e-9);
    }

    #[test]
    fn content_keys_are_stable() {
        assert_eq!(content_key(b"abc"), content_key(b"abc"));
        assert_ne!(content_key(b"abc"), content_key(b"abd"));
        assert!(content_key(b"").starts_with("sha256:e3b0c442"));
    }
}
