mod canvas;
mod config;
mod document;
mod error;
mod font;
mod images;
mod layout;
mod metrics;
mod output;
mod pdf;
mod types;

pub use config::{DocumentBuilder, FONT_PATH_ENV};
pub use document::{DocState, Document, DocumentHooks, ImagePlacement, PageRecord};
pub use error::{Result, ScribeError};
pub use font::{
    FontDefinition, FontDescriptor, FontRegistry, FontType, RegisteredFont, UnicodeMapping,
};
pub use images::{
    ColorSpace, ImageFilter, ImageInfo, ImageKind, parse_gif, parse_jpeg, parse_png, resolve_size,
};
pub use layout::CellOptions;
pub use metrics::{DocumentMetrics, PageMetrics};
pub use output::{DEFAULT_FILE_NAME, Destination, MemorySink, OutputSink, StdoutSink};
pub use types::{
    Align, Border, Color, LayoutMode, LineBreak, LinkId, LinkTarget, Margins, Orientation,
    PageFormat, PdfVersion, RectStyle, Size, Unit, ZoomMode,
};

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn report(title: &str, rows: usize) -> Result<Vec<u8>> {
        let mut doc = DocumentBuilder::new().compression(false).build()?;
        doc.set_title(title);
        doc.alias_nb_pages("{nb}");
        doc.add_page()?;
        doc.set_font("Times", "B", 16.0)?;
        doc.cell(0.0, 10.0, title, &CellOptions::default().ln(LineBreak::NextLine))?;
        doc.set_font("Times", "", 11.0)?;
        for row in 0..rows {
            let text = format!("Row {row} of a report that wraps across the page width. ");
            doc.multi_cell(0.0, 5.0, &text.repeat(3), Border::None, Align::Justify, false)?;
        }
        doc.output_bytes()
    }

    #[test]
    fn independent_documents_build_in_parallel() {
        let outputs: Vec<Vec<u8>> = (0..8)
            .into_par_iter()
            .map(|i| report(&format!("Report {i}"), 20 + i).unwrap())
            .collect();
        for (i, bytes) in outputs.iter().enumerate() {
            assert!(bytes.starts_with(b"%PDF-1.3"));
            assert!(bytes.ends_with(b"%%EOF"));
            let title = format!("/Title (Report {i})");
            assert!(bytes.windows(title.len()).any(|w| w == title.as_bytes()));
        }
    }

    #[test]
    fn repeated_builds_differ_only_in_timestamp() {
        let date = chrono::DateTime::parse_from_rfc3339("2025-01-01T00:00:00+00:00").unwrap();
        let build = || {
            let mut doc = DocumentBuilder::new().creation_date(date).build().unwrap();
            doc.add_page().unwrap();
            doc.set_font("Courier", "", 10.0).unwrap();
            doc.write(5.0, "deterministic", None).unwrap();
            doc.output_bytes().unwrap()
        };
        assert_eq!(build(), build());
    }
}
