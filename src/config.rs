use crate::document::{Document, DocumentHooks};
use crate::error::{Result, ScribeError};
use crate::types::{LayoutMode, Margins, Orientation, PageFormat, Unit, ZoomMode};
use chrono::{DateTime, FixedOffset};
use std::path::PathBuf;

/// Environment variable naming the default font definition directory.
pub const FONT_PATH_ENV: &str = "PDFSCRIBE_FONTPATH";

/// Configures and creates a [`Document`].
pub struct DocumentBuilder {
    orientation: Orientation,
    unit: Unit,
    format: PageFormat,
    margins: Option<Margins>,
    auto_page_break: Option<(bool, f64)>,
    compression: bool,
    font_path: Option<PathBuf>,
    creation_date: Option<DateTime<FixedOffset>>,
    zoom: ZoomMode,
    layout: LayoutMode,
    alias_nb_pages: Option<String>,
    hooks: Option<Box<dyn DocumentHooks>>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            orientation: Orientation::Portrait,
            unit: Unit::Millimeter,
            format: PageFormat::A4,
            margins: None,
            auto_page_break: None,
            compression: true,
            font_path: std::env::var_os(FONT_PATH_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            creation_date: None,
            zoom: ZoomMode::Default,
            layout: LayoutMode::Default,
            alias_nb_pages: None,
            hooks: None,
        }
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.format = format;
        self
    }

    /// Left, top and right margins in user units; the bottom margin is the
    /// auto page break margin.
    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = Some(margins);
        self
    }

    pub fn auto_page_break(mut self, enabled: bool, margin: f64) -> Self {
        self.auto_page_break = Some((enabled, margin));
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn creation_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.creation_date = Some(date);
        self
    }

    pub fn display_mode(mut self, zoom: ZoomMode, layout: LayoutMode) -> Self {
        self.zoom = zoom;
        self.layout = layout;
        self
    }

    pub fn alias_nb_pages(mut self, alias: impl Into<String>) -> Self {
        self.alias_nb_pages = Some(alias.into());
        self
    }

    pub fn hooks(mut self, hooks: Box<dyn DocumentHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn build(self) -> Result<Document> {
        if let Some(path) = &self.font_path {
            if !path.is_dir() {
                return Err(ScribeError::config(format!(
                    "font directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if let ZoomMode::Percent(zoom) = self.zoom {
            if !zoom.is_finite() || zoom <= 0.0 {
                return Err(ScribeError::config(format!("incorrect zoom display mode: {zoom}")));
            }
        }
        let mut doc = Document::with_font_path(
            self.orientation,
            self.unit,
            self.format,
            self.font_path,
        )?;
        if let Some(margins) = self.margins {
            doc.set_margins(margins.left, margins.top, Some(margins.right));
            doc.set_auto_page_break(true, margins.bottom);
        }
        if let Some((enabled, margin)) = self.auto_page_break {
            doc.set_auto_page_break(enabled, margin);
        }
        doc.set_compression(self.compression);
        doc.set_display_mode(self.zoom, self.layout);
        if let Some(date) = self.creation_date {
            doc.set_creation_date(date);
        }
        if let Some(alias) = &self.alias_nb_pages {
            doc.alias_nb_pages(alias);
        }
        if let Some(hooks) = self.hooks {
            doc.set_hooks(hooks);
        }
        Ok(doc)
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_settings() {
        let doc = DocumentBuilder::new()
            .orientation(Orientation::Landscape)
            .unit(Unit::Point)
            .page_format(PageFormat::Letter)
            .margins(Margins {
                left: 20.0,
                top: 30.0,
                right: 40.0,
                bottom: 50.0,
            })
            .compression(false)
            .build()
            .unwrap();
        assert_eq!(doc.page_width(), 792.0);
        assert_eq!(doc.page_height(), 612.0);
        assert_eq!(doc.left_margin(), 20.0);
        assert_eq!(doc.right_margin(), 40.0);
        assert_eq!(doc.bottom_margin(), 50.0);
        assert!(doc.auto_page_break());
    }

    #[test]
    fn uniform_margins_apply_to_every_side() {
        let doc = DocumentBuilder::new()
            .unit(Unit::Point)
            .margins(Margins::all(36.0))
            .build()
            .unwrap();
        assert_eq!(doc.left_margin(), 36.0);
        assert_eq!(doc.top_margin(), 36.0);
        assert_eq!(doc.right_margin(), 36.0);
        assert_eq!(doc.bottom_margin(), 36.0);
    }

    #[test]
    fn missing_font_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = DocumentBuilder::new()
            .font_path(dir.path().join("nope"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ScribeError::Configuration(_)));
    }

    #[test]
    fn font_directory_is_used_for_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentBuilder::new().font_path(dir.path()).build().unwrap();
        assert_eq!(doc.fonts().font_path(), Some(dir.path()));
    }

    #[test]
    fn invalid_zoom_is_rejected() {
        let result = DocumentBuilder::new()
            .display_mode(ZoomMode::Percent(-5.0), LayoutMode::Default)
            .build();
        assert!(matches!(result, Err(ScribeError::Configuration(_))));
    }
}
