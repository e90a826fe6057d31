#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub object_number: usize,
    /// Uncompressed content-stream size, after page-count substitution.
    pub content_bytes: usize,
    pub link_count: usize,
}

/// Summary of a closed document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub object_count: usize,
    pub font_count: usize,
    pub image_count: usize,
    pub total_bytes: usize,
    pub write_ms: f64,
}

impl DocumentMetrics {
    pub fn content_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.content_bytes).sum()
    }
}
