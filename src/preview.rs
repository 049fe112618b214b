// Terminal previews of preloaded media using half-block characters

use crate::error::{FeedError, Result};
use image::{DynamicImage, GenericImageView, Pixel};
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Rendered previews kept around for quick back-and-forth swiping
pub const PREVIEW_CACHE_SIZE: usize = 16;

/// Bound on remembered undecodable URLs; the set is dropped when full
const UNDECODABLE_LIMIT: usize = 256;

/// Decodes preloaded image bytes, sniffing the format from the content
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| FeedError::InvalidItem(format!("Undecodable image: {}", e)))
}

/// Fits `original` into `max` preserving aspect ratio, never upscaling
pub fn calculate_resize_dimensions(
    original_width: u32,
    original_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    if original_width == 0 || original_height == 0 {
        return (0, 0);
    }

    let width_ratio = max_width as f64 / original_width as f64;
    let height_ratio = max_height as f64 / original_height as f64;
    let ratio = width_ratio.min(height_ratio);

    if ratio >= 1.0 {
        (original_width, original_height)
    } else {
        let new_width = (original_width as f64 * ratio) as u32;
        let new_height = (original_height as f64 * ratio) as u32;
        (new_width, new_height)
    }
}

/// Converts an image to styled lines, two pixels per cell: the upper half
/// block (▀) takes the upper pixel as foreground and the lower as background.
pub fn image_to_halfblock_lines(img: &DynamicImage, width: u32, height: u32) -> Vec<Line<'static>> {
    let height = if height % 2 == 0 { height } else { height + 1 };

    // Triangle keeps large photos fast enough to resize per frame
    let img = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
    let img = img.to_rgb8();

    let term_height = height / 2;
    let mut lines = Vec::with_capacity(term_height as usize);

    for y in 0..term_height {
        let upper_y = y * 2;
        let lower_y = upper_y + 1;
        let mut spans = Vec::with_capacity(width as usize);

        for x in 0..width {
            let upper = img.get_pixel(x, upper_y).to_rgb();
            let lower = if lower_y < height {
                img.get_pixel(x, lower_y).to_rgb()
            } else {
                upper
            };

            let style = Style::default()
                .fg(Color::Rgb(upper[0], upper[1], upper[2]))
                .bg(Color::Rgb(lower[0], lower[1], lower[2]));
            spans.push(Span::styled("▀", style));
        }

        lines.push(Line::from(spans));
    }

    lines
}

/// Decodes `bytes` and renders them to fit `columns` x `rows` terminal cells
pub fn render_preview(bytes: &[u8], columns: u16, rows: u16) -> Result<Vec<Line<'static>>> {
    let img = decode_image(bytes)?;
    let (original_width, original_height) = img.dimensions();
    let (width, height) = calculate_resize_dimensions(
        original_width,
        original_height,
        u32::from(columns),
        u32::from(rows) * 2,
    );

    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }
    Ok(image_to_halfblock_lines(&img, width, height))
}

/// LRU of rendered previews keyed by media URL and target size
#[derive(Debug)]
pub struct RenderedImageCache {
    entries: HashMap<(String, u16, u16), Vec<Line<'static>>>,
    /// Most recent at the end
    access_order: Vec<(String, u16, u16)>,
    max_size: usize,
    /// URLs whose bytes failed to decode, at any size
    undecodable: HashSet<String>,
}

impl RenderedImageCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            access_order: Vec::new(),
            max_size: max_size.max(1),
            undecodable: HashSet::new(),
        }
    }

    /// Returns the cached rendering or renders `bytes` and caches it.
    ///
    /// A URL that fails to decode is logged once and then skipped until
    /// [`clear`](Self::clear).
    pub fn get_or_render(
        &mut self,
        url: &str,
        bytes: &[u8],
        columns: u16,
        rows: u16,
    ) -> Option<Vec<Line<'static>>> {
        let key = (url.to_string(), columns, rows);
        if let Some(lines) = self.entries.get(&key) {
            let lines = lines.clone();
            self.touch(&key);
            return Some(lines);
        }
        if self.undecodable.contains(url) {
            return None;
        }

        match render_preview(bytes, columns, rows) {
            Ok(lines) => {
                self.insert(key, lines.clone());
                Some(lines)
            }
            Err(e) => {
                warn!(%url, error = %e, "preview failed");
                if self.undecodable.len() >= UNDECODABLE_LIMIT {
                    self.undecodable.clear();
                }
                self.undecodable.insert(url.to_string());
                None
            }
        }
    }

    pub fn is_undecodable(&self, url: &str) -> bool {
        self.undecodable.contains(url)
    }

    fn touch(&mut self, key: &(String, u16, u16)) {
        self.access_order.retain(|k| k != key);
        self.access_order.push(key.clone());
    }

    fn insert(&mut self, key: (String, u16, u16), lines: Vec<Line<'static>>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            if let Some(oldest) = self.access_order.first().cloned() {
                self.entries.remove(&oldest);
                self.access_order.remove(0);
            }
        }
        self.entries.insert(key.clone(), lines);
        self.touch(&key);
    }

    pub fn contains(&self, url: &str, columns: u16, rows: u16) -> bool {
        self.entries.contains_key(&(url.to_string(), columns, rows))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_order.clear();
        self.undecodable.clear();
    }
}
