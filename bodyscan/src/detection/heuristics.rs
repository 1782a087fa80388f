//! Image heuristics for the non-native detection strategies.
//!
//! These are cheap pixel-level analyses, not a pose model: grayscale
//! conversion, two edge operators, connected-component labelling and a
//! skin-tone mask. Per-pixel work is spread across rows with rayon.

use image::{GrayImage, Luma, RgbaImage};
use rayon::prelude::*;

use super::landmarks::BoundingBox;
use super::types::DetectionError;

/// Edge magnitude a pixel must exceed to belong to a contour.
pub const EDGE_THRESHOLD: u8 = 128;

/// Contours with this many pixels or fewer are noise.
pub const MIN_CONTOUR_PIXELS: usize = 10;

/// Thresholds for a contour to count as a human silhouette.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeFilter {
    pub min_area: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_perimeter: usize,
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self {
            min_area: 1000.0,
            min_aspect: 0.3,
            max_aspect: 3.0,
            min_perimeter: 100,
        }
    }
}

/// A connected set of "on" pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub pixel_count: usize,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl Region {
    fn seed(x: u32, y: u32) -> Self {
        Self {
            pixel_count: 0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.pixel_count += 1;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x as f64,
            self.min_y as f64,
            self.width() as f64,
            self.height() as f64,
        )
    }

    /// Whether this edge contour plausibly outlines a person.
    ///
    /// For an edge contour the pixel count approximates its perimeter.
    pub fn is_human_shape(&self, filter: &ShapeFilter) -> bool {
        let aspect = self.width() as f64 / self.height() as f64;
        self.bounding_box().area() > filter.min_area
            && (filter.min_aspect..=filter.max_aspect).contains(&aspect)
            && self.pixel_count > filter.min_perimeter
    }
}

/// Luma conversion with the BT.601 weights.
pub fn grayscale(image: &RgbaImage) -> Result<GrayImage, DetectionError> {
    let (width, height) = image.dimensions();
    let luma: Vec<u8> = image
        .as_raw()
        .par_chunks_exact(4)
        .map(|px| {
            let value = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
            value.round().min(255.0) as u8
        })
        .collect();

    GrayImage::from_raw(width, height, luma)
        .ok_or_else(|| DetectionError::InvalidFrame("grayscale buffer size mismatch".to_string()))
}

/// Forward-difference gradient magnitude (|dx| + |dy|).
pub fn gradient_edges(gray: &GrayImage) -> GrayImage {
    edge_map(gray, |gray, x, y| {
        let center = gray.get_pixel(x, y)[0] as i32;
        let right = gray.get_pixel(x + 1, y)[0] as i32;
        let below = gray.get_pixel(x, y + 1)[0] as i32;
        ((right - center).abs() + (below - center).abs()) as f64
    })
}

/// Sobel gradient magnitude.
pub fn sobel_edges(gray: &GrayImage) -> GrayImage {
    edge_map(gray, |gray, x, y| {
        let p = |dx: i32, dy: i32| {
            gray.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f64
        };
        let gx = -p(-1, -1) - 2.0 * p(-1, 0) - p(-1, 1) + p(1, -1) + 2.0 * p(1, 0) + p(1, 1);
        let gy = -p(-1, -1) - 2.0 * p(0, -1) - p(1, -1) + p(-1, 1) + 2.0 * p(0, 1) + p(1, 1);
        (gx * gx + gy * gy).sqrt()
    })
}

/// Apply an edge operator to every interior pixel; the 1px border is zero.
fn edge_map<F>(gray: &GrayImage, operator: F) -> GrayImage
where
    F: Fn(&GrayImage, u32, u32) -> f64 + Sync,
{
    let (width, height) = gray.dimensions();
    let mut out = GrayImage::new(width, height);
    if width < 3 || height < 3 {
        return out;
    }

    let rows: Vec<Vec<u8>> = (1..height - 1)
        .into_par_iter()
        .map(|y| {
            (1..width - 1)
                .map(|x| operator(gray, x, y).min(255.0) as u8)
                .collect()
        })
        .collect();

    for (row_index, row) in rows.into_iter().enumerate() {
        let y = row_index as u32 + 1;
        for (col_index, value) in row.into_iter().enumerate() {
            out.put_pixel(col_index as u32 + 1, y, Luma([value]));
        }
    }
    out
}

/// Label 8-connected regions of pixels for which `is_on` holds.
///
/// Regions with `min_pixels` or fewer pixels are dropped.
pub fn connected_regions<F>(width: u32, height: u32, min_pixels: usize, is_on: F) -> Vec<Region>
where
    F: Fn(u32, u32) -> bool,
{
    let mut visited = vec![false; (width as usize) * (height as usize)];
    let index = |x: u32, y: u32| (y as usize) * (width as usize) + x as usize;
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for y in 0..height {
        for x in 0..width {
            if visited[index(x, y)] || !is_on(x, y) {
                continue;
            }

            let mut region = Region::seed(x, y);
            visited[index(x, y)] = true;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                region.include(cx, cy);
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = cx as i64 + dx;
                        let ny = cy as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        if !visited[index(nx, ny)] && is_on(nx, ny) {
                            visited[index(nx, ny)] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            if region.pixel_count > min_pixels {
                regions.push(region);
            }
        }
    }

    regions
}

/// Contours in an edge map.
pub fn find_contours(edges: &GrayImage) -> Vec<Region> {
    let (width, height) = edges.dimensions();
    connected_regions(width, height, MIN_CONTOUR_PIXELS, |x, y| {
        edges.get_pixel(x, y)[0] > EDGE_THRESHOLD
    })
}

/// RGB skin-tone rule.
pub fn is_skin_tone(r: u8, g: u8, b: u8) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95 && g > 40 && b > 20 && max - min > 15 && r.abs_diff(g) > 15 && r > g && r > b
}

/// Connected skin-tone blobs larger than `min_pixels`.
pub fn skin_regions(image: &RgbaImage, min_pixels: usize) -> Vec<Region> {
    let (width, height) = image.dimensions();
    connected_regions(width, height, min_pixels, |x, y| {
        let px = image.get_pixel(x, y);
        is_skin_tone(px[0], px[1], px[2])
    })
}

/// Largest region by bounding-box area.
pub fn largest(regions: &[Region]) -> Option<&Region> {
    regions.iter().max_by(|a, b| {
        a.bounding_box()
            .area()
            .partial_cmp(&b.bounding_box().area())
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;

    /// Dark frame with a bright filled rectangle.
    pub(crate) fn frame_with_rect(
        width: u32,
        height: u32,
        rect: (u32, u32, u32, u32),
        color: [u8; 3],
    ) -> RgbaImage {
        let (rx, ry, rw, rh) = rect;
        RgbaImage::from_fn(width, height, |x, y| {
            if x >= rx && x < rx + rw && y >= ry && y < ry + rh {
                Rgba([color[0], color[1], color[2], 255])
            } else {
                Rgba([10, 10, 10, 255])
            }
        })
    }

    #[test]
    fn test_grayscale_weights() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let gray = grayscale(&img).unwrap();
        assert_eq!(gray.get_pixel(0, 0)[0], 76);

        let img = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255]));
        assert_eq!(grayscale(&img).unwrap().get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn test_uniform_frame_has_no_edges() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([120, 120, 120, 255]));
        let gray = grayscale(&img).unwrap();
        assert!(find_contours(&gradient_edges(&gray)).is_empty());
        assert!(find_contours(&sobel_edges(&gray)).is_empty());
    }

    #[test]
    fn test_rectangle_outline_is_one_human_shape() {
        let img = frame_with_rect(200, 200, (60, 20, 60, 150), [250, 250, 250]);
        let gray = grayscale(&img).unwrap();
        let contours = find_contours(&sobel_edges(&gray));
        assert!(!contours.is_empty());

        let outline = largest(&contours).unwrap();
        assert!(outline.is_human_shape(&ShapeFilter::default()));
        assert!(outline.width() >= 60 && outline.height() >= 150);
    }

    #[test]
    fn test_small_blob_is_not_human() {
        let img = frame_with_rect(100, 100, (40, 40, 8, 8), [250, 250, 250]);
        let gray = grayscale(&img).unwrap();
        let contours = find_contours(&sobel_edges(&gray));
        assert!(contours
            .iter()
            .all(|c| !c.is_human_shape(&ShapeFilter::default())));
    }

    #[test]
    fn test_skin_tone_rule() {
        assert!(is_skin_tone(200, 140, 110));
        assert!(!is_skin_tone(80, 60, 50));
        assert!(!is_skin_tone(120, 120, 120));
    }

    #[test]
    fn test_skin_regions() {
        let img = frame_with_rect(100, 100, (10, 10, 20, 30), [200, 140, 110]);
        let regions = skin_regions(&img, 50);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].pixel_count, 600);
        assert_eq!(regions[0].bounding_box(), BoundingBox::new(10.0, 10.0, 20.0, 30.0));
    }

    #[test]
    fn test_connected_regions_separates_blobs() {
        let on = |x: u32, _y: u32| x < 5 || x > 10;
        let regions = connected_regions(16, 4, 0, on);
        assert_eq!(regions.len(), 2);
    }
}
