use image::{Rgba, RgbaImage};

use crate::color::Color;
use crate::element::{Element, Shape};
use crate::glyph::GlyphSource;

use super::layout::RasterGeometry;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot derive a raster for {columns}x{rows} cells at scale {scale}")]
    InvalidGeometry { columns: u16, rows: u16, scale: f32 },
    #[error("scene renderer failed: {0}")]
    Backend(String),
}

/// Borrowed view of everything needed to draw the current scene.
#[derive(Clone, Copy)]
pub struct Scene<'a> {
    pub elements: &'a [Element],
    pub glyphs: &'a dyn GlyphSource,
}

/// Produces the high-resolution raster the preview is sampled from.
pub trait SceneRenderer {
    fn render(&mut self, scene: Scene<'_>, geometry: RasterGeometry)
        -> Result<RgbaImage, RenderError>;
}

/// Renders elements as continuous shapes over a transparent background.
///
/// Rectangles and glyph bits stay cell aligned; circles are evaluated per pixel, which
/// gives them softer edges than the canonical grid once the raster is averaged down.
#[derive(Clone, Copy, Debug, Default)]
pub struct VectorRenderer;

impl SceneRenderer for VectorRenderer {
    fn render(
        &mut self,
        scene: Scene<'_>,
        geometry: RasterGeometry,
    ) -> Result<RgbaImage, RenderError> {
        let mut image = RgbaImage::new(geometry.width, geometry.height);

        for element in scene.elements {
            let pixel = opaque(element.color);
            match element.shape {
                Shape::Rectangle { x, y, w, h } => {
                    let left = f64::from(x) - 1.0;
                    let top = f64::from(y) - 1.0;
                    fill_cells(
                        &mut image,
                        geometry,
                        (left, top),
                        (left + f64::from(w), top + f64::from(h)),
                        pixel,
                    );
                },
                Shape::Circle { cx, cy, r } => {
                    fill_disc(&mut image, geometry, (cx, cy), r, pixel);
                },
                Shape::Text { ref text, x, y, .. } => {
                    let top = f64::from(y) - 1.0;
                    let mut left = f64::from(x) - 1.0;
                    for ch in text.chars() {
                        let Some(glyph) = scene.glyphs.glyph_for(ch) else {
                            continue;
                        };
                        for (dc, dr) in glyph.set_cells() {
                            let cell_left = left + dc as f64;
                            let cell_top = top + dr as f64;
                            fill_cells(
                                &mut image,
                                geometry,
                                (cell_left, cell_top),
                                (cell_left + 1.0, cell_top + 1.0),
                                pixel,
                            );
                        }
                        left += glyph.width() as f64;
                    }
                },
            }
        }

        Ok(image)
    }
}

fn opaque(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, u8::MAX])
}

/// Fills the pixels whose centers fall inside the cell-space box `[min, max)`.
fn fill_cells(
    image: &mut RgbaImage,
    geometry: RasterGeometry,
    min: (f64, f64),
    max: (f64, f64),
    pixel: Rgba<u8>,
) {
    let sx = f64::from(geometry.scale_x());
    let sy = f64::from(geometry.scale_y());
    let x0 = pixel_start(min.0, sx);
    let x1 = pixel_end(max.0, sx, geometry.width);
    let y0 = pixel_start(min.1, sy);
    let y1 = pixel_end(max.1, sy, geometry.height);

    for py in y0..y1 {
        for px in x0..x1 {
            image.put_pixel(px, py, pixel);
        }
    }
}

/// Disc of radius `r + 0.5` around the center of the 1-indexed cell, so a zero radius still
/// covers its own cell.
fn fill_disc(
    image: &mut RgbaImage,
    geometry: RasterGeometry,
    (cx, cy): (u32, u32),
    r: u32,
    pixel: Rgba<u8>,
) {
    let center_x = f64::from(cx) - 0.5;
    let center_y = f64::from(cy) - 0.5;
    let radius = f64::from(r) + 0.5;
    let radius_sq = radius * radius;

    let sx = f64::from(geometry.scale_x());
    let sy = f64::from(geometry.scale_y());
    let x0 = pixel_start(center_x - radius, sx);
    let x1 = pixel_end(center_x + radius, sx, geometry.width);
    let y0 = pixel_start(center_y - radius, sy);
    let y1 = pixel_end(center_y + radius, sy, geometry.height);

    for py in y0..y1 {
        let dy = (f64::from(py) + 0.5) / sy - center_y;
        for px in x0..x1 {
            let dx = (f64::from(px) + 0.5) / sx - center_x;
            if dx * dx + dy * dy <= radius_sq {
                image.put_pixel(px, py, pixel);
            }
        }
    }
}

/// First pixel whose center is at or past cell-space `edge`.
fn pixel_start(edge: f64, scale: f64) -> u32 {
    (edge * scale - 0.5).ceil().max(0.0) as u32
}

/// One past the last pixel whose center is before cell-space `edge`.
fn pixel_end(edge: f64, scale: f64, limit: u32) -> u32 {
    ((edge * scale - 0.5).ceil().max(0.0) as u32).min(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementList;
    use crate::glyph::NoGlyphs;

    const RED: Color = Color::new(255, 0, 0);

    fn render(elements: &ElementList, scale: f32) -> RgbaImage {
        let geometry = RasterGeometry::derive(8, 8, scale).unwrap();
        let scene = Scene { elements: elements.as_slice(), glyphs: &NoGlyphs };
        VectorRenderer.render(scene, geometry).unwrap()
    }

    #[test]
    fn rectangle_covers_whole_cells() {
        let mut elements = ElementList::new();
        elements.add(Shape::Rectangle { x: 2, y: 2, w: 2, h: 1 }, RED);
        let image = render(&elements, 4.0);

        assert_eq!(image.get_pixel(4, 4).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(11, 7).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(12, 4).0[3], 0);
        assert_eq!(image.get_pixel(4, 8).0[3], 0);
        assert_eq!(image.get_pixel(3, 4).0[3], 0);
    }

    #[test]
    fn background_is_transparent() {
        let image = render(&ElementList::new(), 2.0);
        assert!(image.pixels().all(|pixel| pixel.0[3] == 0));
    }

    #[test]
    fn zero_radius_circle_covers_its_cell_center() {
        let mut elements = ElementList::new();
        elements.add(Shape::Circle { cx: 4, cy: 4, r: 0 }, RED);
        let image = render(&elements, 4.0);

        assert_eq!(image.get_pixel(14, 14).0[3], 255);
        assert_eq!(image.get_pixel(20, 14).0[3], 0);
    }
}
