use image::RgbaImage;

use crate::color::Color;

use super::layout::RasterGeometry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplePolicy {
    /// Single pixel at the cell center.
    Center,
    /// Alpha-weighted average over the cell's pixel region.
    #[default]
    Area,
}

/// One output cell's worth of raster: straight (non-premultiplied) color plus coverage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    pub color: Color,
    pub alpha: u8,
}

impl Sample {
    pub const EMPTY: Sample = Sample { color: Color::BLACK, alpha: 0 };

    pub fn opaque(color: Color) -> Self {
        Self { color, alpha: u8::MAX }
    }
}

/// Samples `image` once per cell, row-major.
pub fn sample_cells(image: &RgbaImage, geometry: RasterGeometry, policy: SamplePolicy) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(usize::from(geometry.columns) * usize::from(geometry.rows));
    for row in 0..geometry.rows {
        for column in 0..geometry.columns {
            let sample = match policy {
                SamplePolicy::Center => {
                    let (x, y) = geometry.cell_center(column, row);
                    let [r, g, b, a] = image.get_pixel(x, y).0;
                    Sample { color: Color::new(r, g, b), alpha: a }
                },
                SamplePolicy::Area => average(image, geometry.cell_region(column, row)),
            };
            samples.push(sample);
        }
    }
    samples
}

fn average(image: &RgbaImage, ((x0, x1), (y0, y1)): ((u32, u32), (u32, u32))) -> Sample {
    let mut weight = 0u64;
    let mut sums = [0u64; 3];
    let mut count = 0u64;

    for y in y0..y1 {
        for x in x0..x1 {
            let [r, g, b, a] = image.get_pixel(x, y).0;
            let a = u64::from(a);
            weight += a;
            sums[0] += u64::from(r) * a;
            sums[1] += u64::from(g) * a;
            sums[2] += u64::from(b) * a;
            count += 1;
        }
    }

    if weight == 0 || count == 0 {
        return Sample::EMPTY;
    }

    let channel = |sum: u64| ((sum + weight / 2) / weight) as u8;
    Sample {
        color: Color::new(channel(sums[0]), channel(sums[1]), channel(sums[2])),
        alpha: ((weight + count / 2) / count) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn area_average_ignores_transparent_color() {
        let mut image = RgbaImage::new(4, 2);
        image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        image.put_pixel(0, 1, Rgba([0, 0, 255, 0]));
        image.put_pixel(1, 1, Rgba([0, 0, 255, 0]));

        let geometry = RasterGeometry::derive(2, 1, 2.0).unwrap();
        let samples = sample_cells(&image, geometry, SamplePolicy::Area);

        assert_eq!(samples[0], Sample { color: Color::new(255, 0, 0), alpha: 128 });
        assert_eq!(samples[1], Sample::EMPTY);
    }

    #[test]
    fn center_sample_reads_one_pixel() {
        let mut image = RgbaImage::new(4, 4);
        image.put_pixel(2, 2, Rgba([0, 255, 0, 255]));

        let geometry = RasterGeometry::derive(1, 1, 4.0).unwrap();
        let samples = sample_cells(&image, geometry, SamplePolicy::Center);
        assert_eq!(samples, vec![Sample::opaque(Color::new(0, 255, 0))]);
    }
}
