pub mod layout;
pub mod quantize;
pub mod refresh;
pub mod render;
pub mod sample;

use log::{debug, warn};

use crate::color::Color;
use crate::compositor::Compositor;
use crate::grid::RasterTarget;

use layout::RasterGeometry;
use quantize::{PreviewGrid, Quantizer, Thresholds};
use render::{RenderError, Scene, SceneRenderer, VectorRenderer};
use sample::{Sample, SamplePolicy};

/// Consecutive fallbacks tolerated before the degraded render path is reported.
const FALLBACK_WARN_AFTER: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreviewOptions {
    /// Intermediate raster pixels per output cell; at least 1, need not be whole.
    pub scale: f32,
    pub sampling: SamplePolicy,
    pub thresholds: Thresholds,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self { scale: 4.0, sampling: SamplePolicy::Area, thresholds: Thresholds::default() }
    }
}

#[derive(Clone, Debug)]
pub struct PreviewOutput {
    pub grid: PreviewGrid,
    /// Raster the grid was sampled from, `None` when the geometric fallback was used.
    pub geometry: Option<RasterGeometry>,
}

impl PreviewOutput {
    pub fn used_fallback(&self) -> bool {
        self.geometry.is_none()
    }
}

/// Reduces a scene to the fixed preview grid: render high-res, sample per cell, quantize.
pub struct Downsampler<R = VectorRenderer> {
    renderer: R,
    options: PreviewOptions,
    consecutive_fallbacks: u32,
}

impl Downsampler<VectorRenderer> {
    pub fn new(options: PreviewOptions) -> Self {
        Self::with_renderer(VectorRenderer, options)
    }
}

impl<R: SceneRenderer> Downsampler<R> {
    pub fn with_renderer(renderer: R, options: PreviewOptions) -> Self {
        Self { renderer, options, consecutive_fallbacks: 0 }
    }

    pub fn options(&self) -> PreviewOptions {
        self.options
    }

    pub fn set_options(&mut self, options: PreviewOptions) {
        self.options = options;
    }

    pub fn consecutive_fallbacks(&self) -> u32 {
        self.consecutive_fallbacks
    }

    pub fn downsample(&mut self, scene: Scene<'_>, columns: u16, rows: u16) -> PreviewOutput {
        let quantizer = Quantizer::new(self.options.thresholds);

        match self.render(scene, columns, rows) {
            Ok((image, geometry)) => {
                self.consecutive_fallbacks = 0;
                let samples = sample::sample_cells(&image, geometry, self.options.sampling);
                let grid = quantizer.map_samples(&samples, columns, rows);
                PreviewOutput { grid, geometry: Some(geometry) }
            },
            Err(err) => {
                self.consecutive_fallbacks += 1;
                if self.consecutive_fallbacks == FALLBACK_WARN_AFTER {
                    warn!("preview render keeps failing, using direct rasterization: {err}");
                } else {
                    debug!("preview render failed, using direct rasterization: {err}");
                }

                let samples = rasterize_cells(scene, columns, rows);
                PreviewOutput { grid: quantizer.map_samples(&samples, columns, rows), geometry: None }
            },
        }
    }

    fn render(
        &mut self,
        scene: Scene<'_>,
        columns: u16,
        rows: u16,
    ) -> Result<(image::RgbaImage, RasterGeometry), RenderError> {
        let scale = self.options.scale;
        let geometry = RasterGeometry::derive(columns, rows, scale)
            .ok_or(RenderError::InvalidGeometry { columns, rows, scale })?;

        let image = self.renderer.render(scene, geometry)?;
        if image.dimensions() != (geometry.width, geometry.height) {
            return Err(RenderError::Backend(format!(
                "expected {}x{} raster, got {}x{}",
                geometry.width,
                geometry.height,
                image.width(),
                image.height()
            )));
        }

        Ok((image, geometry))
    }
}

/// Direct cell-space rasterization with the compositor's rules, one opaque sample per
/// painted cell.
fn rasterize_cells(scene: Scene<'_>, columns: u16, rows: u16) -> Vec<Sample> {
    let mut canvas = SampleCanvas {
        width: columns,
        height: rows,
        samples: vec![Sample::EMPTY; usize::from(columns) * usize::from(rows)],
    };
    Compositor::new(scene.glyphs).draw_all(scene.elements, &mut canvas);
    canvas.samples
}

struct SampleCanvas {
    width: u16,
    height: u16,
    samples: Vec<Sample>,
}

impl RasterTarget for SampleCanvas {
    fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn put(&mut self, column: u16, row: u16, color: Color) {
        let index = usize::from(row) * usize::from(self.width) + usize::from(column);
        self.samples[index] = Sample::opaque(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementList, Shape};
    use crate::glyph::NoGlyphs;
    use quantize::{ColorBucket, PreviewCell};

    struct FailingRenderer;

    impl SceneRenderer for FailingRenderer {
        fn render(
            &mut self,
            _scene: Scene<'_>,
            _geometry: RasterGeometry,
        ) -> Result<image::RgbaImage, RenderError> {
            Err(RenderError::Backend("no surface".into()))
        }
    }

    fn scene_elements() -> ElementList {
        let mut elements = ElementList::new();
        elements.add(Shape::Rectangle { x: 2, y: 2, w: 3, h: 2 }, Color::new(255, 140, 0));
        elements.add(Shape::Rectangle { x: 6, y: 1, w: 1, h: 1 }, Color::new(20, 20, 20));
        elements
    }

    #[test]
    fn cell_aligned_shapes_survive_downsampling() {
        let elements = scene_elements();
        let scene = Scene { elements: elements.as_slice(), glyphs: &NoGlyphs };

        for sampling in [SamplePolicy::Area, SamplePolicy::Center] {
            for scale in [1.0, 3.0, 2.5] {
                let options = PreviewOptions { scale, sampling, ..PreviewOptions::default() };
                let output = Downsampler::new(options).downsample(scene, 8, 4);
                assert!(!output.used_fallback());

                let orange = PreviewCell::Bucket(ColorBucket::Orange);
                assert_eq!(output.grid.get(1, 1), Some(orange), "scale {scale}");
                assert_eq!(output.grid.get(3, 2), Some(orange), "scale {scale}");
                assert_eq!(output.grid.get(0, 0), Some(PreviewCell::Off));
                // Near-black element is dimmed rather than classified.
                assert_eq!(output.grid.get(5, 0), Some(PreviewCell::Off));
            }
        }
    }

    #[test]
    fn failed_render_falls_back_to_cell_rasterization() {
        let elements = scene_elements();
        let scene = Scene { elements: elements.as_slice(), glyphs: &NoGlyphs };

        let mut downsampler =
            Downsampler::with_renderer(FailingRenderer, PreviewOptions::default());
        let expected = Downsampler::new(PreviewOptions::default()).downsample(scene, 8, 4);

        for attempt in 1..=4 {
            let output = downsampler.downsample(scene, 8, 4);
            assert!(output.used_fallback());
            assert_eq!(output.grid, expected.grid);
            assert_eq!(downsampler.consecutive_fallbacks(), attempt);
        }
    }

    #[test]
    fn invalid_scale_uses_fallback() {
        let elements = scene_elements();
        let scene = Scene { elements: elements.as_slice(), glyphs: &NoGlyphs };
        let options = PreviewOptions { scale: 0.25, ..PreviewOptions::default() };
        let output = Downsampler::new(options).downsample(scene, 8, 4);
        assert!(output.used_fallback());
        assert_eq!(output.grid.get(2, 1), Some(PreviewCell::Bucket(ColorBucket::Orange)));
    }
}
