//! Image enhancement applied before OCR.
//!
//! Fixed pipeline: luminance → non-local-means denoise → adaptive Gaussian
//! threshold → 1.5x cubic upscale. The result is always a single-channel image.

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use imageproc::filter::separable_filter_equal;
use rayon::prelude::*;
use tracing::debug;

/// Weights below this are treated as zero by the denoiser.
const WEIGHT_THRESHOLD: f32 = 0.001;

/// Output rows denoised together by one rayon task.
const BAND_ROWS: usize = 16;

/// Parameters of the enhancement pipeline.
#[derive(Debug, Clone, Copy)]
pub struct EnhanceParams {
    /// Non-local-means filter strength `h`.
    pub denoise_strength: f32,
    /// Side of the square patch compared by the denoiser (odd).
    pub template_window: u32,
    /// Side of the square area searched for similar patches (odd).
    pub search_window: u32,
    /// Side of the Gaussian neighbourhood used by the threshold (odd).
    pub block_size: u32,
    /// Subtracted from the weighted neighbourhood mean.
    pub threshold_offset: i16,
    pub scale: f64,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            denoise_strength: 30.0,
            template_window: 7,
            search_window: 21,
            block_size: 11,
            threshold_offset: 2,
            scale: 1.5,
        }
    }
}

/// Run the full pipeline with the default parameters.
pub fn enhance(image: &DynamicImage) -> GrayImage {
    enhance_with(image, &EnhanceParams::default())
}

pub fn enhance_with(image: &DynamicImage, params: &EnhanceParams) -> GrayImage {
    let gray = to_luminance(image);
    let denoised = nl_means_denoise(&gray, params);
    let binary = adaptive_gaussian_threshold(&denoised, params.block_size, params.threshold_offset);
    let scaled = upscale(&binary, params.scale);

    debug!(
        "Enhanced image {}x{} -> {}x{}",
        gray.width(),
        gray.height(),
        scaled.width(),
        scaled.height()
    );
    scaled
}

/// Convert to single-channel luminance with ITU-R 601-2 weights
/// (`L = R * 299/1000 + G * 587/1000 + B * 114/1000`), in 16-bit fixed point.
pub fn to_luminance(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        Luma([l as u8])
    })
}

/// Non-local-means denoising.
///
/// Every pixel becomes a weighted average of the pixels in its search window,
/// weighted by `exp(-d / h^2)` where `d` is the mean squared difference
/// between the template patches around the two pixels. Borders are mirrored
/// without repeating the edge pixel.
///
/// Patch distances are computed per search offset with running box sums, so
/// the cost is proportional to `pixels * search_window^2`. The output is split
/// into bands of [`BAND_ROWS`] rows spread across the rayon pool; each band
/// keeps its own scratch buffers, so extra memory stays proportional to the
/// band size rather than the image size.
pub fn nl_means_denoise(image: &GrayImage, params: &EnhanceParams) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let t = (params.template_window / 2) as usize;
    let s = (params.search_window / 2) as usize;
    let padded = Padded::new(image, t + s);
    let w = width as usize;

    let area = ((2 * t + 1) * (2 * t + 1)) as f32;
    let norm = area * params.denoise_strength * params.denoise_strength;
    let cutoff = -WEIGHT_THRESHOLD.ln() * norm;

    let span = s as isize;
    let offsets: Vec<(isize, isize)> = (-span..=span)
        .flat_map(|dy| (-span..=span).map(move |dx| (dy, dx)))
        .collect();

    let geometry = Geometry { w, t, s };
    let mut out = vec![0u8; w * height as usize];
    out.par_chunks_mut(BAND_ROWS * w)
        .enumerate()
        .for_each(|(band, chunk)| {
            let first_row = band * BAND_ROWS;
            let rows = chunk.len() / w;
            let mut acc = Accumulator::new(&geometry, rows);
            for &(dy, dx) in &offsets {
                acc.add_offset(&padded, &geometry, first_row, dy, dx, norm, cutoff);
            }
            // The zero offset always contributes weight 1, so weights are never zero.
            for (i, px) in chunk.iter_mut().enumerate() {
                *px = (acc.sums[i] / acc.weights[i]).round().clamp(0.0, 255.0) as u8;
            }
        });

    GrayImage::from_fn(width, height, |x, y| Luma([out[y as usize * w + x as usize]]))
}

/// Adaptive thresholding against a Gaussian-weighted neighbourhood mean.
///
/// A pixel becomes white (255) when it is brighter than `mean - offset`,
/// black (0) otherwise. Edges replicate the border pixel.
pub fn adaptive_gaussian_threshold(image: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let kernel = gaussian_kernel(block_size);
    let mean: GrayImage = separable_filter_equal(image, &kernel);

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let src = image.get_pixel(x, y)[0] as i16;
        let local = mean.get_pixel(x, y)[0] as i16;
        if src - local > -offset {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Upscale by `factor` on both axes with cubic interpolation.
pub fn upscale(image: &GrayImage, factor: f64) -> GrayImage {
    let (width, height) = scaled_dimensions(image.width(), image.height(), factor);
    image::imageops::resize(image, width, height, FilterType::CatmullRom)
}

/// Target size for a scale factor, rounded half to even and never zero.
pub fn scaled_dimensions(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * factor).round_ties_even() as u32).max(1);
    (scale(width), scale(height))
}

/// Normalised 1-D Gaussian kernel of odd length `size`.
///
/// Sigma is derived from the size as `0.3 * ((size - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let size = size.max(1) | 1;
    let radius = (size / 2) as i32;
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let denom = 2.0 * sigma * sigma;

    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= total;
    }
    kernel
}

/// Sizes shared by every search offset.
struct Geometry {
    w: usize,
    /// Template radius.
    t: usize,
    /// Search radius.
    s: usize,
}

/// Grayscale image mirrored (reflect-101) by `pad` pixels on every side.
struct Padded {
    data: Vec<u8>,
    stride: usize,
}

impl Padded {
    fn new(image: &GrayImage, pad: usize) -> Self {
        let (w, h) = (image.width() as isize, image.height() as isize);
        let stride = w as usize + 2 * pad;
        let rows = h as usize + 2 * pad;
        let mut data = Vec::with_capacity(stride * rows);

        for py in 0..rows {
            let sy = reflect_101(py as isize - pad as isize, h);
            for px in 0..stride {
                let sx = reflect_101(px as isize - pad as isize, w);
                data.push(image.get_pixel(sx as u32, sy as u32)[0]);
            }
        }

        Self { data, stride }
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.stride + col]
    }
}

/// Mirror an index into `0..len` without repeating the edge (`dcb|abcd|cba`).
fn reflect_101(i: isize, len: isize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut m = i.rem_euclid(period);
    if m >= len {
        m = period - m;
    }
    m as usize
}

/// Running totals for one band of output rows, plus scratch buffers reused
/// across offsets.
struct Accumulator {
    rows: usize,
    weights: Vec<f32>,
    sums: Vec<f32>,
    diff: Vec<u32>,
    columns: Vec<u32>,
}

impl Accumulator {
    fn new(g: &Geometry, rows: usize) -> Self {
        let dw = g.w + 2 * g.t;
        let dh = rows + 2 * g.t;
        Self {
            rows,
            weights: vec![0.0; g.w * rows],
            sums: vec![0.0; g.w * rows],
            diff: vec![0; dw * dh],
            columns: vec![0; rows * dw],
        }
    }

    /// Accumulate the contribution of the neighbour at `(dy, dx)` for every
    /// pixel of the band starting at image row `first_row`.
    #[allow(clippy::too_many_arguments)]
    fn add_offset(
        &mut self,
        padded: &Padded,
        g: &Geometry,
        first_row: usize,
        dy: isize,
        dx: isize,
        norm: f32,
        cutoff: f32,
    ) {
        let tw = 2 * g.t + 1;
        let dw = g.w + 2 * g.t;
        let dh = self.rows + 2 * g.t;

        // Squared differences between the image and its shifted copy, over
        // every pixel the band's templates can touch.
        for r in 0..dh {
            let pr = first_row + r + g.s;
            let qr = (pr as isize + dy) as usize;
            for c in 0..dw {
                let pc = c + g.s;
                let qc = (pc as isize + dx) as usize;
                let d = padded.get(pr, pc) as i32 - padded.get(qr, qc) as i32;
                self.diff[r * dw + c] = (d * d) as u32;
            }
        }

        // Vertical template sums.
        for c in 0..dw {
            let mut acc: u32 = (0..tw).map(|k| self.diff[k * dw + c]).sum();
            self.columns[c] = acc;
            for r in 1..self.rows {
                acc += self.diff[(r + tw - 1) * dw + c];
                acc -= self.diff[(r - 1) * dw + c];
                self.columns[r * dw + c] = acc;
            }
        }

        // Horizontal template sums give the full patch distance per pixel.
        let pad = g.t + g.s;
        for r in 0..self.rows {
            let row = &self.columns[r * dw..(r + 1) * dw];
            let mut acc: u32 = row[..tw].iter().sum();
            let qr = (first_row + r + pad) as isize + dy;
            for c in 0..g.w {
                if c > 0 {
                    acc += row[c + tw - 1];
                    acc -= row[c - 1];
                }
                let dist = acc as f32;
                if dist > cutoff {
                    continue;
                }
                let weight = (-dist / norm).exp();
                let qc = (c as isize + pad as isize + dx) as usize;
                let i = r * g.w + c;
                self.weights[i] += weight;
                self.sums[i] += weight * padded.get(qr as usize, qc) as f32;
            }
        }
    }
}
