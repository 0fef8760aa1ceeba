use crate::scenario::Viewport;
use crate::{Result, VrtError};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};

/// Fractional per-pixel tolerance applied by default.
pub const DEFAULT_THRESHOLD: f32 = 0.15;

/// Largest possible squared YIQ distance between two 8-bit RGB colors.
const MAX_YIQ_DELTA: f32 = 35215.0;

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub mismatches: u64,
    pub dimension_mismatch: bool,
    pub baseline_size: Viewport,
    pub current_size: Viewport,
    pub diff_artifact: Option<PathBuf>,
}

/// Compares a stored baseline against a fresh capture.
///
/// Differing dimensions are flagged, not fatal: the comparison covers the
/// top-left intersection of both rasters. When any pixel mismatches, a diff
/// raster is written to `diff_out` as PNG and the uncompressed buffer is
/// dropped.
pub async fn compare(
    baseline: &Path,
    current: &Path,
    diff_out: &Path,
    threshold: f32,
) -> Result<DiffOutcome> {
    let baseline_path = baseline.to_path_buf();
    let current_path = current.to_path_buf();

    // Two independent decodes, joined before comparison.
    let (base, cur) = tokio::try_join!(
        tokio::task::spawn_blocking(move || image::open(baseline_path).map(|i| i.to_rgba8())),
        tokio::task::spawn_blocking(move || image::open(current_path).map(|i| i.to_rgba8())),
    )
    .map_err(|err| VrtError::diff(format!("decode task failed: {err}")))?;
    let base = base?;
    let cur = cur?;

    let baseline_size = Viewport {
        width: base.width(),
        height: base.height(),
    };
    let current_size = Viewport {
        width: cur.width(),
        height: cur.height(),
    };
    let dimension_mismatch = baseline_size != current_size;

    let raster = compare_rasters(&base, &cur, threshold);

    let diff_artifact = if raster.mismatches > 0 {
        raster.diff.save(diff_out)?;
        Some(diff_out.to_path_buf())
    } else {
        None
    };

    Ok(DiffOutcome {
        mismatches: raster.mismatches,
        dimension_mismatch,
        baseline_size,
        current_size,
        diff_artifact,
    })
}

pub struct RasterDiff {
    pub mismatches: u64,
    /// Intersection-sized visualization: faded grayscale base, mismatching
    /// pixels in red.
    pub diff: RgbaImage,
}

/// Counts pixels whose perceptual YIQ distance exceeds `threshold` over the
/// top-left intersection of the two rasters.
pub fn compare_rasters(base: &RgbaImage, cur: &RgbaImage, threshold: f32) -> RasterDiff {
    let width = base.width().min(cur.width());
    let height = base.height().min(cur.height());
    let max_delta = threshold * threshold * MAX_YIQ_DELTA;

    let mut diff = RgbaImage::new(width, height);
    let mut mismatches = 0u64;

    for y in 0..height {
        for x in 0..width {
            let a = base.get_pixel(x, y).0;
            let b = cur.get_pixel(x, y).0;
            if a == b {
                diff.put_pixel(x, y, faded(a));
                continue;
            }
            if yiq_delta(a, b) > max_delta {
                mismatches += 1;
                diff.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            } else {
                diff.put_pixel(x, y, faded(a));
            }
        }
    }

    RasterDiff { mismatches, diff }
}

/// Squared color distance in YIQ space, after alpha-blending over white.
fn yiq_delta(a: [u8; 4], b: [u8; 4]) -> f32 {
    let (r1, g1, b1) = blend_over_white(a);
    let (r2, g2, b2) = blend_over_white(b);

    let y1 = rgb_to_y(r1, g1, b1);
    let y2 = rgb_to_y(r2, g2, b2);
    let dy = y1 - y2;
    let di = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let dq = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);

    0.5053 * dy * dy + 0.299 * di * di + 0.1957 * dq * dq
}

fn blend_over_white(px: [u8; 4]) -> (f32, f32, f32) {
    let alpha = px[3] as f32 / 255.0;
    let blend = |c: u8| 255.0 + (c as f32 - 255.0) * alpha;
    (blend(px[0]), blend(px[1]), blend(px[2]))
}

fn rgb_to_y(r: f32, g: f32, b: f32) -> f32 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb_to_i(r: f32, g: f32, b: f32) -> f32 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb_to_q(r: f32, g: f32, b: f32) -> f32 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn faded(px: [u8; 4]) -> Rgba<u8> {
    let (r, g, b) = blend_over_white(px);
    let luma = rgb_to_y(r, g, b);
    let gray = (255.0 + (luma - 255.0) * 0.1) as u8;
    Rgba([gray, gray, gray, 255])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn identical_rasters_never_mismatch() {
        let img = solid(10, 10, [120, 40, 200, 255]);
        for threshold in [0.0, 0.1, 0.5, 1.0] {
            let result = compare_rasters(&img, &img, threshold);
            assert_eq!(result.mismatches, 0, "threshold {threshold}");
        }
    }

    #[test]
    fn opposite_rasters_mismatch_everywhere() {
        let black = solid(4, 4, [0, 0, 0, 255]);
        let white = solid(4, 4, [255, 255, 255, 255]);
        let result = compare_rasters(&black, &white, 0.15);
        assert_eq!(result.mismatches, 16);
    }

    #[test]
    fn small_drift_stays_under_default_threshold() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [104, 100, 100, 255]);
        let result = compare_rasters(&a, &b, DEFAULT_THRESHOLD);
        assert_eq!(result.mismatches, 0);
    }

    #[test]
    fn zero_threshold_counts_any_visible_drift() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [104, 100, 100, 255]);
        let result = compare_rasters(&a, &b, 0.0);
        assert_eq!(result.mismatches, 16);
    }

    #[test]
    fn comparison_covers_only_the_intersection() {
        let base = solid(10, 8, [10, 10, 10, 255]);
        let mut cur = solid(15, 8, [10, 10, 10, 255]);
        // drift outside the 10x8 intersection must not count
        for y in 0..8 {
            cur.put_pixel(12, y, Rgba([250, 250, 250, 255]));
        }
        let result = compare_rasters(&base, &cur, 0.15);
        assert_eq!(result.mismatches, 0);
        assert_eq!(result.diff.dimensions(), (10, 8));
    }

    #[tokio::test]
    async fn compare_flags_dimension_drift_without_failing() {
        let tmp = tempfile::tempdir().unwrap();
        let base_path = tmp.path().join("base.png");
        let cur_path = tmp.path().join("cur.png");
        let diff_path = tmp.path().join("shot.diff.png");
        solid(20, 10, [50, 50, 50, 255]).save(&base_path).unwrap();
        solid(25, 10, [50, 50, 50, 255]).save(&cur_path).unwrap();

        let outcome = compare(&base_path, &cur_path, &diff_path, 0.15)
            .await
            .unwrap();
        assert!(outcome.dimension_mismatch);
        assert_eq!(outcome.mismatches, 0);
        assert_eq!(outcome.baseline_size.width, 20);
        assert_eq!(outcome.current_size.width, 25);
        assert!(outcome.diff_artifact.is_none());
        assert!(!diff_path.exists());
    }

    #[tokio::test]
    async fn compare_writes_artifact_only_on_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let base_path = tmp.path().join("base.png");
        let cur_path = tmp.path().join("cur.png");
        let diff_path = tmp.path().join("shot.diff.png");
        solid(6, 6, [0, 0, 0, 255]).save(&base_path).unwrap();
        solid(6, 6, [255, 255, 255, 255]).save(&cur_path).unwrap();

        let outcome = compare(&base_path, &cur_path, &diff_path, 0.15)
            .await
            .unwrap();
        assert_eq!(outcome.mismatches, 36);
        assert!(!outcome.dimension_mismatch);
        assert_eq!(outcome.diff_artifact.as_deref(), Some(diff_path.as_path()));
        let (w, h) = image::image_dimensions(&diff_path).unwrap();
        assert_eq!((w, h), (6, 6));
    }
}
