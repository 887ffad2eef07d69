//! The extraction pipeline: pyramid, tiled FAST, distribution,
//! orientation, and descriptors behind one entry point.

use crate::descriptor::{compute_descriptors, Descriptors, PATCH_SIZE};
use crate::detect::{FastDetector, ScoreType, TileRect};
use crate::distribute::{distribute_keypoints, Bounds, Distribution};
use crate::image::pyramid::{ScalePyramid, EDGE_THRESHOLD};
use crate::image::ImageView;
use crate::keypoint::KeyPoint;
use crate::orient::compute_angles;
use crate::trace::{trace_event, trace_span};
use crate::util::math::round_coord;
use crate::util::{OrbFeatError, OrbFeatResult};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Target tile edge for the cell-decomposed FAST driver.
const CELL_SIZE: i32 = 30;

/// Distance from the interior edge where detection may begin; keeps the
/// FAST ring and the descriptor patch inside addressable pixels.
const DETECTION_MARGIN: i32 = EDGE_THRESHOLD as i32 - 3;

/// Smallest base-image dimension that still hosts a detection region.
const MIN_IMAGE_DIM: usize = 2 * (EDGE_THRESHOLD - 3) + 7;

/// Tunable surface of [`OrbExtractor`].
///
/// Out-of-range values are silently clamped, both here and in the
/// setters; configuration is never a fatal error.
#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    /// Total number of keypoints to retain, `1..=10000`.
    pub nfeatures: usize,
    /// Scale ratio between pyramid levels, clamped to `[1.001, 1.5]`.
    pub scale_factor: f32,
    /// Number of pyramid levels, clamped to `[2, 12]`.
    pub nlevels: usize,
    /// FAST threshold for the first detection pass.
    pub ini_th_fast: u8,
    /// Fallback FAST threshold for tiles the first pass left empty.
    pub min_th_fast: u8,
    /// Keypoint retention strategy.
    pub distribution: Distribution,
    /// Corner response measure.
    pub score_type: ScoreType,
    /// Tolerance of the SSC radius search, in keypoints.
    pub soft_ssc_threshold: i32,
    /// Run per-level work on the rayon pool when the feature is enabled.
    ///
    /// Without the `rayon` feature the flag is ignored and execution
    /// stays sequential.
    pub parallel: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            nfeatures: 1000,
            scale_factor: 1.2,
            nlevels: 8,
            ini_th_fast: 20,
            min_th_fast: 7,
            distribution: Distribution::Ssc,
            score_type: ScoreType::Harris,
            soft_ssc_threshold: 10,
            parallel: true,
        }
    }
}

impl ExtractorConfig {
    fn clamped(mut self) -> Self {
        self.nfeatures = self.nfeatures.clamp(1, 10_000);
        self.scale_factor = self.scale_factor.clamp(1.001, 1.5);
        self.nlevels = self.nlevels.clamp(2, 12);
        self.ini_th_fast = self.ini_th_fast.max(1);
        self.min_th_fast = self.min_th_fast.clamp(1, self.ini_th_fast);
        self
    }
}

/// Keypoints and their packed descriptors; row `k` of the descriptor
/// matrix belongs to `keypoints[k]`.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Descriptors,
}

/// ORB keypoint and descriptor extractor.
///
/// The instance owns its pyramid buffers and detector caches, so a single
/// extractor is not meant for concurrent `extract` calls; pool instances
/// for throughput. Pyramid allocations are reused across calls with
/// matching image dimensions.
pub struct OrbExtractor {
    cfg: ExtractorConfig,
    scale_factors: Vec<f32>,
    inv_scale_factors: Vec<f32>,
    level_sigma2: Vec<f32>,
    inv_level_sigma2: Vec<f32>,
    features_per_level: Vec<usize>,
    pyramid: ScalePyramid,
    fast: FastDetector,
    steps_changed: bool,
    prev_dims: Option<(usize, usize)>,
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl OrbExtractor {
    pub fn new(cfg: ExtractorConfig) -> Self {
        let cfg = cfg.clamped();
        let fast = FastDetector::new(cfg.score_type);
        let mut extractor = Self {
            cfg,
            scale_factors: Vec::new(),
            inv_scale_factors: Vec::new(),
            level_sigma2: Vec::new(),
            inv_level_sigma2: Vec::new(),
            features_per_level: Vec::new(),
            pyramid: ScalePyramid::new(),
            fast,
            steps_changed: true,
            prev_dims: None,
        };
        extractor.recompute_scale_table();
        extractor.recompute_quotas();
        extractor
    }

    /// Extracts keypoints and descriptors with per-level distribution.
    ///
    /// The mask parameter is accepted for API symmetry and ignored.
    pub fn extract(
        &mut self,
        image: ImageView<'_, u8>,
        mask: Option<ImageView<'_, u8>>,
    ) -> OrbFeatResult<Extraction> {
        self.extract_with(image, mask, true)
    }

    /// Extracts keypoints and descriptors.
    ///
    /// With `distribute_per_level` the per-level quotas are enforced level
    /// by level; otherwise all candidates compete in one global pass of
    /// `nfeatures` over the base frame.
    pub fn extract_with(
        &mut self,
        image: ImageView<'_, u8>,
        _mask: Option<ImageView<'_, u8>>,
        distribute_per_level: bool,
    ) -> OrbFeatResult<Extraction> {
        let _span = trace_span!(
            "extract",
            width = image.width(),
            height = image.height(),
            per_level = distribute_per_level
        )
        .entered();

        let (width, height) = (image.width(), image.height());
        if width.min(height) < MIN_IMAGE_DIM {
            return Err(OrbFeatError::ImageTooSmall {
                width,
                height,
                min: MIN_IMAGE_DIM,
            });
        }
        if self.prev_dims != Some((width, height)) {
            self.steps_changed = true;
            self.prev_dims = Some((width, height));
        }

        self.pyramid.build(image, &self.inv_scale_factors);

        if self.steps_changed {
            let strides: Vec<usize> = (0..self.cfg.nlevels)
                .map(|lvl| self.pyramid.level(lvl).stride())
                .collect();
            self.fast.configure(&strides);
            self.steps_changed = false;
        }

        let mut all_kpts = self.detect_all_levels(distribute_per_level);
        trace_event!(
            "detected",
            candidates = all_kpts.iter().map(Vec::len).sum::<usize>()
        );

        self.orient_all_levels(&mut all_kpts);

        if !distribute_per_level {
            self.distribute_globally(&mut all_kpts);
        }

        let descriptors = compute_descriptors(&self.pyramid, &all_kpts);

        let mut keypoints = Vec::with_capacity(descriptors.rows());
        for (lvl, level_kpts) in all_kpts.iter_mut().enumerate() {
            let scale = self.scale_factors[lvl];
            let size = PATCH_SIZE as f32 * scale;
            for mut kpt in level_kpts.drain(..) {
                kpt.size = size;
                if lvl > 0 {
                    kpt.pt.x *= scale;
                    kpt.pt.y *= scale;
                }
                keypoints.push(kpt);
            }
        }
        trace_event!("extracted", keypoints = keypoints.len());

        Ok(Extraction {
            keypoints,
            descriptors,
        })
    }

    /// Tiled two-threshold FAST over every level; candidates come back in
    /// level-frame coordinates with `octave` stamped.
    fn detect_all_levels(&self, distribute_per_level: bool) -> Vec<Vec<KeyPoint>> {
        #[cfg(feature = "rayon")]
        if self.use_parallel() {
            return (0..self.cfg.nlevels)
                .into_par_iter()
                .map(|lvl| self.detect_level(lvl, distribute_per_level))
                .collect();
        }
        (0..self.cfg.nlevels)
            .map(|lvl| self.detect_level(lvl, distribute_per_level))
            .collect()
    }

    fn detect_level(&self, lvl: usize, distribute_per_level: bool) -> Vec<KeyPoint> {
        let level = self.pyramid.level(lvl);
        let cols = level.cols() as i32;
        let rows = level.rows() as i32;

        let min_x = DETECTION_MARGIN;
        let min_y = DETECTION_MARGIN;
        let max_x = cols - DETECTION_MARGIN;
        let max_y = rows - DETECTION_MARGIN;
        let width = max_x - min_x;
        let height = max_y - min_y;
        if width < 7 || height < 7 {
            return Vec::new();
        }

        let n_tiles_x = (width / CELL_SIZE).max(1);
        let n_tiles_y = (height / CELL_SIZE).max(1);
        let tile_w = (width + n_tiles_x - 1) / n_tiles_x;
        let tile_h = (height + n_tiles_y - 1) / n_tiles_y;

        let mut candidates: Vec<KeyPoint> = Vec::new();
        for ty in 0..n_tiles_y {
            let start_y = min_y + ty * tile_h;
            if start_y >= max_y - 3 {
                continue;
            }
            let end_y = (start_y + tile_h + 6).min(max_y);

            for tx in 0..n_tiles_x {
                let start_x = min_x + tx * tile_w;
                if start_x >= max_x - 6 {
                    continue;
                }
                let end_x = (start_x + tile_w + 6).min(max_x);

                let rect = TileRect {
                    x0: start_x,
                    y0: start_y,
                    w: end_x - start_x,
                    h: end_y - start_y,
                };
                let mut tile_kpts = self.fast.detect(level, rect, self.cfg.ini_th_fast, lvl);
                if tile_kpts.is_empty() {
                    tile_kpts = self.fast.detect(level, rect, self.cfg.min_th_fast, lvl);
                }
                for mut kpt in tile_kpts {
                    kpt.pt.x += (tx * tile_w) as f32;
                    kpt.pt.y += (ty * tile_h) as f32;
                    candidates.push(kpt);
                }
            }
        }

        if distribute_per_level {
            distribute_keypoints(
                self.cfg.distribution,
                &mut candidates,
                Bounds::new(0, width, 0, height),
                self.features_per_level[lvl],
                self.cfg.soft_ssc_threshold,
            );
        }

        for kpt in &mut candidates {
            kpt.pt.x += min_x as f32;
            kpt.pt.y += min_y as f32;
            kpt.octave = lvl as i32;
        }
        candidates
    }

    fn orient_all_levels(&self, all_kpts: &mut [Vec<KeyPoint>]) {
        #[cfg(feature = "rayon")]
        if self.use_parallel() {
            all_kpts
                .par_iter_mut()
                .enumerate()
                .for_each(|(lvl, kpts)| compute_angles(self.pyramid.level(lvl), kpts));
            return;
        }
        for (lvl, kpts) in all_kpts.iter_mut().enumerate() {
            compute_angles(self.pyramid.level(lvl), kpts);
        }
    }

    /// One global retention pass over the base frame. Coordinates go to
    /// the base frame for the pass and return to their level frame so the
    /// descriptor stage reads the correct pyramid level.
    fn distribute_globally(&self, all_kpts: &mut [Vec<KeyPoint>]) {
        for (lvl, kpts) in all_kpts.iter_mut().enumerate().skip(1) {
            let scale = self.scale_factors[lvl];
            for kpt in kpts.iter_mut() {
                kpt.pt.x *= scale;
                kpt.pt.y *= scale;
            }
        }

        let mut merged: Vec<KeyPoint> = all_kpts.iter().flatten().copied().collect();
        let base = self.pyramid.level(0);
        distribute_keypoints(
            self.cfg.distribution,
            &mut merged,
            Bounds::new(0, base.cols() as i32, 0, base.rows() as i32),
            self.cfg.nfeatures,
            self.cfg.soft_ssc_threshold,
        );

        for kpts in all_kpts.iter_mut() {
            kpts.clear();
        }
        for mut kpt in merged {
            let lvl = kpt.octave as usize;
            let inv = self.inv_scale_factors[lvl];
            if lvl > 0 {
                kpt.pt.x *= inv;
                kpt.pt.y *= inv;
            }
            all_kpts[lvl].push(kpt);
        }
    }

    #[cfg(feature = "rayon")]
    fn use_parallel(&self) -> bool {
        self.cfg.parallel
    }

    fn recompute_scale_table(&mut self) {
        let n = self.cfg.nlevels;
        let s = self.cfg.scale_factor;
        self.scale_factors = vec![1.0; n];
        self.inv_scale_factors = vec![1.0; n];
        self.level_sigma2 = vec![1.0; n];
        self.inv_level_sigma2 = vec![1.0; n];
        for i in 1..n {
            self.scale_factors[i] = self.scale_factors[i - 1] * s;
            self.inv_scale_factors[i] = 1.0 / self.scale_factors[i];
            self.level_sigma2[i] = self.scale_factors[i] * self.scale_factors[i];
            self.inv_level_sigma2[i] = 1.0 / self.level_sigma2[i];
        }
    }

    /// Geometric per-level quota series summing to `nfeatures`.
    fn recompute_quotas(&mut self) {
        let n = self.cfg.nlevels;
        let fac = 1.0 / self.cfg.scale_factor;
        let mut desired =
            self.cfg.nfeatures as f32 * (1.0 - fac) / (1.0 - fac.powi(n as i32));

        self.features_per_level = vec![0; n];
        let mut sum = 0usize;
        for i in 0..n - 1 {
            self.features_per_level[i] = round_coord(desired).max(0) as usize;
            sum += self.features_per_level[i];
            desired *= fac;
        }
        self.features_per_level[n - 1] = self.cfg.nfeatures.saturating_sub(sum);
    }

    // --- configuration mutators (silently clamping) -------------------

    pub fn set_nfeatures(&mut self, n: usize) {
        self.cfg.nfeatures = n.clamp(1, 10_000);
        self.recompute_quotas();
    }

    pub fn set_scale_factor(&mut self, s: f32) {
        self.cfg.scale_factor = s.clamp(1.001, 1.5);
        self.recompute_scale_table();
        self.recompute_quotas();
        self.steps_changed = true;
    }

    pub fn set_nlevels(&mut self, n: usize) {
        self.cfg.nlevels = n.clamp(2, 12);
        self.recompute_scale_table();
        self.recompute_quotas();
        self.steps_changed = true;
    }

    pub fn set_fast_thresholds(&mut self, ini: u8, min: u8) {
        self.cfg.ini_th_fast = ini.max(1);
        self.cfg.min_th_fast = min.clamp(1, self.cfg.ini_th_fast);
    }

    pub fn set_distribution(&mut self, mode: Distribution) {
        self.cfg.distribution = mode;
    }

    pub fn set_score_type(&mut self, score_type: ScoreType) {
        self.cfg.score_type = score_type;
        self.fast.set_score_type(score_type);
    }

    // --- accessors -----------------------------------------------------

    pub fn nfeatures(&self) -> usize {
        self.cfg.nfeatures
    }

    pub fn levels(&self) -> usize {
        self.cfg.nlevels
    }

    pub fn scale_factor(&self) -> f32 {
        self.cfg.scale_factor
    }

    pub fn scale_factors(&self) -> &[f32] {
        &self.scale_factors
    }

    pub fn inv_scale_factors(&self) -> &[f32] {
        &self.inv_scale_factors
    }

    pub fn level_sigma2(&self) -> &[f32] {
        &self.level_sigma2
    }

    pub fn inv_level_sigma2(&self) -> &[f32] {
        &self.inv_level_sigma2
    }

    pub fn distribution(&self) -> Distribution {
        self.cfg.distribution
    }

    pub fn score_type(&self) -> ScoreType {
        self.fast.score_type()
    }

    pub fn fast_thresholds(&self) -> (u8, u8) {
        (self.cfg.ini_th_fast, self.cfg.min_th_fast)
    }
}

#[cfg(test)]
mod tests {
    use super::{ExtractorConfig, OrbExtractor};

    #[test]
    fn quotas_sum_to_nfeatures_and_decay_geometrically() {
        let extractor = OrbExtractor::new(ExtractorConfig {
            nfeatures: 1000,
            scale_factor: 1.2,
            nlevels: 8,
            ..ExtractorConfig::default()
        });
        let quotas = &extractor.features_per_level;
        assert_eq!(quotas.len(), 8);
        assert_eq!(quotas.iter().sum::<usize>(), 1000);
        for w in quotas[..7].windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn scale_table_is_geometric_with_squared_sigma() {
        let extractor = OrbExtractor::new(ExtractorConfig {
            scale_factor: 1.25,
            nlevels: 5,
            ..ExtractorConfig::default()
        });
        assert_eq!(extractor.scale_factors()[0], 1.0);
        for i in 1..5 {
            let expected = 1.25f32.powi(i as i32);
            assert!((extractor.scale_factors()[i] - expected).abs() < 1e-4);
            assert!(
                (extractor.inv_scale_factors()[i] - 1.0 / expected).abs() < 1e-4
            );
            assert!((extractor.level_sigma2()[i] - expected * expected).abs() < 1e-3);
            assert!(
                (extractor.inv_level_sigma2()[i] - 1.0 / (expected * expected)).abs() < 1e-4
            );
        }
    }

    #[test]
    fn out_of_range_configuration_is_clamped() {
        let mut extractor = OrbExtractor::new(ExtractorConfig {
            nfeatures: 0,
            scale_factor: 9.0,
            nlevels: 40,
            ini_th_fast: 0,
            min_th_fast: 200,
            ..ExtractorConfig::default()
        });
        assert_eq!(extractor.nfeatures(), 1);
        assert_eq!(extractor.scale_factor(), 1.5);
        assert_eq!(extractor.levels(), 12);
        assert_eq!(extractor.fast_thresholds(), (1, 1));

        extractor.set_nfeatures(50_000);
        assert_eq!(extractor.nfeatures(), 10_000);
        extractor.set_scale_factor(0.5);
        assert_eq!(extractor.scale_factor(), 1.001);
        extractor.set_nlevels(1);
        assert_eq!(extractor.levels(), 2);
        extractor.set_fast_thresholds(30, 40);
        assert_eq!(extractor.fast_thresholds(), (30, 30));
    }

    #[test]
    fn quota_rounding_slack_is_bounded_by_level_count() {
        // Per-level rounding can overshoot the requested total by at most
        // one keypoint per level; the last level absorbs the rest.
        for nfeatures in [1usize, 7, 123, 9999] {
            let extractor = OrbExtractor::new(ExtractorConfig {
                nfeatures,
                ..ExtractorConfig::default()
            });
            let total: usize = extractor.features_per_level.iter().sum();
            let levels = extractor.levels();
            assert!(total >= nfeatures.max(1));
            assert!(total <= nfeatures.max(1) + levels);
        }
    }
}
