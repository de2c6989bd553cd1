use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::PcaTrackerConfig;
use crate::error::Result;
use crate::event::Event;

/// Snapshot of the tracker's statistics after the last batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PcaResult {
    /// `(mean_x, mean_y)`
    pub mean: [f64; 2],
    /// Sample covariance `[[cov_xx, cov_xy], [cov_xy, cov_yy]]` (N - 1 denominator).
    pub covariance: [[f64; 2]; 2],
    /// Descending: `eigenvalues[0] >= eigenvalues[1] >= 0`.
    pub eigenvalues: [f64; 2],
    /// Unit vectors; row `i` belongs to `eigenvalues[i]`.
    pub eigenvectors: [[f64; 2]; 2],
}

/// Running sums over the coordinates currently in the window.
///
/// Coordinates are 16-bit, so the sums are kept as exact integers: adding and
/// evicting points never accumulates rounding error, however long the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct WindowSums {
    x: i64,
    y: i64,
    xx: i64,
    xy: i64,
    yy: i64,
}

impl WindowSums {
    fn add(&mut self, x: i64, y: i64) {
        self.x += x;
        self.y += y;
        self.xx += x * x;
        self.xy += x * y;
        self.yy += y * y;
    }

    fn remove(&mut self, x: i64, y: i64) {
        self.x -= x;
        self.y -= y;
        self.xx -= x * x;
        self.xy -= x * y;
        self.yy -= y * y;
    }

    fn mean(&self, n: usize) -> [f64; 2] {
        let n = n as f64;
        [self.x as f64 / n, self.y as f64 / n]
    }

    /// Sample covariance for `n >= 2` points.
    ///
    /// `(sum_ab - sum_a * sum_b / n) / (n - 1)` rewritten as
    /// `(n * sum_ab - sum_a * sum_b) / (n * (n - 1))` so the numerator is
    /// computed exactly in integers. The diagonal numerators are therefore
    /// never negative.
    fn covariance(&self, n: usize) -> [[f64; 2]; 2] {
        let n = n as i128;
        let denom = (n * (n - 1)) as f64;
        let centered = |sum_ab: i64, sum_a: i64, sum_b: i64| -> f64 {
            (n * sum_ab as i128 - sum_a as i128 * sum_b as i128) as f64 / denom
        };
        let cov_xx = centered(self.xx, self.x, self.x);
        let cov_xy = centered(self.xy, self.x, self.y);
        let cov_yy = centered(self.yy, self.y, self.y);
        [[cov_xx, cov_xy], [cov_xy, cov_yy]]
    }
}

/// Eigen-decomposition of the symmetric 2x2 matrix `[[a, b], [b, d]]`.
///
/// Eigenvalues come from the characteristic polynomial with the discriminant
/// clamped at zero, then clamped at zero themselves; the result is sorted
/// descending by construction. Each eigenvector is `(lambda - d, b)`
/// normalized. When that candidate is shorter than `epsilon` (diagonal matrix,
/// or a single distinct point) the first axis falls back to `(0, 1)`, and the
/// second to `(0, 1)` as well unless the first already took it, in which case
/// it becomes `(1, 0)` so the two rows still form a basis.
pub fn eigen_decompose(cov: [[f64; 2]; 2], epsilon: f64) -> ([f64; 2], [[f64; 2]; 2]) {
    let a = cov[0][0];
    let b = cov[0][1];
    let d = cov[1][1];

    let trace = a + d;
    let det = a * d - b * b;
    let discriminant = (trace * trace - 4.0 * det).max(0.0);
    let root = discriminant.sqrt();
    let eigenvalues = [
        ((trace + root) / 2.0).max(0.0),
        ((trace - root) / 2.0).max(0.0),
    ];

    let axis = |lambda: f64| -> Option<[f64; 2]> {
        let vx = lambda - d;
        let vy = b;
        let magnitude = vx.hypot(vy);
        (magnitude > epsilon).then(|| [vx / magnitude, vy / magnitude])
    };

    let first = axis(eigenvalues[0]);
    let second = axis(eigenvalues[1]);
    let eigenvectors = match (first, second) {
        (Some(v0), Some(v1)) => [v0, v1],
        (Some(v0), None) => [v0, [0.0, 1.0]],
        (None, Some(v1)) => [[0.0, 1.0], v1],
        (None, None) => [[0.0, 1.0], [1.0, 0.0]],
    };

    (eigenvalues, eigenvectors)
}

/// Rolling-window PCA over event coordinates.
///
/// Keeps the most recent `max_window_size` event positions in a FIFO together
/// with running sums of `x`, `y`, `x^2`, `xy` and `y^2`. Every incoming event
/// adds its contribution and, once the window is full, the evicted event's
/// contribution is subtracted, so each update is O(1) regardless of window
/// size. Mean and covariance track every event; the eigen-decomposition is
/// refreshed once per batch.
///
/// Results are "not yet meaningful" until the window holds two events: with
/// fewer, the covariance and eigen results stay at their previous values.
pub struct RollingPcaTracker {
    window: VecDeque<(i16, i16)>,
    sums: WindowSums,
    max_window_size: usize,
    eigenvector_epsilon: f64,
    result: PcaResult,
}

impl RollingPcaTracker {
    pub fn new(config: &PcaTrackerConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            max_window_size = config.max_window_size,
            "pca tracker created"
        );
        Ok(Self {
            window: VecDeque::new(),
            sums: WindowSums::default(),
            max_window_size: config.max_window_size,
            eigenvector_epsilon: config.eigenvector_epsilon,
            result: PcaResult::default(),
        })
    }

    /// Absorb a batch of events in arrival order, then refresh the
    /// eigen-decomposition. An empty batch changes nothing.
    pub fn accept_batch(&mut self, events: &[Event]) {
        if events.is_empty() {
            return;
        }

        for event in events {
            self.window.push_back((event.x, event.y));
            self.sums.add(event.x as i64, event.y as i64);

            if self.window.len() > self.max_window_size {
                if let Some((old_x, old_y)) = self.window.pop_front() {
                    self.sums.remove(old_x as i64, old_y as i64);
                }
            }

            let n = self.window.len();
            self.result.mean = self.sums.mean(n);
            if n > 1 {
                self.result.covariance = self.sums.covariance(n);
            }
        }

        let (eigenvalues, eigenvectors) =
            eigen_decompose(self.result.covariance, self.eigenvector_epsilon);
        self.result.eigenvalues = eigenvalues;
        self.result.eigenvectors = eigenvectors;

        trace!(
            events = events.len(),
            window = self.window.len(),
            mean_x = self.result.mean[0],
            mean_y = self.result.mean[1],
            "pca batch absorbed"
        );
    }

    /// `(mean_x, mean_y)` of the current window.
    pub fn mean(&self) -> [f64; 2] {
        self.result.mean
    }

    pub fn covariance(&self) -> [[f64; 2]; 2] {
        self.result.covariance
    }

    pub fn eigenvalues(&self) -> [f64; 2] {
        self.result.eigenvalues
    }

    pub fn eigenvectors(&self) -> [[f64; 2]; 2] {
        self.result.eigenvectors
    }

    pub fn result(&self) -> PcaResult {
        self.result
    }

    /// Tips of the two principal axes drawn from the mean, each scaled by
    /// the square root of its eigenvalue (one standard deviation).
    pub fn axis_endpoints(&self) -> [[f64; 2]; 2] {
        let [mx, my] = self.result.mean;
        let tip = |i: usize| {
            let scale = self.result.eigenvalues[i].sqrt();
            let [vx, vy] = self.result.eigenvectors[i];
            [mx + vx * scale, my + vy * scale]
        };
        [tip(0), tip(1)]
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn max_window_size(&self) -> usize {
        self.max_window_size
    }

    /// True once the window holds enough events for a sample covariance.
    pub fn is_meaningful(&self) -> bool {
        self.window.len() >= 2
    }

    /// Empty the window and zero all sums and results.
    pub fn reset(&mut self) {
        self.window.clear();
        self.sums = WindowSums::default();
        self.result = PcaResult::default();
        debug!("pca tracker reset");
    }
}
