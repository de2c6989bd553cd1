use tracing::{debug, trace};

use crate::config::FrequencyDetectorConfig;
use crate::error::Result;
use crate::event::{pixel_index, Event};

/// Timing state of a single pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelState {
    /// Timestamp of the last rising edge seen at this pixel.
    pub last_timestamp: i64,
    /// Streak of in-tolerance intervals, clamped at `required_matches`.
    pub consecutive_matches: u32,
}

/// Per-pixel blink frequency detector.
///
/// Measures the interval between consecutive rising (OFF -> ON) edges at each
/// pixel and compares the implied frequency against a target. A pixel is
/// reported as detected once `required_matches` intervals in a row have landed
/// within `tolerance_hz` of the target; a single miss resets the streak.
///
/// Only rising edges are timed, so one interval spans one full blink cycle.
/// Several detectors tuned to different frequencies can be run over the same
/// batch; they share no state.
pub struct FrequencyDetector {
    /// Flat: y * width + x
    states: Vec<PixelState>,
    width: usize,
    height: usize,
    target_frequency_hz: f64,
    tolerance_hz: f64,
    required_matches: u32,
    debounce_us: i64,
}

impl FrequencyDetector {
    /// Create a new detector with every pixel at the all-zero state.
    ///
    /// Fails with `Error::InvalidConfig` if any precondition of
    /// [`FrequencyDetectorConfig::validate`] does not hold.
    pub fn new(config: &FrequencyDetectorConfig) -> Result<Self> {
        config.validate()?;
        let w = config.width as usize;
        let h = config.height as usize;
        debug!(
            width = w,
            height = h,
            target_hz = config.target_frequency_hz,
            tolerance_hz = config.tolerance_hz,
            required_matches = config.required_matches,
            "frequency detector created"
        );
        Ok(Self {
            states: vec![PixelState::default(); w * h],
            width: w,
            height: h,
            target_frequency_hz: config.target_frequency_hz,
            tolerance_hz: config.tolerance_hz,
            required_matches: config.required_matches,
            debounce_us: config.debounce_us,
        })
    }

    /// Process one batch of time-ordered events.
    pub fn accept_batch(&mut self, events: &[Event]) {
        for event in events {
            self.accept_event(event);
        }
        trace!(
            events = events.len(),
            target_hz = self.target_frequency_hz,
            "frequency batch absorbed"
        );
    }

    /// Process a single event. Falling edges are ignored.
    pub fn accept_event(&mut self, event: &Event) {
        if !event.polarity {
            return;
        }
        let Some(idx) = event.pixel_index(self.width, self.height) else {
            trace!(x = event.x, y = event.y, "event outside sensor dropped");
            return;
        };

        let state = &mut self.states[idx];
        let dt = event.timestamp.saturating_sub(state.last_timestamp);
        state.last_timestamp = event.timestamp;

        // Also catches dt <= 0 from duplicate or out-of-order timestamps
        if dt < self.debounce_us {
            return;
        }

        let measured_hz = 1_000_000.0 / dt as f64;
        if (measured_hz - self.target_frequency_hz).abs() <= self.tolerance_hz {
            state.consecutive_matches = state
                .consecutive_matches
                .saturating_add(1)
                .min(self.required_matches);
        } else {
            state.consecutive_matches = 0;
        }
    }

    /// Whether the pixel has reached the required streak. Out-of-bounds
    /// coordinates are never detected.
    pub fn is_detected(&self, x: i16, y: i16) -> bool {
        self.pixel_state(x, y)
            .is_some_and(|s| s.consecutive_matches >= self.required_matches)
    }

    /// Write `value` into every detected pixel of a row-major
    /// `width * height` frame. Other pixels are left untouched so the outputs
    /// of several detectors can be layered onto one frame.
    ///
    /// Returns false and leaves the frame untouched if its length does not
    /// match the sensor size.
    pub fn highlight<T: Copy>(&self, frame: &mut [T], value: T) -> bool {
        if frame.len() != self.states.len() {
            return false;
        }
        for (slot, state) in frame.iter_mut().zip(&self.states) {
            if state.consecutive_matches >= self.required_matches {
                *slot = value;
            }
        }
        true
    }

    /// Row-major boolean detection mask.
    pub fn detection_mask(&self) -> Vec<bool> {
        self.states
            .iter()
            .map(|s| s.consecutive_matches >= self.required_matches)
            .collect()
    }

    /// Coordinates of all detected pixels, in row-major order.
    pub fn detected_pixels(&self) -> impl Iterator<Item = (i16, i16)> + '_ {
        let width = self.width;
        let required = self.required_matches;
        self.states
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.consecutive_matches >= required)
            .map(move |(idx, _)| ((idx % width) as i16, (idx / width) as i16))
    }

    pub fn detected_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.consecutive_matches >= self.required_matches)
            .count()
    }

    /// Copy of a pixel's state, `None` outside the sensor.
    pub fn pixel_state(&self, x: i16, y: i16) -> Option<PixelState> {
        pixel_index(x, y, self.width, self.height).map(|idx| self.states[idx])
    }

    /// Return every pixel to its initial all-zero state.
    pub fn reset(&mut self) {
        self.states.fill(PixelState::default());
        debug!(target_hz = self.target_frequency_hz, "frequency detector reset");
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn target_frequency_hz(&self) -> f64 {
        self.target_frequency_hz
    }

    pub fn tolerance_hz(&self) -> f64 {
        self.tolerance_hz
    }

    pub fn required_matches(&self) -> u32 {
        self.required_matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(target: f64, tolerance: f64, matches: u32) -> FrequencyDetector {
        FrequencyDetector::new(&FrequencyDetectorConfig::new(4, 4, target, tolerance, matches))
            .unwrap()
    }

    fn on(x: i16, y: i16, ts: i64) -> Event {
        Event::new(x, y, ts, true)
    }

    #[test]
    fn test_initial_state() {
        let det = detector(100.0, 10.0, 3);
        assert_eq!(det.detected_count(), 0);
        assert_eq!(det.pixel_state(0, 0), Some(PixelState::default()));
        assert!(!det.is_detected(0, 0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FrequencyDetectorConfig::new(4, 4, 100.0, 10.0, 0);
        assert!(FrequencyDetector::new(&config).is_err());
    }

    #[test]
    fn test_periodic_100hz_detected() {
        let mut det = detector(100.0, 10.0, 3);
        // 100 Hz = 10000 us period; first edge measures from t = 0
        let events: Vec<Event> = (1..=3).map(|i| on(1, 2, i * 10_000)).collect();
        det.accept_batch(&events);
        assert!(det.is_detected(1, 2));
        assert_eq!(det.detected_count(), 1);
        assert_eq!(det.detected_pixels().collect::<Vec<_>>(), vec![(1, 2)]);
    }

    #[test]
    fn test_streak_below_required_not_detected() {
        let mut det = detector(100.0, 10.0, 3);
        det.accept_batch(&[on(0, 0, 10_000), on(0, 0, 20_000)]);
        assert_eq!(det.pixel_state(0, 0).unwrap().consecutive_matches, 2);
        assert!(!det.is_detected(0, 0));
    }

    #[test]
    fn test_matches_clamped_at_required() {
        let mut det = detector(100.0, 10.0, 3);
        let events: Vec<Event> = (1..=20).map(|i| on(0, 0, i * 10_000)).collect();
        det.accept_batch(&events);
        assert_eq!(det.pixel_state(0, 0).unwrap().consecutive_matches, 3);
    }

    #[test]
    fn test_mismatch_resets_after_cap() {
        let mut det = detector(100.0, 10.0, 3);
        let events: Vec<Event> = (1..=5).map(|i| on(0, 0, i * 10_000)).collect();
        det.accept_batch(&events);
        assert!(det.is_detected(0, 0));

        // 5000 us -> 200 Hz, out of tolerance
        det.accept_batch(&[on(0, 0, 55_000)]);
        assert!(!det.is_detected(0, 0));
        assert_eq!(det.pixel_state(0, 0).unwrap().consecutive_matches, 0);
    }

    #[test]
    fn test_debounce_leaves_streak_unchanged() {
        let mut det = detector(100.0, 10.0, 3);
        det.accept_batch(&[on(0, 0, 10_000), on(0, 0, 20_000)]);
        assert_eq!(det.pixel_state(0, 0).unwrap().consecutive_matches, 2);

        det.accept_batch(&[on(0, 0, 20_999)]);
        let state = det.pixel_state(0, 0).unwrap();
        assert_eq!(state.consecutive_matches, 2);
        assert_eq!(state.last_timestamp, 20_999);
    }

    #[test]
    fn test_debounced_edge_restarts_interval() {
        let mut det = detector(100.0, 10.0, 3);
        det.accept_batch(&[on(0, 0, 10_000), on(0, 0, 10_500)]);
        // Interval now measured from 10_500, not 10_000
        det.accept_batch(&[on(0, 0, 20_000)]);
        // 9500 us -> 105.3 Hz, still within 10 Hz
        assert_eq!(det.pixel_state(0, 0).unwrap().consecutive_matches, 2);
    }

    #[test]
    fn test_duplicate_and_out_of_order_timestamps() {
        let mut det = detector(100.0, 10.0, 3);
        det.accept_batch(&[on(0, 0, 10_000), on(0, 0, 10_000), on(0, 0, 5_000)]);
        let state = det.pixel_state(0, 0).unwrap();
        assert_eq!(state.consecutive_matches, 1);
        assert_eq!(state.last_timestamp, 5_000);
    }

    #[test]
    fn test_falling_edges_ignored() {
        let mut det = detector(100.0, 10.0, 1);
        det.accept_batch(&[
            Event::new(0, 0, 10_000, false),
            Event::new(0, 0, 20_000, false),
        ]);
        assert_eq!(det.pixel_state(0, 0), Some(PixelState::default()));
    }

    #[test]
    fn test_tolerance_boundary_inclusive() {
        // 1e6 / 8000 = 125 Hz, exactly target + tolerance
        let mut det = detector(100.0, 25.0, 1);
        det.accept_batch(&[on(0, 0, 8_000)]);
        assert!(det.is_detected(0, 0));
    }

    #[test]
    fn test_different_pixels_independent() {
        let mut det = detector(100.0, 10.0, 2);
        let events = [
            on(0, 0, 10_000),
            on(1, 1, 5_000),
            on(0, 0, 20_000),
            on(1, 1, 10_000),
        ];
        det.accept_batch(&events);
        assert!(det.is_detected(0, 0));
        assert!(!det.is_detected(1, 1));
    }

    #[test]
    fn test_out_of_bounds_ignored() {
        let mut det = detector(100.0, 10.0, 1);
        det.accept_batch(&[on(10, 10, 10_000), on(-1, 0, 10_000)]);
        assert_eq!(det.detected_count(), 0);
        assert!(det.pixel_state(10, 10).is_none());
        assert!(!det.is_detected(10, 10));
    }

    #[test]
    fn test_highlight_overlays() {
        let mut det_100 = detector(100.0, 10.0, 1);
        let mut det_200 = detector(200.0, 20.0, 1);
        let events = [on(0, 0, 10_000), on(3, 3, 5_000)];
        det_100.accept_batch(&events);
        det_200.accept_batch(&events);

        let mut frame = vec![0u8; 16];
        assert!(det_100.highlight(&mut frame, 1));
        assert!(det_200.highlight(&mut frame, 2));
        assert_eq!(frame[0], 1);
        assert_eq!(frame[15], 2);
        assert_eq!(frame.iter().filter(|&&v| v == 0).count(), 14);
    }

    #[test]
    fn test_highlight_rejects_mismatched_frame() {
        let mut det = detector(100.0, 10.0, 1);
        det.accept_batch(&[on(0, 0, 10_000)]);

        let mut short = vec![0u8; 8];
        assert!(!det.highlight(&mut short, 255));
        assert!(short.iter().all(|&v| v == 0));

        let mut long = vec![0u8; 32];
        assert!(!det.highlight(&mut long, 255));
        assert!(long.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_queries_do_not_mutate() {
        let mut det = detector(100.0, 10.0, 1);
        det.accept_batch(&[on(2, 1, 10_000)]);
        let first = det.detection_mask();
        let second = det.detection_mask();
        assert_eq!(first, second);
        assert!(first[4 + 2]);
    }

    #[test]
    fn test_reset() {
        let mut det = detector(100.0, 10.0, 1);
        det.accept_batch(&[on(0, 0, 10_000)]);
        det.reset();
        assert_eq!(det.detected_count(), 0);
        assert_eq!(det.pixel_state(0, 0), Some(PixelState::default()));
    }
}
