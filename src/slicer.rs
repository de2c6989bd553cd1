use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Slicing mode for the event stream slicer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceMode {
    /// Slice by event count — emits a batch after every N events.
    ByCount = 0,
    /// Slice by time window — emits a batch every T microseconds.
    ByTime = 1,
}

impl SliceMode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(SliceMode::ByCount),
            1 => Some(SliceMode::ByTime),
            _ => None,
        }
    }
}

/// Event stream slicer — groups a stream into batches by count or by time.
///
/// In `ByTime` mode a batch is closed by the first event that lies at least
/// `threshold` microseconds past the batch start; that event opens the next
/// batch. Downstream detector and tracker results do not depend on where the
/// cuts fall.
pub struct EventSlicer {
    mode: SliceMode,
    threshold: i64,
    buffer: Vec<Event>,
    window_start: Option<i64>,
}

impl EventSlicer {
    /// Create a new event slicer.
    ///
    /// - `mode`: `ByCount` or `ByTime`.
    /// - `threshold`: Number of events (ByCount) or microseconds (ByTime) per slice.
    ///
    /// # Panics
    /// Panics if `threshold` is not positive.
    pub fn new(mode: SliceMode, threshold: i64) -> Self {
        assert!(threshold > 0, "threshold must be positive");
        Self {
            mode,
            threshold,
            buffer: Vec::new(),
            window_start: None,
        }
    }

    /// Add an event. Returns the completed batch if this event closed one.
    pub fn push(&mut self, event: Event) -> Option<Vec<Event>> {
        match self.mode {
            SliceMode::ByCount => {
                self.buffer.push(event);
                if self.buffer.len() as i64 >= self.threshold {
                    Some(std::mem::take(&mut self.buffer))
                } else {
                    None
                }
            }
            SliceMode::ByTime => {
                let ts = event.timestamp;
                let start = *self.window_start.get_or_insert(ts);
                if ts.saturating_sub(start) >= self.threshold {
                    self.window_start = Some(ts);
                    let batch = std::mem::replace(&mut self.buffer, vec![event]);
                    Some(batch)
                } else {
                    self.buffer.push(event);
                    None
                }
            }
        }
    }

    /// Feed a run of events, calling `on_batch` for every batch completed.
    pub fn accept<F: FnMut(&[Event])>(&mut self, events: &[Event], mut on_batch: F) {
        for event in events {
            if let Some(batch) = self.push(*event) {
                on_batch(&batch);
            }
        }
    }

    /// Take whatever partial batch is pending, e.g. at end of stream.
    pub fn flush(&mut self) -> Option<Vec<Event>> {
        self.window_start = None;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Number of events buffered in the open batch.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop the open batch and start over.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.window_start = None;
    }

    pub fn mode(&self) -> SliceMode {
        self.mode
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(ts: i64) -> Event {
        Event::new(0, 0, ts, true)
    }

    #[test]
    fn test_by_count_emits_at_threshold() {
        let mut slicer = EventSlicer::new(SliceMode::ByCount, 5);
        for i in 0..4 {
            assert!(slicer.push(ev(i * 1000)).is_none(), "should not emit before threshold");
        }
        let batch = slicer.push(ev(4000)).expect("should emit at 5th event");
        assert_eq!(batch.len(), 5);
        assert_eq!(slicer.pending(), 0);
    }

    #[test]
    fn test_by_count_repeats() {
        let mut slicer = EventSlicer::new(SliceMode::ByCount, 3);
        let events: Vec<Event> = (0..12).map(|i| ev(i * 1000)).collect();
        let mut batches = 0;
        slicer.accept(&events, |batch| {
            assert_eq!(batch.len(), 3);
            batches += 1;
        });
        assert_eq!(batches, 4); // 12 / 3 = 4
    }

    #[test]
    fn test_by_time_emits_at_window() {
        let mut slicer = EventSlicer::new(SliceMode::ByTime, 10_000);
        assert!(slicer.push(ev(1000)).is_none());
        assert!(slicer.push(ev(5000)).is_none());
        assert!(slicer.push(ev(9000)).is_none());
        let batch = slicer.push(ev(11_000)).expect("should emit at 10ms");
        let stamps: Vec<i64> = batch.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1000, 5000, 9000]);
        // The closing event opens the next batch
        assert_eq!(slicer.pending(), 1);
    }

    #[test]
    fn test_by_time_repeats() {
        let mut slicer = EventSlicer::new(SliceMode::ByTime, 10_000);
        let events: Vec<Event> = (0..50).map(|i| ev(i * 1000)).collect();
        let mut total = 0;
        let mut batches = 0;
        slicer.accept(&events, |batch| {
            total += batch.len();
            batches += 1;
        });
        assert_eq!(batches, 4);
        total += slicer.flush().map_or(0, |b| b.len());
        assert_eq!(total, 50, "no event may be lost");
    }

    #[test]
    fn test_flush_returns_partial_batch() {
        let mut slicer = EventSlicer::new(SliceMode::ByCount, 10);
        slicer.push(ev(1));
        slicer.push(ev(2));
        assert_eq!(slicer.flush().unwrap().len(), 2);
        assert!(slicer.flush().is_none());
    }

    #[test]
    fn test_reset() {
        let mut slicer = EventSlicer::new(SliceMode::ByCount, 3);
        slicer.push(ev(1000));
        slicer.push(ev(2000));
        slicer.reset();
        // Buffer dropped, need 3 more events
        assert!(slicer.push(ev(3000)).is_none());
        assert!(slicer.push(ev(4000)).is_none());
        assert!(slicer.push(ev(5000)).is_some());
    }

    #[test]
    fn test_from_i32() {
        assert_eq!(SliceMode::from_i32(0), Some(SliceMode::ByCount));
        assert_eq!(SliceMode::from_i32(1), Some(SliceMode::ByTime));
        assert_eq!(SliceMode::from_i32(99), None);
    }

    #[test]
    #[should_panic(expected = "threshold must be positive")]
    fn test_zero_threshold() {
        EventSlicer::new(SliceMode::ByTime, 0);
    }
}
