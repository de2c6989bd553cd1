use std::panic;

use crate::config::{FrequencyDetectorConfig, PcaTrackerConfig};
use crate::event::Event;
use crate::frequency::FrequencyDetector;
use crate::pca::RollingPcaTracker;
use crate::slicer::{EventSlicer, SliceMode};

/// Builds a borrowed batch from a raw pointer/length pair. A null pointer or
/// zero length yields an empty batch.
///
/// # Safety
/// - If non-null, `events` must point to `len` initialized `Event`s.
unsafe fn batch<'a>(events: *const Event, len: usize) -> &'a [Event] {
    if events.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(events, len)
    }
}

// --- FrequencyDetector FFI ---

/// Creates a new frequency detector with the default 1 ms debounce.
///
/// Returns a null pointer if any parameter is invalid (zero dimensions,
/// non-positive target frequency, negative tolerance, zero required matches).
#[no_mangle]
pub extern "C" fn edvs_frequency_detector_create(
    width: u32,
    height: u32,
    target_frequency_hz: f64,
    tolerance_hz: f64,
    required_matches: u32,
) -> *mut FrequencyDetector {
    let config = FrequencyDetectorConfig::new(
        width,
        height,
        target_frequency_hz,
        tolerance_hz,
        required_matches,
    );
    let result = panic::catch_unwind(|| FrequencyDetector::new(&config).map(Box::new));
    match result {
        Ok(Ok(det)) => Box::into_raw(det),
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// - `det` must be a valid, non-null pointer returned by `edvs_frequency_detector_create`.
/// - `events` must point to `len` initialized `Event`s, or be null (no-op).
/// - `det` must not be used concurrently from multiple threads.
/// - The caller must not have called `edvs_frequency_detector_destroy` on `det`.
#[no_mangle]
pub unsafe extern "C" fn edvs_frequency_detector_accept_batch(
    det: *mut FrequencyDetector,
    events: *const Event,
    len: usize,
) {
    if det.is_null() {
        return;
    }
    let det_ref = &mut *det;
    let events = batch(events, len);
    let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| det_ref.accept_batch(events)));
}

/// # Safety
/// - `det` must be a valid pointer returned by `edvs_frequency_detector_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_frequency_detector_is_detected(
    det: *const FrequencyDetector,
    x: i16,
    y: i16,
) -> bool {
    if det.is_null() {
        return false;
    }
    (*det).is_detected(x, y)
}

/// Writes `value` into every detected pixel of a row-major frame of
/// `width * height` bytes (e.g. one channel of a mask image). Returns false
/// and leaves the frame untouched if `len` does not match the sensor size.
///
/// # Safety
/// - `det` must be a valid pointer returned by `edvs_frequency_detector_create`, or null.
/// - `frame` must point to `len` writable bytes, or be null.
#[no_mangle]
pub unsafe extern "C" fn edvs_frequency_detector_highlight(
    det: *const FrequencyDetector,
    frame: *mut u8,
    len: usize,
    value: u8,
) -> bool {
    if det.is_null() || frame.is_null() {
        return false;
    }
    let frame = std::slice::from_raw_parts_mut(frame, len);
    (*det).highlight(frame, value)
}

/// # Safety
/// - `det` must be a valid pointer returned by `edvs_frequency_detector_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_frequency_detector_detected_count(
    det: *const FrequencyDetector,
) -> usize {
    if det.is_null() {
        return 0;
    }
    (*det).detected_count()
}

/// # Safety
/// - `det` must be a valid pointer returned by `edvs_frequency_detector_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_frequency_detector_reset(det: *mut FrequencyDetector) {
    if !det.is_null() {
        let det_ref = &mut *det;
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| det_ref.reset()));
    }
}

/// # Safety
///
/// - `det` must be a valid pointer returned by `edvs_frequency_detector_create`,
///   or null (in which case this is a no-op).
/// - After this call, `det` is invalid and must not be used again.
#[no_mangle]
pub unsafe extern "C" fn edvs_frequency_detector_destroy(det: *mut FrequencyDetector) {
    if !det.is_null() {
        drop(Box::from_raw(det));
    }
}

// --- RollingPcaTracker FFI ---

/// Creates a new rolling PCA tracker.
///
/// Returns a null pointer if `max_window_size` is less than 2.
#[no_mangle]
pub extern "C" fn edvs_pca_tracker_create(max_window_size: usize) -> *mut RollingPcaTracker {
    let config = PcaTrackerConfig::new(max_window_size);
    let result = panic::catch_unwind(|| RollingPcaTracker::new(&config).map(Box::new));
    match result {
        Ok(Ok(tracker)) => Box::into_raw(tracker),
        _ => std::ptr::null_mut(),
    }
}

/// # Safety
///
/// - `tracker` must be a valid, non-null pointer returned by `edvs_pca_tracker_create`.
/// - `events` must point to `len` initialized `Event`s, or be null (no-op).
/// - `tracker` must not be used concurrently from multiple threads.
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_accept_batch(
    tracker: *mut RollingPcaTracker,
    events: *const Event,
    len: usize,
) {
    if tracker.is_null() {
        return;
    }
    let tracker_ref = &mut *tracker;
    let events = batch(events, len);
    let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| tracker_ref.accept_batch(events)));
}

/// Writes the window mean into `out_mean_x` / `out_mean_y`.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `edvs_pca_tracker_create`, or null.
/// - Output pointers must be valid for writes, or null (skipped).
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_get_means(
    tracker: *const RollingPcaTracker,
    out_mean_x: *mut f64,
    out_mean_y: *mut f64,
) -> bool {
    if tracker.is_null() {
        return false;
    }
    let [mx, my] = (*tracker).mean();
    if !out_mean_x.is_null() {
        *out_mean_x = mx;
    }
    if !out_mean_y.is_null() {
        *out_mean_y = my;
    }
    true
}

/// Writes both eigenvalues, largest first.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `edvs_pca_tracker_create`, or null.
/// - Output pointers must be valid for writes, or null (skipped).
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_get_eigenvalues(
    tracker: *const RollingPcaTracker,
    out_eigenvalue_0: *mut f64,
    out_eigenvalue_1: *mut f64,
) -> bool {
    if tracker.is_null() {
        return false;
    }
    let [l0, l1] = (*tracker).eigenvalues();
    if !out_eigenvalue_0.is_null() {
        *out_eigenvalue_0 = l0;
    }
    if !out_eigenvalue_1.is_null() {
        *out_eigenvalue_1 = l1;
    }
    true
}

/// Writes the eigenvectors into a `double[2][2]`, row `i` for eigenvalue `i`.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `edvs_pca_tracker_create`, or null.
/// - `out_vectors` must point to 4 writable `f64`s, or be null.
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_get_eigenvectors(
    tracker: *const RollingPcaTracker,
    out_vectors: *mut [f64; 2],
) -> bool {
    if tracker.is_null() || out_vectors.is_null() {
        return false;
    }
    let vectors = (*tracker).eigenvectors();
    std::ptr::copy_nonoverlapping(vectors.as_ptr(), out_vectors, 2);
    true
}

/// # Safety
/// - `tracker` must be a valid pointer returned by `edvs_pca_tracker_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_window_len(tracker: *const RollingPcaTracker) -> usize {
    if tracker.is_null() {
        return 0;
    }
    (*tracker).window_len()
}

/// # Safety
/// - `tracker` must be a valid pointer returned by `edvs_pca_tracker_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_reset(tracker: *mut RollingPcaTracker) {
    if !tracker.is_null() {
        let tracker_ref = &mut *tracker;
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| tracker_ref.reset()));
    }
}

/// # Safety
///
/// - `tracker` must be a valid pointer returned by `edvs_pca_tracker_create`,
///   or null (in which case this is a no-op).
/// - After this call, `tracker` is invalid and must not be used again.
#[no_mangle]
pub unsafe extern "C" fn edvs_pca_tracker_destroy(tracker: *mut RollingPcaTracker) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

// --- EventSlicer FFI ---

/// Hands a completed batch to the caller as a boxed slice, or null.
///
/// # Safety
/// - `out_len` must be a valid, non-null pointer.
unsafe fn into_raw_batch(batch: Option<Vec<Event>>, out_len: *mut usize) -> *mut Event {
    match batch {
        Some(batch) => {
            let batch = batch.into_boxed_slice();
            *out_len = batch.len();
            Box::into_raw(batch) as *mut Event
        }
        None => {
            *out_len = 0;
            std::ptr::null_mut()
        }
    }
}

/// `mode`: 0 = ByCount, 1 = ByTime.
#[no_mangle]
pub extern "C" fn edvs_slicer_create(mode: i32, threshold: i64) -> *mut EventSlicer {
    let Some(m) = SliceMode::from_i32(mode) else {
        return std::ptr::null_mut();
    };
    let result = panic::catch_unwind(|| Box::new(EventSlicer::new(m, threshold)));
    match result {
        Ok(s) => Box::into_raw(s),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Pushes one event. If it completed a batch, returns a heap-allocated array
/// of `*out_len` events which the caller must free with
/// `edvs_slicer_free_batch`; otherwise returns null.
///
/// # Safety
/// - `slicer`, `event` and `out_len` must be valid, non-null pointers.
#[no_mangle]
pub unsafe extern "C" fn edvs_slicer_push(
    slicer: *mut EventSlicer,
    event: *const Event,
    out_len: *mut usize,
) -> *mut Event {
    if slicer.is_null() || event.is_null() || out_len.is_null() {
        return std::ptr::null_mut();
    }
    let s_ref = &mut *slicer;
    let ev = *event;
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| s_ref.push(ev))).unwrap_or(None);
    into_raw_batch(result, out_len)
}

/// Takes the pending partial batch at end of stream. Same ownership contract
/// as `edvs_slicer_push`: a non-null result must be freed with
/// `edvs_slicer_free_batch`.
///
/// # Safety
/// - `slicer` and `out_len` must be valid, non-null pointers.
#[no_mangle]
pub unsafe extern "C" fn edvs_slicer_flush(
    slicer: *mut EventSlicer,
    out_len: *mut usize,
) -> *mut Event {
    if slicer.is_null() || out_len.is_null() {
        return std::ptr::null_mut();
    }
    let s_ref = &mut *slicer;
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| s_ref.flush())).unwrap_or(None);
    into_raw_batch(result, out_len)
}

/// Free a batch returned by `edvs_slicer_push` or `edvs_slicer_flush`.
///
/// # Safety
/// - `ptr` must be a pointer returned by `edvs_slicer_push`, or null.
/// - `len` must be the length returned via `out_len`.
#[no_mangle]
pub unsafe extern "C" fn edvs_slicer_free_batch(ptr: *mut Event, len: usize) {
    if !ptr.is_null() && len > 0 {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)));
    }
}

/// # Safety
/// - `slicer` must be a valid pointer returned by `edvs_slicer_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_slicer_reset(slicer: *mut EventSlicer) {
    if !slicer.is_null() {
        let s_ref = &mut *slicer;
        let _ = panic::catch_unwind(panic::AssertUnwindSafe(|| s_ref.reset()));
    }
}

/// # Safety
/// - `slicer` must be a valid pointer returned by `edvs_slicer_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn edvs_slicer_destroy(slicer: *mut EventSlicer) {
    if !slicer.is_null() {
        drop(Box::from_raw(slicer));
    }
}
