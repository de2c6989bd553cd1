use std::str::FromStr;

use crate::error::Error;

/// Single polarity event from an event camera.
///
/// Field order and sizes match the C++ `dv::Event` struct (timestamp first),
/// so an event array coming from the C++ side can be handed over the FFI as-is.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    /// Microseconds.
    pub timestamp: i64,
    pub x: i16,
    pub y: i16,
    /// `true` for an OFF -> ON (rising) transition.
    pub polarity: bool,
}

impl Event {
    pub fn new(x: i16, y: i16, timestamp: i64, polarity: bool) -> Self {
        Self {
            timestamp,
            x,
            y,
            polarity,
        }
    }

    /// Flat pixel index `y * width + x`, or `None` if the event lies outside
    /// a `width x height` sensor.
    pub fn pixel_index(&self, width: usize, height: usize) -> Option<usize> {
        pixel_index(self.x, self.y, width, height)
    }
}

/// Row-major index of `(x, y)` on a `width x height` sensor, if inside it.
pub fn pixel_index(x: i16, y: i16, width: usize, height: usize) -> Option<usize> {
    if x < 0 || y < 0 {
        return None;
    }
    let x = x as usize;
    let y = y as usize;
    if x >= width || y >= height {
        return None;
    }
    Some(y * width + x)
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.x,
            self.y,
            self.timestamp,
            u8::from(self.polarity)
        )
    }
}

fn parse_polarity(field: &str) -> Option<bool> {
    match field {
        "true" => Some(true),
        "false" => Some(false),
        other => other.parse::<i8>().ok().map(|p| p > 0),
    }
}

/// Parses the tab-separated `x y timestamp polarity` form written by `Display`.
/// Any whitespace is accepted as separator.
impl FromStr for Event {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| Error::ParseEvent {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = line.split_whitespace();
        let (Some(x), Some(y), Some(ts), Some(pol)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected 4 fields"));
        };

        let x: i16 = x.parse().map_err(|_| malformed("invalid x"))?;
        let y: i16 = y.parse().map_err(|_| malformed("invalid y"))?;
        let timestamp: i64 = ts.parse().map_err(|_| malformed("invalid timestamp"))?;
        let polarity = parse_polarity(pol).ok_or_else(|| malformed("invalid polarity"))?;

        Ok(Event::new(x, y, timestamp, polarity))
    }
}
