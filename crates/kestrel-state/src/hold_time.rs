/// Time of a watermark hold, in milliseconds since the epoch.
///
/// The state store carries timestamps in microseconds; conversion happens
/// at the wire boundary in both directions.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct HoldTime(i64);

impl HoldTime {
    pub const ZERO: Self = Self::from_millis(0);
    pub const MAX: Self = Self::from_millis(i64::MAX);

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Convert from a wire timestamp, truncating toward zero.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros / 1000)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for HoldTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.as_millis())
    }
}
