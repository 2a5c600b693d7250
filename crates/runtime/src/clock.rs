/// Engine timebase in milliseconds.
///
/// The engine never reads the wall clock itself. Hosts pass the current time
/// into every entry point.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Millis(pub u64);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    pub fn new(ms: u64) -> Self {
        Self(ms)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn after(self, delay_ms: u64) -> Self {
        Self(self.0.saturating_add(delay_ms))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: Millis) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Millis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Millis;

    #[test]
    fn after_saturates() {
        assert_eq!(Millis(10).after(5), Millis(15));
        assert_eq!(Millis(u64::MAX).after(1), Millis(u64::MAX));
    }

    #[test]
    fn since_never_underflows() {
        assert_eq!(Millis(20).since(Millis(5)), 15);
        assert_eq!(Millis(5).since(Millis(20)), 0);
    }
}
