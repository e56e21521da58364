/// Rate limiter for per-pulse progress lines.
#[derive(Debug, Clone, Copy)]
pub struct LogThrottle {
    every: u64,
}

impl LogThrottle {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }

    /// True on the first call of each window of `every` counts.
    pub fn due(&self, count: u64) -> bool {
        count % self.every == 0
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(5000)
    }
}
