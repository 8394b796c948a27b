use std::time::Duration;

/// Fixed-step accumulator: `while acc >= step { tick; acc -= step }`.
///
/// At most `max_steps` ticks are released per accumulate call; time beyond
/// that is dropped (and reported) instead of snowballing into a death spiral.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    accumulator: Duration,
    max_steps: u32,
    released: u32,
    dropped: Duration,
}

impl FixedStep {
    pub fn new(tick_rate: u32, max_steps: u32) -> Self {
        Self {
            step: Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1))),
            accumulator: Duration::ZERO,
            max_steps: max_steps.max(1),
            released: 0,
            dropped: Duration::ZERO,
        }
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    pub fn accumulate(&mut self, elapsed: Duration) {
        self.accumulator += elapsed;
        self.released = 0;
    }

    /// Take one step out of the accumulator if a whole one is available.
    pub fn consume(&mut self) -> bool {
        if self.accumulator < self.step {
            return false;
        }
        if self.released == self.max_steps {
            let whole = self.accumulator.as_nanos() / self.step.as_nanos();
            let remainder = self.accumulator - self.step * whole as u32;
            self.dropped += self.accumulator - remainder;
            self.accumulator = remainder;
            return false;
        }
        self.accumulator -= self.step;
        self.released += 1;
        true
    }

    /// Leftover fraction of a step in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        (self.accumulator.as_secs_f64() / self.step.as_secs_f64()) as f32
    }

    /// Time discarded since the last call.
    pub fn take_dropped(&mut self) -> Duration {
        std::mem::take(&mut self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_whole_steps_only() {
        let mut clock = FixedStep::new(50, 10);
        clock.accumulate(Duration::from_millis(45));
        assert!(clock.consume());
        assert!(clock.consume());
        assert!(!clock.consume());
        assert!((clock.alpha() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn caps_catch_up_and_drops_the_excess() {
        let mut clock = FixedStep::new(100, 3);
        clock.accumulate(Duration::from_millis(105));
        let mut steps = 0;
        while clock.consume() {
            steps += 1;
        }
        assert_eq!(steps, 3);
        assert_eq!(clock.take_dropped(), Duration::from_millis(70));
        assert!((clock.alpha() - 0.5).abs() < 1e-6);
        assert_eq!(clock.take_dropped(), Duration::ZERO);
    }
}
