use std::fmt::{Display, Error, Formatter};
use std::time::Duration;

#[cfg(feature = "profiler")]
use web_time::Instant;

/// A stopwatch accumulating the wall-clock time of one stage of the pipeline.
///
/// Without the `profiler` feature every operation is a no-op and the measured time stays zero.
#[derive(Copy, Clone, Debug, Default)]
pub struct Timer {
    elapsed: Duration,
    #[cfg(feature = "profiler")]
    started_at: Option<Instant>,
}

impl Timer {
    /// A stopped timer that measured nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the time measured so far.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    /// Resets the timer and starts measuring.
    pub fn start(&mut self) {
        self.reset();
        self.resume();
    }

    /// Starts measuring again without resetting the time measured so far.
    pub fn resume(&mut self) {
        #[cfg(feature = "profiler")]
        {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stops measuring, adding the time elapsed since the last `start` or `resume`.
    pub fn pause(&mut self) {
        #[cfg(feature = "profiler")]
        {
            if let Some(started_at) = self.started_at.take() {
                self.elapsed += started_at.elapsed();
            }
        }
    }

    /// The measured time, in milliseconds.
    pub fn time(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

impl Display for Timer {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        write!(f, "{:.3}ms", self.time())
    }
}

#[cfg(test)]
mod test {
    use super::Timer;

    #[test]
    fn stopped_timer_measures_nothing() {
        let mut timer = Timer::new();
        timer.pause();
        assert_eq!(timer.time(), 0.0);
        timer.start();
        timer.pause();
        timer.reset();
        assert_eq!(timer.time(), 0.0);
    }
}
