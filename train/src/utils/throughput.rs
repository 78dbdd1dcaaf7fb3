use crate::common::*;

/// Iterations-per-second readout for the progress log.
///
/// Events accumulate through [observe](Self::observe); [poll](Self::poll)
/// reports a rate and restarts the measurement window only once the minimum
/// period has elapsed, so a log line never divides by a near-empty window.
#[derive(Debug)]
pub struct Throughput {
    events: f64,
    window_start: Instant,
    min_period: Duration,
}

impl Throughput {
    pub fn new(min_period: Duration) -> Self {
        Self {
            events: 0.0,
            window_start: Instant::now(),
            min_period,
        }
    }

    pub fn observe(&mut self, events: f64) {
        self.events += events;
    }

    pub fn poll(&mut self) -> Option<f64> {
        let elapsed = self.window_start.elapsed();
        if elapsed < self.min_period {
            return None;
        }
        let rate = self.events / elapsed.as_secs_f64();
        self.events = 0.0;
        self.window_start = Instant::now();
        Some(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_withheld_until_the_period_elapses() {
        let mut throughput = Throughput::new(Duration::from_secs(3600));
        throughput.observe(10.0);
        assert_eq!(throughput.poll(), None);

        let mut throughput = Throughput::new(Duration::ZERO);
        throughput.observe(10.0);
        std::thread::sleep(Duration::from_millis(10));
        let rate = throughput.poll().expect("an elapsed window reports a rate");
        assert!(rate > 0.0);

        // the window restarts after each report
        std::thread::sleep(Duration::from_millis(1));
        let rate = throughput.poll().expect("the fresh window is also elapsed");
        assert_eq!(rate, 0.0);
    }
}
