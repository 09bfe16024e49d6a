//! ⏰ Decides when the buffers get flushed: when enough channels are full, or
//! when the clock says so. Whichever is true last wins the label.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::app_config::BufferConfig;
use crate::buffer::BufferSet;

/// 🏷️ Why a flush happened. The scheduler only ever says `Size` or `Time`;
/// `Shutdown` labels the last flush on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Time,
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushTrigger::Size => write!(f, "size"),
            FlushTrigger::Time => write!(f, "time"),
            FlushTrigger::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct FlushScheduler {
    max_flush_size: usize,
    period: Duration,
    last_flush: Instant,
    last_flush_duration: Duration,
}

impl FlushScheduler {
    pub(crate) fn new(config: &BufferConfig, started_at: Instant) -> Self {
        Self {
            max_flush_size: config.max_flush_size,
            period: config.period(),
            last_flush: started_at,
            last_flush_duration: Duration::ZERO,
        }
    }

    /// 🎯 `Some(trigger)` when a flush is due.
    ///
    /// Size is checked first and time second, each overwriting the label, so
    /// when both hold the flush is reported as `time`. The time trigger fires
    /// on an empty buffer too; that flush writes nothing and resets the clock.
    pub(crate) fn evaluate(&self, buffers: &BufferSet, now: Instant) -> Option<FlushTrigger> {
        let mut trigger = None;
        if buffers.channel_count() >= self.max_flush_size {
            trigger = Some(FlushTrigger::Size);
        }
        if now.saturating_duration_since(self.last_flush) >= self.period {
            trigger = Some(FlushTrigger::Time);
        }
        trigger
    }

    /// ✅ Record a finished flush. The period restarts from when the write
    /// ended, not from when it started.
    pub(crate) fn complete(&mut self, finished_at: Instant, duration: Duration) {
        self.last_flush = finished_at;
        self.last_flush_duration = duration;
    }

    pub(crate) fn last_flush_duration(&self) -> Duration {
        self.last_flush_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{FieldValue, ParsedRecord};

    fn config(max_flush_size: usize, max_flush_period: u64) -> BufferConfig {
        BufferConfig {
            max_flush_size,
            max_flush_period,
        }
    }

    fn record() -> ParsedRecord {
        ParsedRecord::new(vec![FieldValue::Int(1)])
    }

    #[test]
    fn the_one_where_two_busy_channels_trip_the_size_trigger() {
        let start = Instant::now();
        let scheduler = FlushScheduler::new(&config(2, 3600), start);
        let mut buffers = BufferSet::new(["nginx", "app"]);

        buffers.append(0, record(), 1);
        buffers.append(0, record(), 1);
        assert_eq!(scheduler.evaluate(&buffers, start), None, "one channel is not two, however many records it has");

        buffers.append(1, record(), 1);
        assert_eq!(scheduler.evaluate(&buffers, start), Some(FlushTrigger::Size));
    }

    #[test]
    fn the_one_where_the_clock_flushes_an_empty_buffer() {
        let start = Instant::now();
        let scheduler = FlushScheduler::new(&config(10_000, 10), start);
        let buffers = BufferSet::new(["nginx"]);

        assert_eq!(scheduler.evaluate(&buffers, start + Duration::from_secs(9)), None);
        assert_eq!(
            scheduler.evaluate(&buffers, start + Duration::from_secs(10)),
            Some(FlushTrigger::Time)
        );
    }

    #[test]
    fn the_one_where_time_gets_the_last_word() {
        let start = Instant::now();
        let scheduler = FlushScheduler::new(&config(1, 1), start);
        let mut buffers = BufferSet::new(["nginx"]);
        buffers.append(0, record(), 1);

        assert_eq!(
            scheduler.evaluate(&buffers, start + Duration::from_secs(5)),
            Some(FlushTrigger::Time)
        );
    }

    #[test]
    fn the_one_where_complete_restarts_the_period_from_the_end_of_the_write() {
        let start = Instant::now();
        let mut scheduler = FlushScheduler::new(&config(10_000, 10), start);
        let buffers = BufferSet::new(["nginx"]);

        let finished = start + Duration::from_secs(12);
        scheduler.complete(finished, Duration::from_secs(2));
        assert_eq!(scheduler.last_flush_duration(), Duration::from_secs(2));
        assert_eq!(scheduler.evaluate(&buffers, finished + Duration::from_secs(9)), None);
        assert_eq!(
            scheduler.evaluate(&buffers, finished + Duration::from_secs(10)),
            Some(FlushTrigger::Time)
        );
        assert_eq!(FlushTrigger::Time.to_string(), "time");
    }
}
