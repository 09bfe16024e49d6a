//! 📊 One status line per flush: what went out, why, how long it took, and
//! how much memory the daemon is sitting on afterwards.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::scheduler::FlushTrigger;

const PROC_SELF_STATUS_PATH: &str = "/proc/self/status";

/// 🧾 Summary of one completed flush.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushReport {
    pub trigger: FlushTrigger,
    pub records: usize,
    pub channels: usize,
    pub bytes: usize,
    pub duration: Duration,
    /// 🧠 Resident set size in bytes, `None` where `/proc` is not a thing.
    pub resident_memory: Option<u64>,
}

impl fmt::Display for FlushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "flushed {} records from {} channels (trigger: {}, {} bytes) in {:.3}s, memory: ",
            self.records,
            self.channels,
            self.trigger,
            self.bytes,
            self.duration.as_secs_f64()
        )?;
        match self.resident_memory {
            Some(bytes) => write!(f, "{:.2} MiB", bytes as f64 / (1024.0 * 1024.0)),
            None => write!(f, "unknown"),
        }
    }
}

/// 🧠 Resident set size of this process.
pub fn resident_memory() -> Option<u64> {
    resident_memory_from_path(PROC_SELF_STATUS_PATH).ok()
}

/// Reads the `VmRSS:` line, which the kernel reports in kB.
fn resident_memory_from_path(path: &str) -> Result<u64, io::Error> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "VmRSS not found"))
}
