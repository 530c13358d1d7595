// Coarse resident-memory observation via /proc
//
// The child's peak resident set is sampled while it runs. When no sample
// can be taken (non-Linux host, or the child exited before the first tick)
// callers fall back to the delta of this process's own resident usage.

use tokio::fs;

/// Peak resident set of `pid` in bytes (`VmHWM`, else `VmRSS`).
pub async fn peak_rss_bytes(pid: u32) -> Option<u64> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid)).await.ok()?;
    parse_status_kb(&status, "VmHWM")
        .or_else(|| parse_status_kb(&status, "VmRSS"))
        .map(|kb| kb * 1024)
}

/// Current resident set of this process in bytes.
pub async fn self_rss_bytes() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").await.ok()?;
    parse_status_kb(&status, "VmRSS").map(|kb| kb * 1024)
}

/// Reads a `Key:   1234 kB` line from a /proc status file.
fn parse_status_kb(status: &str, key: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let rest = line.strip_prefix(key)?.strip_prefix(':')?;
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Tracks the highest sample seen for one run.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeakTracker {
    peak: Option<u64>,
}

impl PeakTracker {
    pub fn observe(&mut self, sample: Option<u64>) {
        if let Some(sample) = sample {
            self.peak = Some(self.peak.map_or(sample, |p| p.max(sample)));
        }
    }

    pub fn peak(&self) -> Option<u64> {
        self.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Name:\tsh\nState:\tS (sleeping)\nVmPeak:\t    9000 kB\nVmHWM:\t    1400 kB\nVmRSS:\t    1200 kB\n";

    #[test]
    fn test_parse_status_kb() {
        assert_eq!(parse_status_kb(STATUS, "VmHWM"), Some(1400));
        assert_eq!(parse_status_kb(STATUS, "VmRSS"), Some(1200));
        assert_eq!(parse_status_kb(STATUS, "VmSwap"), None);
        // Prefix of another key must not match
        assert_eq!(parse_status_kb(STATUS, "Vm"), None);
    }

    #[test]
    fn test_zombie_status_has_no_memory_lines() {
        let zombie = "Name:\tsh\nState:\tZ (zombie)\n";
        assert_eq!(parse_status_kb(zombie, "VmHWM"), None);
        assert_eq!(parse_status_kb(zombie, "VmRSS"), None);
    }

    #[test]
    fn test_peak_tracker_keeps_maximum() {
        let mut tracker = PeakTracker::default();
        assert_eq!(tracker.peak(), None);
        tracker.observe(Some(10));
        tracker.observe(None);
        tracker.observe(Some(30));
        tracker.observe(Some(20));
        assert_eq!(tracker.peak(), Some(30));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_self_rss_is_readable_on_linux() {
        assert!(self_rss_bytes().await.unwrap_or(0) > 0);
        assert!(peak_rss_bytes(std::process::id()).await.unwrap_or(0) > 0);
        assert_eq!(peak_rss_bytes(u32::MAX).await, None);
    }
}
