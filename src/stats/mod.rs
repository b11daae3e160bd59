use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 引擎运行计数（全部 Relaxed：只用于观测，不参与同步）
#[derive(Debug, Default)]
pub struct EngineStats {
    result_hits: AtomicU64,
    result_misses: AtomicU64,
    result_expired: AtomicU64,
    index_hits: AtomicU64,
    index_builds: AtomicU64,
    aborted: AtomicU64,
    degraded: AtomicU64,
    coalesced_waits: AtomicU64,
    evictions: AtomicU64,
}

#[derive(Copy, Clone, Debug)]
pub enum Counter {
    ResultHit,
    ResultMiss,
    ResultExpired,
    IndexHit,
    IndexBuild,
    Aborted,
    Degraded,
    CoalescedWait,
    Eviction,
}

impl EngineStats {
    pub fn bump(&self, c: Counter) {
        let slot = match c {
            Counter::ResultHit => &self.result_hits,
            Counter::ResultMiss => &self.result_misses,
            Counter::ResultExpired => &self.result_expired,
            Counter::IndexHit => &self.index_hits,
            Counter::IndexBuild => &self.index_builds,
            Counter::Aborted => &self.aborted,
            Counter::Degraded => &self.degraded,
            Counter::CoalescedWait => &self.coalesced_waits,
            Counter::Eviction => &self.evictions,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self, kind: &'static str, index_entries: usize, result_entries: usize) -> StatsReport {
        StatsReport {
            kind,
            result_hits: self.result_hits.load(Ordering::Relaxed),
            result_misses: self.result_misses.load(Ordering::Relaxed),
            result_expired: self.result_expired.load(Ordering::Relaxed),
            result_evictions: self.evictions.load(Ordering::Relaxed),
            index_hits: self.index_hits.load(Ordering::Relaxed),
            index_builds: self.index_builds.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            index_entries,
            result_entries,
        }
    }
}

/// 某一时刻的计数快照（/status 直接序列化它）
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReport {
    pub kind: &'static str,
    pub result_hits: u64,
    pub result_misses: u64,
    /// misses 中由过期条目导致的部分
    pub result_expired: u64,
    pub result_evictions: u64,
    pub index_hits: u64,
    pub index_builds: u64,
    pub aborted: u64,
    pub degraded: u64,
    pub coalesced_waits: u64,
    pub index_entries: usize,
    pub result_entries: usize,
}

impl StatsReport {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.result_hits + self.result_misses;
        if total == 0 {
            0.0
        } else {
            self.result_hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║ facet-query cache report: {:<22} ║", self.kind)?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Result cache:                                    ║")?;
        writeln!(f, "║   entries:      {:>10}                       ║", self.result_entries)?;
        writeln!(f, "║   hits:         {:>10}                       ║", self.result_hits)?;
        writeln!(
            f,
            "║   misses:       {:>10}  (expired {:>8})    ║",
            self.result_misses, self.result_expired
        )?;
        writeln!(f, "║   evictions:    {:>10}                       ║", self.result_evictions)?;
        writeln!(f, "║   hit ratio:    {:>9.1}%                       ║", self.hit_ratio() * 100.0)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Index cache:                                     ║")?;
        writeln!(f, "║   entries:      {:>10}                       ║", self.index_entries)?;
        writeln!(f, "║   hits:         {:>10}                       ║", self.index_hits)?;
        writeln!(f, "║   builds:       {:>10}                       ║", self.index_builds)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Absorbed failures:                               ║")?;
        writeln!(f, "║   aborted:      {:>10}                       ║", self.aborted)?;
        writeln!(f, "║   degraded:     {:>10}                       ║", self.degraded)?;
        writeln!(f, "║   coalesced:    {:>10}                       ║", self.coalesced_waits)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_reflects_counters() {
        let s = EngineStats::default();
        s.bump(Counter::ResultHit);
        s.bump(Counter::ResultHit);
        s.bump(Counter::ResultMiss);
        s.bump(Counter::IndexBuild);
        let r = s.report("asset", 1, 2);
        assert_eq!(r.result_hits, 2);
        assert_eq!(r.result_misses, 1);
        assert_eq!(r.index_builds, 1);
        assert!((r.hit_ratio() - 2.0 / 3.0).abs() < 1e-9);

        let text = r.to_string();
        assert!(text.contains("asset"));
        assert!(text.contains("66.7%"));
    }
}
