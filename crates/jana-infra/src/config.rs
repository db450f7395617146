//! The §6 parameter table, loadable from the environment.

use std::time::Duration;

use jana_core::cpu::ThreadCount;

/// Parameters recognized by the core (§6). An embedder builds this once and
/// passes it to whatever wires up the topology and `ProcessingController`.
#[derive(Debug, Clone)]
pub struct Parameters {
    pub nthreads: ThreadCount,
    /// Cap on emitted events; 0 means unlimited.
    pub nevents: u64,
    /// Events discarded before processing begins.
    pub nskip: u64,
    pub event_source_chunksize: usize,
    pub event_processor_chunksize: usize,
    pub ticker_interval: Duration,
    pub extended_report: bool,
    pub loglevel: tracing::Level,
    pub affinity: bool,
    pub max_inflight_events: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            nthreads: ThreadCount::Count(1),
            nevents: 0,
            nskip: 0,
            event_source_chunksize: 16,
            event_processor_chunksize: 16,
            ticker_interval: Duration::from_millis(1000),
            extended_report: false,
            loglevel: tracing::Level::INFO,
            affinity: false,
            max_inflight_events: jana_core::constants::DEFAULT_MAX_INFLIGHT_EVENTS,
        }
    }
}

impl Parameters {
    /// Reads `JANA_*` environment variables over the defaults, generalizing
    /// the dotenv-file convention to the engine's own parameter names.
    pub fn from_env() -> Self {
        let mut params = Self::default();

        if let Ok(v) = std::env::var("JANA_NTHREADS") {
            params.nthreads = if v.eq_ignore_ascii_case("Ncores") {
                ThreadCount::AllCores
            } else if let Ok(n) = v.parse() {
                ThreadCount::Count(n)
            } else {
                params.nthreads
            };
        }
        if let Ok(v) = env_u64("JANA_NEVENTS") {
            params.nevents = v;
        }
        if let Ok(v) = env_u64("JANA_NSKIP") {
            params.nskip = v;
        }
        if let Ok(v) = env_usize("JANA_EVENT_SOURCE_CHUNKSIZE") {
            params.event_source_chunksize = v;
        }
        if let Ok(v) = env_usize("JANA_EVENT_PROCESSOR_CHUNKSIZE") {
            params.event_processor_chunksize = v;
        }
        if let Ok(v) = env_u64("JANA_TICKER_INTERVAL_MS") {
            params.ticker_interval = Duration::from_millis(v);
        }
        if let Ok(v) = std::env::var("JANA_EXTENDED_REPORT") {
            params.extended_report = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("JANA_LOGLEVEL") {
            if let Ok(level) = v.parse() {
                params.loglevel = level;
            }
        }
        if let Ok(v) = std::env::var("JANA_AFFINITY") {
            params.affinity = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env_usize("JANA_MAX_INFLIGHT_EVENTS") {
            params.max_inflight_events = v;
        }

        params
    }
}

fn env_u64(key: &str) -> Result<u64, ()> {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).ok_or(())
}

fn env_usize(key: &str) -> Result<usize, ()> {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).ok_or(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let p = Parameters::default();
        assert_eq!(p.nevents, 0);
        assert_eq!(p.nskip, 0);
        assert!(!p.affinity);
    }
}
