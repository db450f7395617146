//! Background status ticker (§4.8): periodically logs a `PerformanceReport`
//! while the controller runs, the way a long-lived worker team reports its
//! own throughput on an interval instead of only at shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use jana_core::ProcessingController;

pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawns a thread that logs `controller.measure_performance()` every
    /// `interval` until `stop()` is called or the controller finishes.
    pub fn spawn(controller: Arc<ProcessingController>, interval: Duration, extended: bool) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("jana-ticker".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) && !controller.is_finished() {
                    std::thread::sleep(interval);
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let report = controller.measure_performance();
                    if extended {
                        tracing::info!(
                            events_retired = report.events_retired,
                            rate_hz = report.rate_hz,
                            wall_time = ?report.wall_time,
                            arrows = ?report.per_arrow,
                            "status"
                        );
                    } else {
                        tracing::info!(
                            events_retired = report.events_retired,
                            rate_hz = report.rate_hz,
                            "status"
                        );
                    }
                }
            })
            .expect("failed to spawn ticker thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
