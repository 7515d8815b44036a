//! Time sources.
//!
//! The engine works on two time bases:
//!
//! - **wall clock** (`now`, epoch milliseconds): only for externally visible
//!   timestamps such as the end time of a recorded session.
//! - **boot clock** (`elapsed_since_boot`, milliseconds): monotonic while the
//!   device is up, unaffected by manual clock edits or DST, reset by a reboot.
//!   All session arithmetic uses this one.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

/// Injected time source.
pub trait Clock: Send + Sync {
    /// Wall-clock time in milliseconds since the Unix epoch.
    fn now(&self) -> i64;

    /// Milliseconds since boot, including time spent suspended.
    fn elapsed_since_boot(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }

    fn elapsed_since_boot(&self) -> u64 {
        (**self).elapsed_since_boot()
    }
}

/// Host clock.
///
/// On Linux and Android the boot clock is `CLOCK_BOOTTIME`, which keeps
/// counting while the device sleeps and is shared by every process. Elsewhere
/// it falls back to a process-local [`std::time::Instant`], so snapshots
/// persisted by one process cannot be resumed by another.
#[derive(Debug, Clone)]
pub struct SystemClock {
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    origin: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(any(target_os = "linux", target_os = "android")))]
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn elapsed_since_boot(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) };
        if rc != 0 {
            warn!(
                error = %std::io::Error::last_os_error(),
                "clock_gettime(CLOCK_BOOTTIME) failed"
            );
            return 0;
        }
        (ts.tv_sec as u64)
            .saturating_mul(1000)
            .saturating_add(ts.tv_nsec as u64 / 1_000_000)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn elapsed_since_boot(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually driven clock for tests and simulations.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    wall_ms: Arc<AtomicI64>,
    elapsed_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(wall_ms: i64, elapsed_ms: u64) -> Self {
        Self {
            wall_ms: Arc::new(AtomicI64::new(wall_ms)),
            elapsed_ms: Arc::new(AtomicU64::new(elapsed_ms)),
        }
    }

    /// Move both clocks forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
        self.wall_ms.fetch_add(ms as i64, Ordering::SeqCst);
    }

    /// Set the boot clock to an absolute value. Moving it backwards simulates
    /// a reboot or a misbehaving platform clock.
    pub fn set_elapsed(&self, ms: u64) {
        self.elapsed_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_wall(&self, ms: i64) {
        self.wall_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.wall_ms.load(Ordering::SeqCst)
    }

    fn elapsed_since_boot(&self) -> u64 {
        self.elapsed_ms.load(Ordering::SeqCst)
    }
}

/// Clamps boot-clock readings so they never run backwards within a process.
///
/// A regression cannot be a reboot while the process is alive, so the last
/// observed value is kept instead.
#[derive(Debug, Default)]
pub struct MonotonicGuard {
    last_seen: u64,
}

impl MonotonicGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, raw: u64) -> u64 {
        if raw < self.last_seen {
            warn!(
                raw,
                last_seen = self.last_seen,
                "boot clock moved backwards; clamping to last observed value"
            );
            return self.last_seen;
        }
        self.last_seen = raw;
        raw
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}
