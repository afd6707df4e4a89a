//! Background probe sampling.
//!
//! Spawns a thread that owns the `Probe`, converts millivolts to pH, and
//! publishes the latest reading through a bounded channel plus a
//! lock-free shared cell, tracking the last-ok timestamp for watchdog
//! logic. Consumers read the latest value and never block; a reading up
//! to one poll period stale is current enough for a seconds-scale
//! reaction.
//!
//! Each `ProbeSampler` owns exactly one thread, shut down when the
//! sampler is dropped.

use crossbeam_channel as xch;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use titrator_traits::{Clock, Probe, ProbeReading};
use tracing::{debug, trace, warn};

use crate::error::{Result, TitratorError};
use crate::titration::PhSource;
use crate::util::round2;

/// Nernstian slope at 25 °C, millivolts per pH unit.
const MV_PER_PH: f64 = 59.16;

/// Electrode millivolts to pH, two decimals.
pub fn ph_from_mv(mv: f64) -> f64 {
    round2(7.0 - mv / MV_PER_PH)
}

/// One converted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhSample {
    pub ph: f64,
    pub millivolts: f64,
    pub temperature_c: f64,
}

impl PhSample {
    fn from_reading(r: &ProbeReading) -> Self {
        Self {
            ph: ph_from_mv(r.millivolts),
            millivolts: r.millivolts,
            temperature_c: r.temperature_c,
        }
    }
}

/// Latest pH/temperature, readable from any thread without locks. Values
/// are bit-packed f64s; NaN bits mean no sample has arrived yet.
pub struct SharedReading {
    ph_bits: AtomicU64,
    temp_bits: AtomicU64,
}

impl SharedReading {
    fn new() -> Self {
        Self {
            ph_bits: AtomicU64::new(f64::NAN.to_bits()),
            temp_bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    fn publish(&self, sample: &PhSample) {
        self.ph_bits.store(sample.ph.to_bits(), Ordering::Relaxed);
        self.temp_bits
            .store(sample.temperature_c.to_bits(), Ordering::Relaxed);
    }

    pub fn ph(&self) -> Option<f64> {
        let v = f64::from_bits(self.ph_bits.load(Ordering::Relaxed));
        v.is_finite().then_some(v)
    }

    pub fn temperature_c(&self) -> Option<f64> {
        let v = f64::from_bits(self.temp_bits.load(Ordering::Relaxed));
        v.is_finite().then_some(v)
    }
}

pub struct ProbeSampler {
    rx: xch::Receiver<PhSample>,
    shared: Arc<SharedReading>,
    last_ok: Arc<AtomicU64>,
    epoch: Instant,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ProbeSampler {
    /// Paced sampler: one probe read per `period`, latest value wins.
    pub fn spawn<P: Probe + Send + 'static, C: Clock + Send + Sync + 'static>(
        mut probe: P,
        period: Duration,
        timeout: Duration,
        clock: C,
    ) -> Self {
        let (tx, rx) = xch::bounded(1);
        let rx_drain = rx.clone();
        let shared = Arc::new(SharedReading::new());
        let shared_clone = shared.clone();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let epoch = clock.now();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    debug!("probe sampler received shutdown signal");
                    break;
                }

                match probe.read(timeout) {
                    Ok(reading) => {
                        let sample = PhSample::from_reading(&reading);
                        trace!(
                            ph = sample.ph,
                            mv = sample.millivolts,
                            temp_c = sample.temperature_c,
                            "probe sample"
                        );
                        shared_clone.publish(&sample);
                        // Latest-wins mailbox: displace a stale sample
                        // rather than block on a slow consumer.
                        if tx.is_full() {
                            let _ = rx_drain.try_recv();
                        }
                        if let Err(xch::TrySendError::Disconnected(_)) = tx.try_send(sample) {
                            debug!("probe sampler consumer disconnected, exiting thread");
                            break;
                        }
                        last_ok_clone.store(clock.ms_since(epoch), Ordering::Relaxed);
                    }
                    Err(e) => {
                        // Transient; stall tracking covers persistent failure.
                        trace!(error = %e, "probe read failed");
                    }
                }

                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                clock.sleep(period);
            }
            trace!("probe sampler thread exiting cleanly");
        });

        Self {
            rx,
            shared,
            last_ok,
            epoch,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Drain the channel and return the newest sample, if any arrived.
    pub fn latest(&self) -> Option<PhSample> {
        self.rx.try_iter().last()
    }

    /// Shared cell for readers that outlive borrows of the sampler.
    pub fn shared(&self) -> Arc<SharedReading> {
        self.shared.clone()
    }

    /// Milliseconds since the last successful probe read.
    pub fn stalled_for_now(&self) -> u64 {
        let now_ms = {
            let dur = Instant::now().saturating_duration_since(self.epoch);
            (dur.as_millis().min(u128::from(u64::MAX))) as u64
        };
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }
}

impl PhSource for ProbeSampler {
    fn current_ph(&self) -> Result<f64> {
        self.shared
            .ph()
            .ok_or_else(|| TitratorError::Timeout.into())
    }
}

impl Drop for ProbeSampler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Thread exits at the next shutdown check; a blocking probe read
        // holds the join for at most the read timeout.
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => trace!("probe sampler thread joined"),
                Err(e) => warn!(?e, "probe sampler thread panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 7.0)]
    #[case(59.16, 6.0)]
    #[case(-59.16, 8.0)]
    #[case(148.0, 4.5)]
    #[case(29.58, 6.5)]
    fn converts_millivolts_to_ph(#[case] mv: f64, #[case] ph: f64) {
        assert!((ph_from_mv(mv) - ph).abs() < 1e-9, "mv={mv}");
    }

    #[test]
    fn latest_yields_a_fresh_sample_without_stalling() {
        let sampler = ProbeSampler::spawn(
            crate::mocks::FixedProbe {
                millivolts: 29.58,
                temperature_c: 21.3,
            },
            Duration::from_millis(5),
            Duration::from_millis(50),
            crate::mocks::InstantClock,
        );

        let deadline = Instant::now() + Duration::from_secs(3);
        let sample = loop {
            if let Some(s) = sampler.latest() {
                break s;
            }
            assert!(Instant::now() < deadline, "sampler never published");
            std::thread::sleep(Duration::from_millis(2));
        };
        assert!((sample.ph - 6.5).abs() < 1e-9);
        assert!((sample.millivolts - 29.58).abs() < 1e-9);
        assert!(sampler.stalled_for_now() < 2_000);
    }

    #[test]
    fn stall_counter_grows_when_every_read_fails() {
        let sampler = ProbeSampler::spawn(
            crate::mocks::NoopProbe,
            Duration::from_millis(5),
            Duration::from_millis(50),
            crate::mocks::InstantClock,
        );
        std::thread::sleep(Duration::from_millis(40));
        assert!(sampler.latest().is_none());
        assert!(sampler.stalled_for_now() >= 40);
    }

    #[test]
    fn shared_cell_starts_empty_then_publishes() {
        let cell = SharedReading::new();
        assert_eq!(cell.ph(), None);
        assert_eq!(cell.temperature_c(), None);
        cell.publish(&PhSample {
            ph: 6.98,
            millivolts: 1.18,
            temperature_c: 21.4,
        });
        assert_eq!(cell.ph(), Some(6.98));
        assert_eq!(cell.temperature_c(), Some(21.4));
    }
}
