//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall).
//!
//! All of this is best effort: a refused syscall is logged and the run
//! continues at normal priority rather than failing the dose.

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_SET, CPU_ZERO, MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall,
        sched_get_priority_max, sched_get_priority_min, sched_param, sched_setaffinity,
        sched_setscheduler,
    };
    use std::sync::OnceLock;
    use tracing::{info, warn};
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    RT_ONCE.get_or_init(|| {
        // Memory locking; All falls back to Current on EPERM/ENOMEM.
        let lock_rc = match lock {
            RtLock::None => 0,
            RtLock::Current => unsafe { mlockall(MCL_CURRENT) },
            RtLock::All => {
                let rc = unsafe { mlockall(MCL_CURRENT | MCL_FUTURE) };
                if rc != 0 {
                    let err = std::io::Error::last_os_error();
                    if matches!(err.raw_os_error(), Some(libc::EPERM | libc::ENOMEM)) {
                        warn!("mlockall(current|future) failed ({err}); retrying current only");
                        unsafe { mlockall(MCL_CURRENT) }
                    } else {
                        rc
                    }
                } else {
                    rc
                }
            }
        };
        if lock_rc != 0 {
            warn!(
                "mlockall failed: {}; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'",
                std::io::Error::last_os_error()
            );
        }

        // SCHED_FIFO, priority clamped to the platform range.
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let prio_val = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: prio_val,
        };
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            warn!(
                "SCHED_FIFO({prio_val}) refused: {}; hint: needs CAP_SYS_NICE or root",
                std::io::Error::last_os_error()
            );
        } else {
            info!(priority = prio_val, "real-time scheduling active");
        }

        // Pin to one CPU so pulse-gap polling never migrates mid-move.
        let cpu = rt_cpu.unwrap_or(0);
        let max_bits = std::mem::size_of::<libc::cpu_set_t>() * 8;
        if cpu >= max_bits {
            warn!("--rt-cpu {cpu} out of range; skipping affinity");
        } else {
            let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            unsafe {
                CPU_ZERO(&mut set);
                CPU_SET(cpu, &mut set);
            }
            let rc =
                unsafe { sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) };
            if rc != 0 {
                warn!(
                    "pinning to CPU {cpu} failed: {}",
                    std::io::Error::last_os_error()
                );
            } else {
                info!(cpu, "process pinned");
            }
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock, _rt_cpu: Option<usize>) {
    if rt {
        tracing::warn!("--rt is only supported on Linux; running at normal priority");
    }
}
