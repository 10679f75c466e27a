//! Interrupt handling.
//!
//! The harness runs one target at a time, as the leader of its own process
//! group. The group id is published here so that a SIGINT, SIGTERM, or
//! SIGHUP aimed at the harness kills the target and everything it forked
//! before the harness itself dies.
use std::sync::atomic::{AtomicI32, Ordering};

static LIVE_GROUP: AtomicI32 = AtomicI32::new(0);

const FORWARDED: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

pub fn register(pgid: u32) {
    if let Ok(pgid) = i32::try_from(pgid) {
        LIVE_GROUP.store(pgid, Ordering::SeqCst);
    }
}

/// Forget `pgid` unless a newer target has been registered since.
pub fn clear(pgid: u32) {
    if let Ok(pgid) = i32::try_from(pgid) {
        let _ = LIVE_GROUP.compare_exchange(pgid, 0, Ordering::SeqCst, Ordering::SeqCst);
    }
}

#[cfg(test)]
pub fn live_group() -> Option<u32> {
    match LIVE_GROUP.load(Ordering::SeqCst) {
        0 => None,
        pgid => u32::try_from(pgid).ok(),
    }
}

// Only async-signal-safe calls below.
extern "C" fn on_signal(signal: libc::c_int) {
    let pgid = LIVE_GROUP.swap(0, Ordering::SeqCst);
    // SAFETY: kill, signal and raise are async-signal-safe.
    unsafe {
        if pgid > 0 {
            libc::kill(-pgid, libc::SIGKILL);
        }
        libc::signal(signal, libc::SIG_DFL);
        libc::raise(signal);
    }
}

pub fn install() {
    for signal in FORWARDED {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        // SAFETY: the handler only touches an atomic and async-signal-safe libc calls.
        let previous = unsafe { libc::signal(signal, handler) };
        if previous == libc::SIG_ERR {
            tracing::warn!(signal, "failed to install interrupt handler");
        }
    }
}
