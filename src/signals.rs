use crate::error::{Result, ShellError};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use signal_hook::{consts::signal::*, iterator::Signals};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

/// The pid the shell is currently blocked on, 0 when none.
///
/// Shared between the control thread, which sets and releases it around
/// every foreground wait, and the signal thread, which takes it.
#[derive(Debug, Clone, Default)]
pub struct ForegroundSlot(Arc<AtomicI32>);

impl ForegroundSlot {
    pub fn new() -> Self {
        ForegroundSlot::default()
    }

    pub fn set(&self, pid: Pid) {
        self.0.store(pid.as_raw(), Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<Pid> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }

    /// Clears the slot if it still holds `pid`. A slot already taken by the
    /// signal thread is left alone.
    pub fn release(&self, pid: Pid) {
        let _ = self
            .0
            .compare_exchange(pid.as_raw(), 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Empties the slot and returns what it held.
    pub fn take(&self) -> Option<Pid> {
        match self.0.swap(0, Ordering::SeqCst) {
            0 => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }
}

/// Ctrl-C: forwards SIGINT to the foreground process, if there is one, and
/// clears the slot. Returns the pid that was signaled.
pub fn route_interrupt(slot: &ForegroundSlot) -> Option<Pid> {
    println!("smash: got ctrl-C");
    let pid = slot.take()?;
    match kill(pid, Signal::SIGINT) {
        Ok(()) => println!("smash: process {} was killed", pid),
        Err(err) => eprintln!("{}", ShellError::sys("kill")(err)),
    }
    Some(pid)
}

/// Ctrl-Z: stops the foreground process. The slot is left for the
/// foreground wait to release once it sees the stop.
pub fn route_stop(slot: &ForegroundSlot) -> Option<Pid> {
    println!("smash: got ctrl-Z");
    let pid = slot.get()?;
    match kill(pid, Signal::SIGSTOP) {
        Ok(()) => println!("smash: process {} was stopped", pid),
        Err(err) => eprintln!("{}", ShellError::sys("kill")(err)),
    }
    Some(pid)
}

/// Installs the terminal signal handlers:
/// - SIGINT (Ctrl-C) is forwarded to the foreground process.
/// - SIGTSTP (Ctrl-Z) stops the foreground process instead of the shell.
///
/// Delivery runs on a dedicated thread, so the routing code is free to
/// print.
pub fn install_signal_handlers(slot: ForegroundSlot) -> Result<()> {
    let mut signals = Signals::new(&[SIGINT, SIGTSTP]).map_err(ShellError::io("sigaction"))?;
    thread::spawn(move || {
        for signal in signals.forever() {
            debug!(signal, "signal received");
            match signal {
                SIGINT => {
                    route_interrupt(&slot);
                }
                SIGTSTP => {
                    route_stop(&slot);
                }
                _ => unreachable!(),
            }
        }
    });
    Ok(())
}
