//! SIGINT forwarding.
//!
//! The handler passes the interrupt straight on to the oldest stage that is
//! still running. It reads that pid from an atomic mirror of the shell's
//! process table, which is republished with SIGINT blocked every time the
//! table changes.

use std::sync::atomic::{AtomicI32,Ordering};

use libc::pid_t;
use nix::errno::Errno;
use nix::sys::signal::{self,SaFlags,SigAction,SigHandler,SigSet,SigmaskHow,Signal};
use tracing::{debug,warn};

use crate::buffer::{PidTable,TOMBSTONE};

/// First live pid of the table being waited on, or `TOMBSTONE`.
static FOREGROUND: AtomicI32 = AtomicI32::new(TOMBSTONE);

extern "C" fn on_interrupt(_: libc::c_int) {
	let pid = FOREGROUND.load(Ordering::SeqCst);
	if pid > 0 {
		let errno = Errno::last_raw();
		unsafe { libc::kill(pid, libc::SIGINT) };
		Errno::set_raw(errno);
	}
}

/// Installs the SIGINT handler. `SA_RESTART` is left off so a blocking
/// `wait` returns `EINTR` once the interrupt has been passed on.
pub fn install() -> nix::Result<()> {
	let action = SigAction::new(SigHandler::Handler(on_interrupt), SaFlags::empty(), SigSet::empty());
	unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
	Ok(())
}

/// Restores default dispositions in a forked child: SIGINT ends a builtin
/// stage instead of being relayed to a sibling, and SIGPIPE, which the Rust
/// runtime ignores, ends a writer whose reader has gone.
pub fn reset_in_child() {
	let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
	for &sig in &[Signal::SIGINT, Signal::SIGPIPE] {
		let _ = unsafe { signal::sigaction(sig, &action) };
	}
}

/// Holds SIGINT off for the calling thread until dropped.
struct Blocked {
	previous: SigSet,
}

impl Blocked {
	fn sigint() -> Blocked {
		let mut only = SigSet::empty();
		only.add(Signal::SIGINT);
		let mut previous = SigSet::empty();
		if let Err(e) = signal::pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&only), Some(&mut previous)) {
			warn!(error = %e, "failed to block SIGINT");
		}
		Blocked { previous: previous }
	}
}

impl Drop for Blocked {
	fn drop(&mut self) {
		if let Err(e) = signal::pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
			warn!(error = %e, "failed to restore signal mask");
		}
	}
}

/// Applies `f` to `table` with SIGINT blocked, then publishes the table's
/// oldest live pid to the handler. An interrupt that arrives meanwhile is
/// delivered on unblocking and reaches the new target.
pub fn update<R, F: FnOnce(&mut PidTable) -> R>(table: &mut PidTable, f: F) -> R {
	let blocked = Blocked::sigint();
	let result = f(table);
	let pid = table.first_live().unwrap_or(TOMBSTONE);
	let previous = FOREGROUND.swap(pid, Ordering::SeqCst);
	if previous != pid {
		debug!(pid, "SIGINT target");
	}
	drop(blocked);
	result
}
