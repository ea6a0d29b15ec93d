use libc::pid_t;
use nix::errno::Errno;
use nix::sys::wait::{self,WaitStatus};
use tracing::{debug,warn};

use crate::buffer::PidTable;
use crate::signal;

pub trait WaitStatusExt {
	fn get_pid(self) -> Option<pid_t>;
	fn describe(self) -> String;
}

impl WaitStatusExt for WaitStatus {
	fn get_pid(self) -> Option<pid_t> {
		self.pid().map(|pid| pid.as_raw())
	}

	fn describe(self) -> String {
		match self {
			WaitStatus::Exited(_, code) => format!("exited with {}", code),
			WaitStatus::Signaled(_, sig, true) => format!("killed by {} (core dumped)", sig),
			WaitStatus::Signaled(_, sig, false) => format!("killed by {}", sig),
			WaitStatus::Stopped(_, sig) => format!("stopped by {}", sig),
			WaitStatus::Continued(_) => "continued".to_string(),
			WaitStatus::StillAlive => "still alive".to_string(),
			#[allow(unreachable_patterns)]
			_ => format!("{:?}", self),
		}
	}
}

/// Waits for every child of the shell, not only those in `table`, and
/// tombstones each tracked pid as it is reaped. An interrupt interrupts the
/// wait after the handler has passed it on, and waiting resumes.
pub fn reap_all(table: &mut PidTable) {
	debug!(tracked = table.len(), live = table.live_count(), "reaping children");
	loop {
		match wait::wait() {
			Ok(status) => {
				if let Some(pid) = status.get_pid() {
					let tracked = signal::update(table, |t| t.remove(pid));
					debug!(pid, tracked, "child {}", status.describe());
				}
			},
			Err(Errno::EINTR) => {},
			Err(Errno::ECHILD) => break,
			Err(e) => {
				warn!(error = %e, "wait failed");
				break;
			},
		}
	}
	signal::update(table, PidTable::clear);
}
