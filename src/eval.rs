use std::{ffi,fs,io,ptr};
use std::ffi::{CString,OsStr};
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd,OwnedFd,RawFd};
use io::{Read,Write};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{self,ForkResult};
use thiserror::Error;
use tracing::debug;

use crate::buffer::PidTable;
use crate::builtin::{self,Builtin};
use crate::global;
use crate::job;
use crate::signal;
use crate::types::*;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("{0}")]
	Nix(#[from] nix::Error),
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("argument contains a nul byte")]
	Nul(#[from] ffi::NulError),
}

/// `[name, args..., NULL]`, ready for `execvp`.
pub struct ArgVector {
	_owned: Vec<CString>,
	ptrs: Vec<*const libc::c_char>,
}

impl ArgVector {
	pub fn new(command: &Command) -> Result<ArgVector, ffi::NulError> {
		let mut owned = Vec::with_capacity(command.arguments.len() + 1);
		owned.push(CString::new(command.name.clone())?);
		for arg in command.arguments.iter() {
			owned.push(CString::new(arg)?);
		}
		let mut ptrs: Vec<*const libc::c_char> = owned.iter().map(|s| s.as_ptr()).collect();
		ptrs.push(ptr::null());
		Ok(ArgVector { _owned: owned, ptrs: ptrs })
	}

	pub fn is_terminated(&self) -> bool {
		self.ptrs.last().map_or(false, |p| p.is_null())
	}

	/// Replaces the process image. Only returns on failure.
	fn execvp(&self) -> Errno {
		debug_assert!(self.is_terminated());
		unsafe { libc::execvp(self.ptrs[0], self.ptrs.as_ptr()) };
		Errno::last()
	}
}

/// How a stage is run once its descriptors are in place.
enum Launch {
	Builtin(builtin::BuiltinFn),
	External(ArgVector),
}

/// Descriptors owned by one stage while it is launched. Dropping it closes
/// whatever the parent still holds.
struct StageFds {
	pipe_in: Option<OwnedFd>,
	pipe_out: Option<OwnedFd>,
	file_in: Option<File>,
	file_out: Option<File>,
}

impl StageFds {
	fn input(&self) -> RawFd {
		match (&self.file_in, &self.pipe_in) {
			(&Some(ref f), _) => f.as_raw_fd(),
			(&None, &Some(ref fd)) => fd.as_raw_fd(),
			(&None, &None) => libc::STDIN_FILENO,
		}
	}

	/// An output file supersedes the pipe to the next stage.
	fn output(&self) -> RawFd {
		match (&self.file_out, &self.pipe_out) {
			(&Some(ref f), _) => f.as_raw_fd(),
			(&None, &Some(ref fd)) => fd.as_raw_fd(),
			(&None, &None) => libc::STDOUT_FILENO,
		}
	}
}

fn open_input(path: &[u8]) -> io::Result<File> {
	fs::OpenOptions::new().read(true).open(OsStr::from_bytes(path))
}

fn open_output(path: &[u8], mode: OutputMode) -> io::Result<File> {
	let mut oopt = fs::OpenOptions::new();
	let _ = match mode {
		OutputMode::Truncate => oopt.write(true).truncate(true),
		OutputMode::Append => oopt.append(true),
	};
	oopt.create(true).mode(0o666).open(OsStr::from_bytes(path))
}

/// Opens the stage's redirections. On failure the diagnostic has been
/// reported and the stage must be skipped.
fn open_redirects(state: &global::State, command: &Command, fds: &mut StageFds) -> bool {
	if let Some(ref path) = command.input {
		match open_input(path) {
			Ok(f) => fds.file_in = Some(f),
			Err(e) => {
				debug!(error = %e, "input redirect failed");
				state.errors.report(format_args!("Cannot open specified input file: \"{}\"", String::from_utf8_lossy(path)));
				return false;
			},
		}
	}
	if let Some(ref path) = command.output {
		match open_output(path, command.output_mode) {
			Ok(f) => fds.file_out = Some(f),
			Err(e) => {
				debug!(error = %e, "output redirect failed");
				state.errors.report(format_args!("Cannot open specified output file: \"{}\"", String::from_utf8_lossy(path)));
				return false;
			},
		}
	}
	true
}

fn redirect_fd(from: RawFd, to: RawFd) -> nix::Result<()> {
	if from != to {
		unistd::dup2(from, to)?;
	}
	Ok(())
}

fn write_errno(status: OwnedFd, errno: Errno) {
	let mut status = File::from(status);
	let _ = status.write_all(&(errno as i32).to_ne_bytes());
}

/// Child side of a launch: wire stdin/stdout, then run the builtin or exec.
/// Failures to exec are written back through `status`.
fn exec_stage(state: &mut global::State, args: &[&[u8]], launch: Launch, fds: StageFds, status: OwnedFd) -> ! {
	signal::reset_in_child();
	let wired = redirect_fd(fds.input(), libc::STDIN_FILENO)
		.and_then(|_| redirect_fd(fds.output(), libc::STDOUT_FILENO));
	drop(fds);
	if let Err(errno) = wired {
		write_errno(status, errno);
		unsafe { libc::_exit(126) }
	}

	let code = match launch {
		Launch::Builtin(func) => {
			drop(status);
			func(state, args) as libc::c_int
		},
		Launch::External(argv) => {
			let errno = argv.execvp();
			write_errno(status, errno);
			127
		},
	};
	unsafe { libc::_exit(code) }
}

/// Reads the child's exec outcome: end of input means the image was replaced.
fn read_exec_status(status: OwnedFd) -> io::Result<Option<Errno>> {
	let mut status = File::from(status);
	let mut buf = [0u8; 4];
	let mut filled = 0;
	while filled < buf.len() {
		match status.read(&mut buf[filled..]) {
			Ok(0) => break,
			Ok(n) => filled += n,
			Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e),
		}
	}
	if filled == 0 {
		Ok(None)
	} else {
		Ok(Some(Errno::from_raw(i32::from_ne_bytes(buf))))
	}
}

fn spawn_stage(state: &mut global::State, command: &Command, args: &[&[u8]], launch: Launch, fds: StageFds) -> Result<(), ExecError> {
	let (status_read, status_write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
	match unsafe { unistd::fork() }? {
		ForkResult::Child => {
			drop(status_read);
			exec_stage(state, args, launch, fds, status_write)
		},
		ForkResult::Parent { child } => {
			drop(status_write);
			drop(fds);
			match read_exec_status(status_read)? {
				None => {
					debug!(pid = child.as_raw(), "launched {}", String::from_utf8_lossy(&command.name));
					signal::update(&mut state.processes, |t| t.push(child.as_raw()));
				},
				Some(errno) => {
					state.errors.report(format_args!("{}: {}", String::from_utf8_lossy(&command.name), errno.desc()));
				},
			}
			Ok(())
		},
	}
}

/// Runs one stage. Descriptors in `fds` are closed on every path.
fn run_stage(state: &mut global::State, command: &Command, mut fds: StageFds) {
	if !open_redirects(state, command, &mut fds) {
		return;
	}
	let args: Vec<&[u8]> = command.arguments.iter().collect();
	let launch = match builtin::match_builtin(&command.name) {
		Some(Builtin::Shell(func)) => {
			drop(fds);
			func(state, &args);
			return;
		},
		Some(Builtin::Child(func)) => Launch::Builtin(func),
		None => match ArgVector::new(command) {
			Ok(argv) => Launch::External(argv),
			Err(e) => {
				state.errors.report(format_args!("{}: {}", String::from_utf8_lossy(&command.name), ExecError::from(e)));
				return;
			},
		},
	};
	if let Err(e) = spawn_stage(state, command, &args, launch, fds) {
		state.errors.report(format_args!("{}: {}", String::from_utf8_lossy(&command.name), e));
	}
}

/// Launches every stage of `job` left to right, then reaps.
fn run_job(state: &mut global::State, job: &Job) {
	let count = job.commands.len();
	let mut prev_read: Option<OwnedFd> = None;
	signal::update(&mut state.processes, PidTable::clear);

	for (i, command) in job.commands.iter().enumerate() {
		if state.exiting {
			break;
		}
		let (next_read, pipe_out) = if i + 1 < count {
			match unistd::pipe2(OFlag::O_CLOEXEC) {
				Ok((r, w)) => (Some(r), Some(w)),
				Err(e) => {
					state.errors.report(format_args!("pipe: {}", e.desc()));
					break;
				},
			}
		} else {
			(None, None)
		};
		let fds = StageFds {
			pipe_in: prev_read.take(),
			pipe_out: pipe_out,
			file_in: None,
			file_out: None,
		};
		run_stage(state, command, fds);
		prev_read = next_read;
	}
	drop(prev_read);

	job::reap_all(&mut state.processes);
}

/// Runs the pipelines in order until they run out or `exit` was seen.
pub fn eval(state: &mut global::State, jobs: &Jobs) {
	for job in jobs.iter() {
		if state.exiting {
			break;
		}
		run_job(state, job);
	}
}
