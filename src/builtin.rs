use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use io::Write;

use nix::unistd;

use crate::global;

pub type BuiltinFn = fn(&mut global::State, &[&[u8]]) -> u8;

#[derive(Clone, Copy)]
pub enum Builtin {
	/// Runs in the shell process; it changes the shell's own state.
	Shell(BuiltinFn),
	/// Runs in a forked child so its output follows the stage's redirections.
	Child(BuiltinFn),
}

pub fn builtin_cd(state: &mut global::State, args: &[&[u8]]) -> u8 {
	let dir = match args.first() {
		Some(dir) => dir,
		None => {
			state.errors.report("Too few arguments for command call.");
			return 1;
		},
	};
	match unistd::chdir(OsStr::from_bytes(dir)) {
		Ok(()) => 0,
		Err(e) => {
			state.errors.report(e.desc());
			1
		},
	}
}

pub fn builtin_exit(state: &mut global::State, _: &[&[u8]]) -> u8 {
	state.exiting = true;
	0
}

pub fn builtin_pwd(state: &mut global::State, _: &[&[u8]]) -> u8 {
	match unistd::getcwd() {
		Ok(path) => {
			let mut stdout = io::stdout();
			let r = stdout.write_all(path.as_os_str().as_bytes())
				.and_then(|_| stdout.write_all(b"\n"))
				.and_then(|_| stdout.flush());
			if r.is_ok() { 0 } else { 1 }
		},
		Err(e) => {
			state.errors.report(e.desc());
			1
		},
	}
}

pub fn builtin_history(state: &mut global::State, _: &[&[u8]]) -> u8 {
	let mut stdout = io::stdout();
	match state.history.write_to(&mut stdout).and_then(|_| stdout.flush()) {
		Ok(()) => 0,
		Err(_) => 1,
	}
}

pub fn match_builtin(name: &[u8]) -> Option<Builtin> {
	match name {
		b"cd" => Some(Builtin::Shell(builtin_cd)),
		b"exit" => Some(Builtin::Shell(builtin_exit)),
		b"pwd" => Some(Builtin::Child(builtin_pwd)),
		b"history" => Some(Builtin::Child(builtin_history)),
		_ => None,
	}
}
