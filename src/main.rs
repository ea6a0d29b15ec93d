mod buffer;
mod builtin;
mod eval;
mod global;
mod history;
mod job;
mod parser;
mod signal;
mod types;

use std::{env,fs,io,process};
use std::io::{BufRead,IsTerminal,Write};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use clap::Parser;
use nix::unistd;
use tracing::{debug,warn};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "HSH_LOG";

#[derive(Debug, Parser)]
#[command(version, about = "A small interactive shell with pipelines, redirections and !N history")]
struct Args {
	/// Read commands from this file instead of standard input.
	script: Option<PathBuf>,

	/// Write diagnostics to standard output instead of standard error.
	#[arg(long)]
	errors_to_stdout: bool,

	/// Always print the prompt.
	#[arg(long, conflicts_with = "no_prompt")]
	prompt: bool,

	/// Never print the prompt.
	#[arg(long)]
	no_prompt: bool,
}

fn user_name() -> String {
	match unistd::User::from_uid(unistd::getuid()) {
		Ok(Some(user)) => user.name,
		_ => env::var("USER").unwrap_or_else(|_| "unknown_user".to_string()),
	}
}

fn print_prompt() {
	let mut stdout = io::stdout();
	let cwd = unistd::getcwd().unwrap_or_default();
	let _ = write!(&mut stdout, "{}:", user_name());
	let _ = stdout.write_all(cwd.as_os_str().as_bytes());
	let _ = stdout.write_all(b"$ ");
	let _ = stdout.flush();
}

fn trim_last_newline(line: &mut Vec<u8>) {
	if line.last() == Some(&b'\n') {
		line.pop();
	}
}

/// Substitutes, parses, records and runs one input line.
fn run_line(state: &mut global::State, mut line: Vec<u8>) {
	if let Err(e) = history::substitute(&mut line, &state.history) {
		state.errors.report(e);
		return;
	}
	trim_last_newline(&mut line);
	let jobs = match parser::parse(&line) {
		Ok(jobs) => jobs,
		Err(e) => {
			state.errors.report(e);
			return;
		},
	};
	state.history.push(&line);
	debug!(?jobs, "running");
	eval::eval(state, &jobs);
}

fn run<R: BufRead>(state: &mut global::State, mut input: R, show_prompt: bool) -> io::Result<()> {
	while !state.exiting {
		if show_prompt {
			print_prompt();
		}
		let mut line: Vec<u8> = vec![];
		if input.read_until(b'\n', &mut line)? == 0 {
			break;
		}
		run_line(state, line);
	}
	Ok(())
}

fn main() {
	let args = Args::parse();

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")))
		.with_writer(io::stderr)
		.init();

	if let Err(e) = signal::install() {
		warn!(error = %e, "cannot install SIGINT handler");
	}

	let errors = if args.errors_to_stdout { global::ErrorOutput::Stdout } else { global::ErrorOutput::Stderr };
	let mut state = global::State::new(errors);

	let r = match args.script {
		Some(ref path) => match fs::File::open(path) {
			Ok(file) => run(&mut state, io::BufReader::new(file), args.prompt),
			Err(e) => {
				errors.report(format_args!("{}: {}", path.display(), e));
				process::exit(1);
			},
		},
		None => {
			let stdin = io::stdin();
			let show_prompt = args.prompt || (!args.no_prompt && stdin.is_terminal());
			run(&mut state, stdin.lock(), show_prompt)
		},
	};
	if let Err(e) = r {
		debug!(error = %e, "input closed");
	}
}
