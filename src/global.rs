use std::{fmt,io};
use io::Write;

use crate::buffer::PidTable;
use crate::history::History;

/// Where diagnostics go. Never mixed into a command's own output unless
/// explicitly routed to standard output.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorOutput { Stderr, Stdout }

impl ErrorOutput {
	/// Writes one diagnostic line.
	pub fn report<T: fmt::Display>(self, msg: T) {
		let _ = match self {
			ErrorOutput::Stderr => writeln!(&mut io::stderr(), "{}", msg),
			ErrorOutput::Stdout => {
				let mut stdout = io::stdout();
				writeln!(&mut stdout, "{}", msg).and_then(|_| stdout.flush())
			},
		};
	}
}

pub struct State {
	pub history: History,
	pub processes: PidTable,
	pub exiting: bool,
	pub errors: ErrorOutput,
}

impl State {
	pub fn new(errors: ErrorOutput) -> State {
		State {
			history: History::new(),
			processes: PidTable::new(),
			exiting: false,
			errors: errors,
		}
	}
}
