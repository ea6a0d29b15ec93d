use std::{io,iter};
use io::Write;

use thiserror::Error;
use tracing::debug;

use crate::buffer::{self,StringList};
use crate::parser::is_escaping_slash;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
	#[error("Cannot find history command with number {0}. To see available history commands type \"history\".")]
	NotFound(usize),
	#[error("History substitution did not terminate: command number {0} expands to itself.")]
	Cycle(usize),
}

/// Append-only log of accepted input lines, numbered from 1.
#[derive(Debug, Default)]
pub struct History {
	lines: StringList,
}

impl History {
	pub fn new() -> History {
		History { lines: StringList::new() }
	}

	pub fn push(&mut self, line: &[u8]) {
		self.lines.push(line);
	}

	pub fn len(&self) -> usize {
		self.lines.len()
	}

	/// Entry `n`, counting from 1.
	pub fn get(&self, n: usize) -> Option<&[u8]> {
		if n == 0 {
			None
		} else {
			self.lines.get(n - 1)
		}
	}

	pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
		for (i, line) in self.lines.iter().enumerate() {
			write!(out, "#{}: ", i + 1)?;
			out.write_all(line)?;
			out.write_all(b"\n")?;
		}
		Ok(())
	}
}

/// A live `!N` found in a line: bytes `start..end` name entry `n`.
struct Reference {
	start: usize,
	end: usize,
	n: usize,
	dquotes: bool,
}

/// One splice performed by `substitute`. `parent` is the splice whose text
/// contained the reference, `None` for the typed line.
struct Expansion {
	parent: Option<usize>,
	n: usize,
	dquotes: bool,
}

fn find_reference(line: &[u8]) -> Option<Reference> {
	let at = |i: usize| line.get(i).cloned().unwrap_or(0);
	let mut i = 0;
	let mut escaped = false;
	let mut squotes = false;
	let mut dquotes = false;
	while at(i) != 0 {
		match at(i) {
			b'\\' => {
				escaped = is_escaping_slash(squotes, dquotes, escaped, at(i + 1));
				i += 1;
				continue;
			},
			b'\'' => if !dquotes {
				squotes = !squotes;
			},
			b'"' => if !squotes && !escaped {
				dquotes = !dquotes;
			},
			b'!' if !squotes && !escaped => {
				let mut end = i + 1;
				let mut n: usize = 0;
				while at(end).is_ascii_digit() {
					n = n.saturating_mul(10).saturating_add((at(end) - b'0') as usize);
					end += 1;
				}
				return Some(Reference { start: i, end: end, n: n, dquotes: dquotes });
			},
			_ => {},
		}
		i += 1;
		escaped = false;
	}
	None
}

/// Whether entry `n`, met in the same quoting context, is already being
/// expanded by one of the splices enclosing `origin`. Expanding it again
/// would repeat that splice's growth forever.
fn is_cycle(expansions: &[Expansion], mut origin: Option<usize>, n: usize, dquotes: bool) -> bool {
	while let Some(i) = origin {
		let e = &expansions[i];
		if e.n == n && e.dquotes == dquotes {
			return true;
		}
		origin = e.parent;
	}
	false
}

/// Rewrites every live `!N` in `line` with history entry `N`, rescanning from
/// the start after each splice so references inside entries expand too.
///
/// Single quotes and backslashes protect `!`; double quotes do not.
pub fn substitute(line: &mut Vec<u8>, history: &History) -> Result<(), HistoryError> {
	// origins[i] is the splice that produced line[i].
	let mut origins: Vec<Option<usize>> = vec![None; line.len()];
	let mut expansions: Vec<Expansion> = Vec::new();

	while let Some(r) = find_reference(line) {
		let entry = history.get(r.n).ok_or(HistoryError::NotFound(r.n))?;
		let parent = origins[r.start];
		if is_cycle(&expansions, parent, r.n, r.dquotes) {
			return Err(HistoryError::Cycle(r.n));
		}
		debug!(n = r.n, entries = history.len(), "history substitution");

		let id = expansions.len();
		buffer::ensure_capacity(&mut expansions, id + 1);
		expansions.push(Expansion { parent: parent, n: r.n, dquotes: r.dquotes });

		let needed = line.len() - (r.end - r.start) + entry.len();
		buffer::ensure_capacity(line, needed);
		line.splice(r.start..r.end, entry.iter().cloned());
		buffer::ensure_capacity(&mut origins, needed);
		origins.splice(r.start..r.end, iter::repeat(Some(id)).take(entry.len()));
	}
	Ok(())
}
