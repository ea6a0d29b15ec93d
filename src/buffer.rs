use std::{cmp,io,process};
use io::Write;

use libc::pid_t;

const MIN_CAPACITY: usize = 8;
const MAX_GROWTH: usize = 64;

/// Sentinel for a pid table slot whose process has been reaped.
pub const TOMBSTONE: pid_t = -1;

/// Next capacity after `capacity`: ×1.5, at least 8, at most 64 more.
pub fn grown_capacity(capacity: usize) -> usize {
	cmp::min(cmp::max(capacity + capacity / 2, MIN_CAPACITY), capacity + MAX_GROWTH)
}

fn out_of_memory() -> ! {
	let _ = writeln!(&mut io::stderr(), "Application ran out of memory.");
	process::exit(1)
}

/// Grows `v` by the container growth policy until it can hold `needed` elements.
pub fn ensure_capacity<T>(v: &mut Vec<T>, needed: usize) {
	if needed <= v.capacity() {
		return;
	}
	let mut capacity = v.capacity();
	while capacity < needed {
		capacity = grown_capacity(capacity);
	}
	if v.try_reserve_exact(capacity - v.len()).is_err() {
		out_of_memory();
	}
}

/// Byte accumulator for the token being lexed.
#[derive(Debug, Default)]
pub struct Token {
	imp: Vec<u8>,
}

impl Token {
	pub fn new() -> Token {
		let mut imp = Vec::new();
		ensure_capacity(&mut imp, MIN_CAPACITY);
		Token { imp: imp }
	}

	pub fn push(&mut self, c: u8) {
		let needed = self.imp.len() + 1;
		ensure_capacity(&mut self.imp, needed);
		self.imp.push(c);
	}

	pub fn is_empty(&self) -> bool {
		self.imp.is_empty()
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.imp
	}

	pub fn clear(&mut self) {
		self.imp.clear();
	}
}

/// Ordered list of owned byte strings. Pushing always copies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StringList {
	imp: Vec<Vec<u8>>,
}

impl StringList {
	pub fn new() -> StringList {
		StringList { imp: Vec::new() }
	}

	pub fn push(&mut self, s: &[u8]) {
		let needed = self.imp.len() + 1;
		ensure_capacity(&mut self.imp, needed);
		let mut owned = Vec::new();
		ensure_capacity(&mut owned, s.len());
		owned.extend_from_slice(s);
		self.imp.push(owned);
	}

	pub fn len(&self) -> usize {
		self.imp.len()
	}

	pub fn get(&self, i: usize) -> Option<&[u8]> {
		self.imp.get(i).map(|s| &s[..])
	}

	pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
		self.imp.iter().map(|s| &s[..])
	}
}

/// Live child pids in launch order. Reaped entries become `TOMBSTONE`
/// so the remaining ones keep their positions.
#[derive(Debug, Default)]
pub struct PidTable {
	imp: Vec<pid_t>,
}

impl PidTable {
	pub fn new() -> PidTable {
		PidTable { imp: Vec::new() }
	}

	pub fn push(&mut self, pid: pid_t) {
		let needed = self.imp.len() + 1;
		ensure_capacity(&mut self.imp, needed);
		self.imp.push(pid);
	}

	/// Tombstones the first slot holding `pid`. Returns whether one was found.
	pub fn remove(&mut self, pid: pid_t) -> bool {
		match self.imp.iter_mut().find(|p| **p == pid) {
			Some(slot) => {
				*slot = TOMBSTONE;
				true
			},
			None => false,
		}
	}

	/// Oldest entry not yet reaped.
	pub fn first_live(&self) -> Option<pid_t> {
		self.imp.iter().cloned().find(|&p| p != TOMBSTONE)
	}

	pub fn live_count(&self) -> usize {
		self.imp.iter().filter(|&&p| p != TOMBSTONE).count()
	}

	pub fn len(&self) -> usize {
		self.imp.len()
	}

	pub fn clear(&mut self) {
		self.imp.clear();
	}
}
