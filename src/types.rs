use crate::buffer::StringList;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum OutputMode { Truncate, Append }

#[derive(Debug, PartialEq, Eq)]
pub struct Command {
	pub name: Vec<u8>,
	pub arguments: StringList,
	pub input: Option<Vec<u8>>,
	pub output: Option<Vec<u8>>,
	pub output_mode: OutputMode,
}

/// One pipeline: `cmd1 | cmd2 | ...`, never empty.
#[derive(Debug, PartialEq, Eq)]
pub struct Job {
	pub commands: Vec<Command>,
}

/// Every pipeline of one input line, in `;` / newline order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Jobs {
	pub jobs: Vec<Job>,
}

impl Jobs {
	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Job> {
		self.jobs.iter()
	}
}
