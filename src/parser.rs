use std::mem;

use thiserror::Error;
use tracing::debug;

use crate::buffer::{Token,StringList};
use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("Syntax error: expected command name.")]
	ExpectedCommandName,
	#[error("Syntax error: expected input filename.")]
	ExpectedInputFilename,
	#[error("Syntax error: expected output filename.")]
	ExpectedOutputFilename,
	#[error("Syntax error: unexpected end of file while looking for matching {0}.")]
	UnterminatedQuote(char),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Whether a backslash escapes `next`, given the current quoting state.
///
/// Single quotes never escape. Double quotes escape only `!`, `"` and `\`.
/// Unquoted, a backslash escapes anything unless it is itself escaped.
pub fn is_escaping_slash(squotes: bool, dquotes: bool, escaped: bool, next: u8) -> bool {
	if squotes {
		false
	} else if dquotes {
		!escaped && match next {
			b'!' | b'"' | b'\\' => true,
			_ => false,
		}
	} else {
		!escaped
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Field { Name, Arguments, Input, Output }

#[derive(Debug)]
struct CommandBuilder {
	name: Option<Vec<u8>>,
	arguments: StringList,
	input: Option<Vec<u8>>,
	output: Option<Vec<u8>>,
	output_mode: OutputMode,
}

impl CommandBuilder {
	fn new() -> CommandBuilder {
		CommandBuilder {
			name: None,
			arguments: StringList::new(),
			input: None,
			output: None,
			output_mode: OutputMode::Truncate,
		}
	}

	fn build(self) -> ParseResult<Command> {
		let name = self.name.ok_or(ParseError::ExpectedCommandName)?;
		Ok(Command {
			name: name,
			arguments: self.arguments,
			input: self.input,
			output: self.output,
			output_mode: self.output_mode,
		})
	}
}

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
	token: Token,
	squotes: bool,
	dquotes: bool,
	escaped: bool,
	field: Field,
	jobs: Vec<Job>,
	commands: Vec<Command>,
	command: CommandBuilder,
}

impl<'a> Parser<'a> {
	fn new(line: &'a [u8]) -> Parser<'a> {
		Parser {
			line: line,
			i: 0,
			token: Token::new(),
			squotes: false,
			dquotes: false,
			escaped: false,
			field: Field::Name,
			jobs: vec![],
			commands: vec![],
			command: CommandBuilder::new(),
		}
	}

	/// Byte at `i`, with NUL standing for end of input.
	fn at(&self, i: usize) -> u8 {
		self.line.get(i).cloned().unwrap_or(0)
	}

	fn is_quoted(&self) -> bool {
		self.squotes || self.dquotes
	}

	fn is_special(&self) -> bool {
		!self.squotes && !self.dquotes && !self.escaped
	}

	fn commit_token(&mut self) -> ParseResult<()> {
		let r = match self.field {
			Field::Name => if self.token.is_empty() {
				Err(ParseError::ExpectedCommandName)
			} else {
				self.command.name = Some(self.token.as_bytes().to_vec());
				Ok(())
			},
			Field::Arguments => {
				if !self.token.is_empty() {
					self.command.arguments.push(self.token.as_bytes());
				}
				Ok(())
			},
			Field::Input => if self.token.is_empty() {
				Err(ParseError::ExpectedInputFilename)
			} else {
				self.command.input = Some(self.token.as_bytes().to_vec());
				Ok(())
			},
			Field::Output => if self.token.is_empty() {
				Err(ParseError::ExpectedOutputFilename)
			} else {
				self.command.output = Some(self.token.as_bytes().to_vec());
				Ok(())
			},
		};
		self.token.clear();
		r
	}

	fn finish_command(&mut self) -> ParseResult<()> {
		self.commit_token()?;
		let command = mem::replace(&mut self.command, CommandBuilder::new());
		self.commands.push(command.build()?);
		self.field = Field::Name;
		Ok(())
	}

	fn finish_job(&mut self) -> ParseResult<()> {
		self.finish_command()?;
		let commands = mem::replace(&mut self.commands, vec![]);
		self.jobs.push(Job { commands: commands });
		Ok(())
	}

	fn has_pending(&self) -> bool {
		!(self.commands.is_empty() && self.command.name.is_none() && self.token.is_empty())
	}

	fn parse_backslash(&mut self) {
		let next = self.at(self.i + 1);
		self.escaped = is_escaping_slash(self.squotes, self.dquotes, self.escaped, next);
		if !self.escaped || next == b'!' {
			self.token.push(b'\\');
		}
		self.i += 1;
	}

	fn parse_comment_or_hash(&mut self) {
		let line_start = self.i == 0 || self.line[self.i - 1] == b' ';
		if self.is_special() && line_start {
			while self.at(self.i) != b'\n' && self.at(self.i) != 0 {
				self.i += 1;
			}
		} else {
			self.token.push(b'#');
			self.i += 1;
		}
	}

	fn parse_redirect_output(&mut self) -> ParseResult<()> {
		self.commit_token()?;
		self.field = Field::Output;
		self.command.output_mode = if self.at(self.i + 1) == b'>' {
			self.i += 1;
			OutputMode::Append
		} else {
			OutputMode::Truncate
		};
		Ok(())
	}

	/// Returns `true` once the end of input has been consumed.
	fn step(&mut self) -> ParseResult<bool> {
		let c = self.at(self.i);
		match c {
			b'\\' => {
				self.parse_backslash();
				// the escape applies to the next byte
				return Ok(false);
			},
			b'\'' => {
				if self.dquotes {
					self.token.push(c);
				} else {
					self.squotes = !self.squotes;
				}
				self.i += 1;
			},
			b'"' => {
				if self.squotes || self.escaped {
					self.token.push(c);
				} else {
					self.dquotes = !self.dquotes;
				}
				self.i += 1;
			},
			b'#' => self.parse_comment_or_hash(),
			b' ' => {
				if self.is_quoted() {
					self.token.push(c);
				} else if !self.token.is_empty() {
					self.commit_token()?;
					self.field = Field::Arguments;
				}
				self.i += 1;
			},
			b'<' if self.is_special() => {
				self.commit_token()?;
				self.field = Field::Input;
				self.i += 1;
			},
			b'>' if self.is_special() => {
				self.parse_redirect_output()?;
				self.i += 1;
			},
			b'|' if self.is_special() => {
				self.finish_command()?;
				self.i += 1;
			},
			b';' | b'\n' => {
				if self.is_special() {
					if self.has_pending() {
						self.finish_job()?;
					}
				} else if c != b'\n' || !self.escaped {
					self.token.push(c);
				}
				self.i += 1;
			},
			0 => {
				if self.squotes {
					return Err(ParseError::UnterminatedQuote('\''));
				}
				if self.dquotes {
					return Err(ParseError::UnterminatedQuote('"'));
				}
				if self.has_pending() {
					self.finish_job()?;
				}
				return Ok(true);
			},
			_ => {
				self.token.push(c);
				self.i += 1;
			},
		}
		self.escaped = false;
		Ok(false)
	}

	fn parse_jobs(mut self) -> ParseResult<Jobs> {
		while !self.step()? {}
		Ok(Jobs { jobs: self.jobs })
	}
}

/// Parses one line into its pipelines. Parsing stops at the first NUL byte.
/// On error nothing of the partial parse is kept.
pub fn parse(line: &[u8]) -> ParseResult<Jobs> {
	let jobs = Parser::new(line).parse_jobs()?;
	debug!(jobs = jobs.len(), "parsed line");
	Ok(jobs)
}

#[cfg(test)]
mod test {
	use super::*;

	fn args(command: &Command) -> Vec<&[u8]> {
		command.arguments.iter().collect()
	}

	fn single(line: &[u8]) -> Command {
		let mut jobs = parse(line).unwrap();
		assert_eq!(jobs.len(), 1);
		let mut job = jobs.jobs.remove(0);
		assert_eq!(job.commands.len(), 1);
		job.commands.remove(0)
	}

	#[test]
	fn output_redirect() {
		let c = single(b"echo hi > out.txt");
		assert_eq!(c.name, b"echo");
		assert_eq!(args(&c), vec![&b"hi"[..]]);
		assert_eq!(c.output, Some(b"out.txt".to_vec()));
		assert_eq!(c.output_mode, OutputMode::Truncate);
		assert_eq!(c.input, None);
	}

	#[test]
	fn append_and_input_redirect() {
		let c = single(b"sort<in.txt>>out.txt");
		assert_eq!(c.name, b"sort");
		assert_eq!(c.input, Some(b"in.txt".to_vec()));
		assert_eq!(c.output, Some(b"out.txt".to_vec()));
		assert_eq!(c.output_mode, OutputMode::Append);
	}

	#[test]
	fn words_after_redirect_are_arguments() {
		let c = single(b"cat < in.txt -n");
		assert_eq!(c.input, Some(b"in.txt".to_vec()));
		assert_eq!(args(&c), vec![&b"-n"[..]]);
	}

	#[test]
	fn pipeline() {
		let jobs = parse(b"ls | grep foo").unwrap();
		assert_eq!(jobs.len(), 1);
		let commands = &jobs.jobs[0].commands;
		assert_eq!(commands.len(), 2);
		assert_eq!(commands[0].name, b"ls");
		assert_eq!(commands[0].arguments.len(), 0);
		assert_eq!(commands[1].name, b"grep");
		assert_eq!(args(&commands[1]), vec![&b"foo"[..]]);
		assert!(commands.iter().all(|c| c.input.is_none() && c.output.is_none()));
	}

	#[test]
	fn job_separators() {
		let jobs = parse(b"cd /tmp; pwd\nls | wc -l | cat").unwrap();
		assert_eq!(jobs.len(), 3);
		assert_eq!(jobs.jobs[0].commands[0].name, b"cd");
		assert_eq!(jobs.jobs[1].commands[0].name, b"pwd");
		assert_eq!(jobs.jobs[2].commands.len(), 3);
	}

	#[test]
	fn empty_statements_are_skipped() {
		assert_eq!(parse(b"").unwrap().len(), 0);
		assert_eq!(parse(b"   ").unwrap().len(), 0);
		assert_eq!(parse(b";;\n").unwrap().len(), 0);
		assert_eq!(parse(b"a;;b;").unwrap().len(), 2);
	}

	#[test]
	fn quotes_keep_separators() {
		let c = single(b"echo 'a  b' \"c|d;e\" f'g h'");
		assert_eq!(args(&c), vec![&b"a  b"[..], &b"c|d;e"[..], &b"fg h"[..]]);
	}

	#[test]
	fn quotes_nest_literally() {
		let c = single(b"echo \"it's\" 'say \"hi\"'");
		assert_eq!(args(&c), vec![&b"it's"[..], &b"say \"hi\""[..]]);
	}

	#[test]
	fn backslash_outside_quotes() {
		let c = single(b"echo \\| \\\\ \\>x");
		assert_eq!(args(&c), vec![&b"|"[..], &b"\\"[..], &b">x"[..]]);
	}

	#[test]
	fn escaped_space_still_separates() {
		let c = single(b"echo a\\ b");
		assert_eq!(args(&c), vec![&b"a"[..], &b"b"[..]]);
	}

	#[test]
	fn backslash_before_bang_is_kept() {
		let c = single(b"echo \\!1");
		assert_eq!(args(&c), vec![&b"\\!1"[..]]);
	}

	#[test]
	fn backslash_in_double_quotes() {
		let c = single(b"echo \"a\\\"b\" \"c\\d\" \"e\\\\f\"");
		assert_eq!(args(&c), vec![&b"a\"b"[..], &b"c\\d"[..], &b"e\\f"[..]]);
	}

	#[test]
	fn backslash_in_single_quotes() {
		let c = single(b"echo 'a\\b'");
		assert_eq!(args(&c), vec![&b"a\\b"[..]]);
	}

	#[test]
	fn escaped_newline_is_dropped() {
		let c = single(b"echo a\\\nb");
		assert_eq!(args(&c), vec![&b"ab"[..]]);
	}

	#[test]
	fn comments() {
		let c = single(b"echo a # b c");
		assert_eq!(args(&c), vec![&b"a"[..]]);
		let c = single(b"echo a#b '# c' \\#d");
		assert_eq!(args(&c), vec![&b"a#b"[..], &b"# c"[..], &b"#d"[..]]);
		assert_eq!(parse(b"# only a comment").unwrap().len(), 0);
		assert_eq!(parse(b"# skipped\necho x").unwrap().len(), 1);
	}

	#[test]
	fn missing_fields() {
		assert_eq!(parse(b"cat <<"), Err(ParseError::ExpectedInputFilename));
		assert_eq!(parse(b"cat <"), Err(ParseError::ExpectedInputFilename));
		assert_eq!(parse(b"echo >"), Err(ParseError::ExpectedOutputFilename));
		assert_eq!(parse(b"echo > ; ls"), Err(ParseError::ExpectedOutputFilename));
		assert_eq!(parse(b"| cat"), Err(ParseError::ExpectedCommandName));
		assert_eq!(parse(b"ls |"), Err(ParseError::ExpectedCommandName));
		assert_eq!(parse(b"> out"), Err(ParseError::ExpectedCommandName));
	}

	#[test]
	fn unterminated_quotes() {
		assert_eq!(parse(b"echo 'abc"), Err(ParseError::UnterminatedQuote('\'')));
		assert_eq!(parse(b"echo \"abc"), Err(ParseError::UnterminatedQuote('"')));
		assert_eq!(ParseError::UnterminatedQuote('"').to_string(),
		           "Syntax error: unexpected end of file while looking for matching \".");
	}

	#[test]
	fn stops_at_nul() {
		let c = single(b"echo a\0; rm -rf b");
		assert_eq!(args(&c), vec![&b"a"[..]]);
	}

	#[test]
	fn escaping_table() {
		assert!(!is_escaping_slash(true, false, false, b'!'));
		assert!(is_escaping_slash(false, true, false, b'!'));
		assert!(is_escaping_slash(false, true, false, b'"'));
		assert!(is_escaping_slash(false, true, false, b'\\'));
		assert!(!is_escaping_slash(false, true, false, b'n'));
		assert!(!is_escaping_slash(false, true, true, b'"'));
		assert!(is_escaping_slash(false, false, false, b'n'));
		assert!(!is_escaping_slash(false, false, true, b'n'));
	}
}
