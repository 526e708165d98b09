//! Statement boundary rules used by the dialects.
//!
//! Every splitter trims its chunks and drops the empty ones, so separators with nothing
//! between them never produce a command.

use regex::Regex;
use std::sync::OnceLock;

fn slash_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^/\r*$").expect("valid slash regex"))
}

fn go_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)^[ \t]*GO[ \t]*\r*$").expect("valid batch regex"))
}

fn chunks<'a>(pieces: impl Iterator<Item = &'a str>) -> Vec<String> {
    pieces
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.replace("\r\n", "\n"))
        .collect()
}

/// Split on lines holding nothing but a forward slash (trailing carriage returns allowed).
pub fn split_on_slash_lines(contents: &str) -> Vec<String> {
    chunks(slash_line().split(contents))
}

/// Split on lines holding nothing but the `GO` batch separator, in any case.
pub fn split_on_go_lines(contents: &str) -> Vec<String> {
    chunks(go_line().split(contents))
}

/// Options for [`split_on_terminator`].
#[derive(Debug, Clone, Copy)]
pub struct TerminatorRules {
    pub terminator: char,
    /// Treat `` `...` `` as a quoted identifier (MySQL).
    pub backtick_identifiers: bool,
    /// Treat `$tag$ ... $tag$` as a quoted string (PostgreSQL).
    pub dollar_quoting: bool,
    /// A backslash escapes the next character inside quoted strings (MySQL).
    pub backslash_escapes: bool,
    /// Keep `CREATE TRIGGER ... BEGIN ...; END` bodies in one statement (SQLite).
    pub trigger_bodies: bool,
}

impl Default for TerminatorRules {
    fn default() -> Self {
        Self {
            terminator: ';',
            backtick_identifiers: false,
            dollar_quoting: false,
            backslash_escapes: false,
            trigger_bodies: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment(usize),
    Dollar(String),
}

/// Where the current statement stands with respect to a trigger body.
///
/// Follows the token rules of SQLite's `sqlite3_complete`: inside `CREATE [TEMP] TRIGGER`
/// a terminator only ends the statement when it directly follows `END`, and that `END`
/// must itself be the first token after a terminator.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    Start,
    Create,
    Body,
    BodySemi,
    BodyEnd,
    Plain,
}

impl Trigger {
    fn word(self, word: &str) -> Self {
        let is = |keyword: &str| word.eq_ignore_ascii_case(keyword);
        match self {
            Trigger::Start if is("create") => Trigger::Create,
            Trigger::Create if is("temp") || is("temporary") => Trigger::Create,
            Trigger::Create if is("trigger") => Trigger::Body,
            Trigger::BodySemi if is("end") => Trigger::BodyEnd,
            _ => self.token(),
        }
    }

    fn token(self) -> Self {
        match self {
            Trigger::Body | Trigger::BodySemi | Trigger::BodyEnd => Trigger::Body,
            _ => Trigger::Plain,
        }
    }

    /// The state after a terminator, or `None` when the terminator ends the statement.
    fn terminator(self) -> Option<Self> {
        match self {
            Trigger::Body | Trigger::BodySemi => Some(Trigger::BodySemi),
            _ => None,
        }
    }
}

/// Split on a statement terminator, ignoring terminators inside string literals, quoted
/// identifiers and comments. The terminator itself is not part of the returned statements.
pub fn split_on_terminator(contents: &str, rules: TerminatorRules) -> Vec<String> {
    let mut statements = Vec::new();
    let mut state = State::Normal;
    let mut trigger = Trigger::Start;
    let mut start = 0;
    let mut iter = contents.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        let next = iter.peek().map(|&(_, n)| n);
        match &mut state {
            State::Normal => match c {
                c if c == rules.terminator => match trigger.terminator() {
                    Some(inside) if rules.trigger_bodies => trigger = inside,
                    _ => {
                        statements.push(&contents[start..i]);
                        start = i + c.len_utf8();
                        trigger = Trigger::Start;
                    }
                },
                '-' if next == Some('-') => {
                    iter.next();
                    state = State::LineComment;
                }
                '/' if next == Some('*') => {
                    iter.next();
                    state = State::BlockComment(1);
                }
                c if c.is_whitespace() => {}
                c if rules.trigger_bodies && (c.is_alphabetic() || c == '_') => {
                    let word = word_at(&contents[i..]);
                    for _ in 1..word.chars().count() {
                        iter.next();
                    }
                    trigger = trigger.word(word);
                }
                _ => {
                    trigger = trigger.token();
                    match c {
                        '\'' | '"' => state = State::Quoted(c),
                        '`' if rules.backtick_identifiers => state = State::Quoted(c),
                        '$' if rules.dollar_quoting => {
                            if let Some(tag) = dollar_tag(&contents[i..]) {
                                // skip the rest of the opening tag
                                for _ in 1..tag.chars().count() {
                                    iter.next();
                                }
                                state = State::Dollar(tag);
                            }
                        }
                        _ => {}
                    }
                }
            },
            State::Quoted(quote) => {
                if rules.backslash_escapes && c == '\\' && *quote != '`' {
                    iter.next();
                } else if c == *quote {
                    if next == Some(*quote) {
                        // doubled quote is an escaped quote
                        iter.next();
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if c == '*' && next == Some('/') {
                    iter.next();
                    *depth -= 1;
                    if *depth == 0 {
                        state = State::Normal;
                    }
                } else if c == '/' && next == Some('*') {
                    iter.next();
                    *depth += 1;
                }
            }
            State::Dollar(tag) => {
                if c == '$' && contents[i..].starts_with(tag.as_str()) {
                    for _ in 1..tag.chars().count() {
                        iter.next();
                    }
                    state = State::Normal;
                }
            }
        }
    }
    statements.push(&contents[start..]);

    chunks(statements.into_iter())
}

/// The identifier-like word at the start of `text`.
fn word_at(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

/// Read a `$tag$` opening at the start of `text`, where the tag may be empty.
fn dollar_tag(text: &str) -> Option<String> {
    let rest = text.strip_prefix('$')?;
    let end = rest.find('$')?;
    let tag = &rest[..end];
    let valid = tag
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if valid {
        Some(format!("${}$", tag))
    } else {
        None
    }
}
