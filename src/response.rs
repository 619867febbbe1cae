//! AGI reply classification
//!
//! A reply is parsed by an explicit state machine: each [`ParseState`] is
//! handled by [`transition`], which consumes from the [`Scanner`], fills in
//! the partial response, and names the next state.

use crate::{
    constants::{
        DIGIT_TOKEN, ENDPOS_TOKEN, HANGUP_MARKER, MIN_REPLY_LEN, RESULTS_TOKEN, RESULT_TOKEN,
        USAGE_END,
    },
    error::{AgiError, AgiResult},
    scanner::{parse_signed, Scanner},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `result` of every error-family reply, and of commands that failed outright.
pub const RESULT_FAILURE: i64 = -1;

/// `result` when `result=` is present with nothing after it
/// (e.g. GET DATA where the caller pressed only `#`).
pub const RESULT_EMPTY: i64 = -3;

/// Status codes Asterisk uses on the AGI channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[repr(u16)]
pub enum ReplyCode {
    /// `100`: provisional reply, a final one follows.
    Early = 100,
    /// `200`: command executed.
    Success = 200,
    /// `503`: command not permitted in the current context.
    NotPermitted = 503,
    /// `510`: invalid or unknown command.
    InvalidCommand = 510,
    /// `511`: command not permitted on a dead channel.
    DeadChannel = 511,
    /// `520`: invalid command syntax, usage text attached.
    Usage = 520,
}

impl ReplyCode {
    /// Map a numeric status code; `None` for anything outside the known set.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            100 => Some(Self::Early),
            200 => Some(Self::Success),
            503 => Some(Self::NotPermitted),
            510 => Some(Self::InvalidCommand),
            511 => Some(Self::DeadChannel),
            520 => Some(Self::Usage),
            _ => None,
        }
    }

    /// Numeric status code.
    pub fn as_code(&self) -> u16 {
        *self as u16
    }

    /// `true` for the 5xx family.
    pub fn is_error(&self) -> bool {
        self.as_code() >= 500
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

/// One parsed AGI reply.
///
/// Every field is always present; absence is expressed by sentinels
/// ([`RESULT_EMPTY`], empty strings) or `Option`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    code: ReplyCode,
    result: i64,
    value: String,
    endpos: Option<i64>,
    digit: Option<String>,
    results: Option<i64>,
    data: String,
    raw: String,
}

impl Response {
    /// Classify a complete reply as read from the stream.
    ///
    /// ```
    /// use asterisk_agi_tokio::{ReplyCode, Response};
    ///
    /// let resp = Response::parse("200 result=1 (dtmf) endpos=123456\n").unwrap();
    /// assert_eq!(resp.code(), ReplyCode::Success);
    /// assert_eq!(resp.result(), 1);
    /// assert_eq!(resp.value(), "dtmf");
    /// assert_eq!(resp.endpos(), Some(123456));
    /// ```
    pub fn parse(raw: &str) -> AgiResult<Self> {
        if starts_with_hangup(raw) {
            return Err(AgiError::HungUp);
        }
        if raw
            .trim_end()
            .len()
            < MIN_REPLY_LEN
        {
            return Err(AgiError::InvalidReply {
                raw: raw.to_string(),
            });
        }

        let mut scanner = Scanner::new(raw);
        let mut partial = PartialResponse::default();
        let mut state = ParseState::ScanCode;

        while state != ParseState::Done {
            state = transition(state, &mut scanner, &mut partial).map_err(|fault| {
                fault.into_error(raw)
            })?;
        }

        let code = match partial.code {
            Some(code) => code,
            None => {
                return Err(AgiError::InvalidReply {
                    raw: raw.to_string(),
                })
            }
        };

        let mut response = Response {
            code,
            result: partial.result,
            value: partial.value,
            endpos: partial.endpos,
            digit: None,
            results: None,
            data: partial.data,
            raw: raw.to_string(),
        };
        if !code.is_error() {
            response.scan_trailing_tokens();
        }
        Ok(response)
    }

    /// `digit=`, `results=` and a late `endpos=` may follow other tokens.
    fn scan_trailing_tokens(&mut self) {
        for token in self
            .data
            .split_whitespace()
        {
            if let Some(digit) = token.strip_prefix(DIGIT_TOKEN) {
                if self
                    .digit
                    .is_none()
                {
                    self.digit = Some(digit.to_string());
                }
            } else if let Some(results) = token.strip_prefix(RESULTS_TOKEN) {
                if self
                    .results
                    .is_none()
                {
                    self.results = Some(parse_signed(results).unwrap_or(0));
                }
            } else if let Some(endpos) = token.strip_prefix(ENDPOS_TOKEN) {
                if self
                    .endpos
                    .is_none()
                {
                    self.endpos = Some(parse_signed(endpos).unwrap_or(0));
                }
            }
        }
    }

    /// Status code.
    pub fn code(&self) -> ReplyCode {
        self.code
    }

    /// Primary result. Always [`RESULT_FAILURE`] for 5xx replies,
    /// [`RESULT_EMPTY`] for a bare `result=`.
    pub fn result(&self) -> i64 {
        self.result
    }

    /// Parenthesized token after `result=`, empty if absent.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// `endpos=` offset, `None` if the reply carried none.
    pub fn endpos(&self) -> Option<i64> {
        self.endpos
    }

    /// `digit=` sub-field.
    pub fn digit(&self) -> Option<&str> {
        self.digit
            .as_deref()
    }

    /// `results=` sub-field (speech recognition).
    pub fn results(&self) -> Option<i64> {
        self.results
    }

    /// Free-form trailing text: error explanation or usage body.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Reply exactly as read from the stream.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `true` for `200`.
    pub fn is_success(&self) -> bool {
        self.code == ReplyCode::Success
    }

    /// `true` for `100`.
    pub fn is_early(&self) -> bool {
        self.code == ReplyCode::Early
    }

    /// `true` for the 5xx family.
    pub fn is_error(&self) -> bool {
        self.code
            .is_error()
    }

    /// `true` when `result=` was present but empty.
    pub fn is_result_empty(&self) -> bool {
        self.result == RESULT_EMPTY
    }
}

impl FromStr for Response {
    type Err = AgiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(
            self.raw
                .trim_end(),
        )
    }
}

/// First line is the out-of-band hangup notification.
pub(crate) fn starts_with_hangup(raw: &str) -> bool {
    raw.lines()
        .next()
        .map(|line| line.starts_with(HANGUP_MARKER))
        .unwrap_or(false)
}

/// Parser states. `Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseState {
    ScanCode,
    ScanResult,
    ScanValue,
    ScanEndpos,
    ScanData,
    ScanError,
    ScanErrorUsage,
    Done,
}

/// Fields accumulated while the state machine runs.
#[derive(Debug, Default)]
pub(crate) struct PartialResponse {
    code: Option<ReplyCode>,
    result: i64,
    value: String,
    endpos: Option<i64>,
    data: String,
}

/// Parse failures before the raw text is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseFault {
    MalformedCode,
    MalformedResult,
    InvalidReply,
}

impl ParseFault {
    fn into_error(self, raw: &str) -> AgiError {
        let raw = raw.to_string();
        match self {
            ParseFault::MalformedCode => AgiError::MalformedCode { raw },
            ParseFault::MalformedResult => AgiError::MalformedResult { raw },
            ParseFault::InvalidReply => AgiError::InvalidReply { raw },
        }
    }
}

/// Run one state and return the next.
pub(crate) fn transition(
    state: ParseState,
    scanner: &mut Scanner<'_>,
    partial: &mut PartialResponse,
) -> Result<ParseState, ParseFault> {
    match state {
        ParseState::ScanCode => {
            if !scanner
                .peek()
                .is_some_and(|c| c.is_ascii_digit())
            {
                return Err(ParseFault::MalformedCode);
            }
            scanner.take_while(|c| c.is_ascii_digit());
            let numeric = scanner
                .take_as_integer()
                .ok_or(ParseFault::MalformedCode)?;
            let code = ReplyCode::from_code(numeric).ok_or(ParseFault::InvalidReply)?;
            partial.code = Some(code);
            if code.is_error() {
                Ok(ParseState::ScanError)
            } else {
                Ok(ParseState::ScanResult)
            }
        }
        ParseState::ScanResult => {
            if !scanner.consume_prefix(" ") || !scanner.consume_prefix(RESULT_TOKEN) {
                return Err(ParseFault::MalformedResult);
            }
            let span = scanner.take_while(|c| !c.is_whitespace());
            partial.result = if span.is_empty() {
                RESULT_EMPTY
            } else {
                scanner
                    .take_as_integer()
                    .ok_or(ParseFault::MalformedResult)?
            };
            Ok(ParseState::ScanValue)
        }
        ParseState::ScanValue => match scanner.skip_whitespace() {
            None => Ok(ParseState::Done),
            Some('(') => {
                scanner.advance();
                partial.value = take_parenthesized(scanner).to_string();
                Ok(ParseState::ScanEndpos)
            }
            Some(_) => Ok(ParseState::ScanEndpos),
        },
        ParseState::ScanEndpos => {
            if scanner
                .skip_whitespace()
                .is_none()
            {
                return Ok(ParseState::Done);
            }
            if scanner.consume_prefix(ENDPOS_TOKEN) {
                scanner.take_while(|c| !c.is_whitespace());
                partial.endpos = Some(
                    scanner
                        .take_as_integer()
                        .unwrap_or(0),
                );
            }
            Ok(ParseState::ScanData)
        }
        ParseState::ScanData => {
            if scanner
                .skip_whitespace()
                .is_some()
            {
                partial.data = scanner
                    .take_line()
                    .trim_end()
                    .to_string();
            }
            Ok(ParseState::Done)
        }
        ParseState::ScanError => {
            partial.result = RESULT_FAILURE;
            if partial.code == Some(ReplyCode::Usage) && scanner.peek() == Some('-') {
                Ok(ParseState::ScanErrorUsage)
            } else {
                Ok(ParseState::ScanData)
            }
        }
        ParseState::ScanErrorUsage => {
            scanner.advance();
            scanner.mark_here();
            let mut at_line_start = false;
            loop {
                if at_line_start && scanner.has_prefix_at(USAGE_END) {
                    break;
                }
                match scanner.advance() {
                    Some(c) => at_line_start = c == '\n',
                    None => break,
                }
            }
            partial.data = scanner
                .marked()
                .to_string();
            Ok(ParseState::Done)
        }
        ParseState::Done => Ok(ParseState::Done),
    }
}

/// Consume up to the `)` matching an already consumed `(`.
///
/// When nesting never balances on this line the value closes at the first
/// `)` instead; with no `)` at all it runs to the end of the line.
fn take_parenthesized<'a>(scanner: &mut Scanner<'a>) -> &'a str {
    scanner.mark_here();
    let rest = scanner.remaining();
    let line = &rest[..rest
        .find('\n')
        .unwrap_or(rest.len())];

    let mut depth = 1usize;
    let matching = line
        .char_indices()
        .find(|&(_, c)| {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            depth == 0
        })
        .map(|(i, _)| i);

    match matching.or_else(|| line.find(')')) {
        Some(end) => {
            scanner.consume_prefix(&line[..end]);
            let value = scanner.marked();
            scanner.consume_prefix(")");
            value
        }
        None => {
            scanner.consume_prefix(line);
            scanner.marked()
        }
    }
}
