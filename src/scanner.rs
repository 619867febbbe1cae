//! Cursor over the text of a single reply

/// On-demand tokenizer for one reply.
///
/// `pos` is the read cursor and `mark` the start of the token being built.
/// End of input is `None`; no operation fails otherwise.
#[derive(Debug, Clone)]
pub(crate) struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    mark: usize,
    last_width: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            mark: 0,
            last_width: 0,
        }
    }

    /// Next code point without consuming it.
    pub(crate) fn peek(&self) -> Option<char> {
        self.input[self.pos..]
            .chars()
            .next()
    }

    /// Consume and return the next code point.
    pub(crate) fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.last_width = c.len_utf8();
        self.pos += self.last_width;
        Some(c)
    }

    /// Undo the last [`advance`](Self::advance). Only one step is remembered.
    pub(crate) fn retreat(&mut self) {
        self.pos -= self.last_width;
        self.last_width = 0;
    }

    /// Start a new token at the cursor.
    pub(crate) fn mark_here(&mut self) {
        self.mark = self.pos;
    }

    /// Text between the mark and the cursor.
    pub(crate) fn marked(&self) -> &'a str {
        &self.input[self.mark..self.pos]
    }

    /// Unconsumed input.
    pub(crate) fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Literal match at the cursor, without consuming.
    pub(crate) fn has_prefix_at(&self, pattern: &str) -> bool {
        self.remaining()
            .starts_with(pattern)
    }

    /// Consume `pattern` if it is next; returns whether it was.
    pub(crate) fn consume_prefix(&mut self, pattern: &str) -> bool {
        if !self.has_prefix_at(pattern) {
            return false;
        }
        self.pos += pattern.len();
        self.last_width = 0;
        true
    }

    /// Consume a run of whitespace; returns the next code point, if any.
    pub(crate) fn skip_whitespace(&mut self) -> Option<char> {
        while let Some(c) = self.advance() {
            if !c.is_whitespace() {
                self.retreat();
                return Some(c);
            }
        }
        None
    }

    /// Mark, then consume while `pred` holds; returns the consumed span.
    pub(crate) fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        self.mark_here();
        while let Some(c) = self.advance() {
            if !pred(c) {
                self.retreat();
                break;
            }
        }
        self.marked()
    }

    /// Mark, then consume up to (not including) the next `\n`.
    pub(crate) fn take_line(&mut self) -> &'a str {
        self.take_while(|c| c != '\n')
    }

    /// The marked span as a signed decimal integer.
    pub(crate) fn take_as_integer(&self) -> Option<i64> {
        parse_signed(self.marked())
    }
}

/// Signed decimal, optional leading minus, digits only.
pub(crate) fn parse_signed(s: &str) -> Option<i64> {
    let digits = s
        .strip_prefix('-')
        .unwrap_or(s);
    if digits.is_empty()
        || !digits
            .bytes()
            .all(|b| b.is_ascii_digit())
    {
        return None;
    }
    s.parse()
        .ok()
}
