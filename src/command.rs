//! Command serialization

use crate::{
    constants::{EMPTY_ARGUMENT, LINE_TERMINATOR},
    error::{AgiError, AgiResult},
};

/// Validate that a user-provided string contains no newline characters.
///
/// AGI commands are line-delimited; embedded newlines would allow injection
/// of arbitrary protocol commands.
fn validate_no_newlines(s: &str, context: &str) -> AgiResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(AgiError::protocol_error(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Wrap free text in double quotes, escaping `\` and `"`.
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Token(String),
    Quoted(String),
}

/// Builder for one command line.
///
/// Arguments are pre-stringified. An empty token is sent as `""` so Asterisk
/// sees an explicitly empty value; an omitted optional argument is not sent
/// at all.
///
/// ```
/// use asterisk_agi_tokio::CommandBuilder;
///
/// let line = CommandBuilder::new("STREAM FILE")
///     .arg("beep")
///     .arg("")
///     .opt_arg(None::<u32>)
///     .build()
///     .unwrap();
/// assert_eq!(line, "STREAM FILE beep \"\"\n");
/// ```
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    verb: String,
    args: Vec<Arg>,
}

impl CommandBuilder {
    /// Start a command with its verb (`ANSWER`, `GET VARIABLE`, ...).
    pub fn new(verb: &str) -> Self {
        Self {
            verb: verb.to_string(),
            args: Vec::new(),
        }
    }

    /// Append a bare token.
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args
            .push(Arg::Token(value.to_string()));
        self
    }

    /// Append a token when present; `None` is omitted.
    pub fn opt_arg(self, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.arg(v),
            None => self,
        }
    }

    /// Append free text, double-quoted.
    pub fn quoted(mut self, text: impl Into<String>) -> Self {
        self.args
            .push(Arg::Quoted(text.into()));
        self
    }

    /// Validate and produce the wire line, terminator included.
    pub fn build(self) -> AgiResult<String> {
        validate_no_newlines(&self.verb, "command verb")?;
        let mut line = self.verb;
        for arg in &self.args {
            line.push(' ');
            match arg {
                Arg::Token(token) => {
                    validate_no_newlines(token, "command argument")?;
                    if token.is_empty() {
                        line.push_str(EMPTY_ARGUMENT);
                    } else {
                        line.push_str(token);
                    }
                }
                Arg::Quoted(text) => {
                    validate_no_newlines(text, "command argument")?;
                    line.push_str(&quote(text));
                }
            }
        }
        line.push_str(LINE_TERMINATOR);
        Ok(line)
    }
}

/// AGI commands understood by Asterisk.
///
/// `escape_digits` fields list the DTMF digits that interrupt playback;
/// an empty string means none.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AgiCommand {
    /// Answer the channel
    Answer,
    /// Leave AsyncAGI and resume the dialplan
    AsyncAgiBreak,
    /// Query the state of this (or another) channel
    ChannelStatus { channel: Option<String> },
    /// Play a file the caller can fast-forward and rewind
    ControlStreamFile {
        file: String,
        escape_digits: String,
        skip_ms: Option<u32>,
    },
    /// Delete an AstDB key
    DatabaseDel { family: String, key: String },
    /// Delete an AstDB family or key tree
    DatabaseDelTree {
        family: String,
        key_tree: Option<String>,
    },
    /// Read an AstDB key
    DatabaseGet { family: String, key: String },
    /// Write an AstDB key
    DatabasePut {
        family: String,
        key: String,
        value: String,
    },
    /// Run a dialplan application
    Exec { application: String, options: String },
    /// Play a prompt and collect DTMF
    GetData {
        file: String,
        timeout_ms: u32,
        max_digits: u32,
    },
    /// Evaluate an expression with full variable substitution
    GetFullVariable {
        expression: String,
        channel: Option<String>,
    },
    /// Like STREAM FILE with a digit timeout
    GetOption {
        file: String,
        escape_digits: String,
        timeout_ms: Option<u32>,
    },
    /// Read a channel variable
    GetVariable { name: String },
    /// Run a dialplan subroutine
    Gosub {
        context: String,
        extension: String,
        priority: String,
        arguments: Option<String>,
    },
    /// Hang up this (or another) channel
    Hangup { channel: Option<String> },
    /// Do nothing
    Noop,
    /// Receive one character (text-capable channels)
    ReceiveChar { timeout_ms: u32 },
    /// Record audio to a file
    RecordFile {
        file: String,
        format: String,
        escape_digits: String,
        /// `-1` for no timeout
        timeout_ms: i64,
        offset_samples: Option<u64>,
        beep: bool,
        silence_s: Option<u32>,
    },
    /// Spell out a string
    SayAlpha { text: String, escape_digits: String },
    /// Say a date/time given as epoch seconds
    SayDateTime {
        epoch: i64,
        escape_digits: String,
        format: Option<String>,
        timezone: Option<String>,
    },
    /// Say a digit string one digit at a time
    SayDigits { number: String, escape_digits: String },
    /// Say a number
    SayNumber {
        number: String,
        escape_digits: String,
        gender: Option<String>,
    },
    /// Spell out a string phonetically
    SayPhonetic { text: String, escape_digits: String },
    /// Send an image (image-capable channels)
    SendImage { image: String },
    /// Send text (text-capable channels)
    SendText { text: String },
    /// Hang up after the given number of seconds (0 cancels)
    SetAutoHangup { seconds: u32 },
    /// Set the caller ID
    SetCallerId { number: String },
    /// Set the dialplan context to continue in
    SetContext { context: String },
    /// Set the dialplan extension to continue in
    SetExtension { extension: String },
    /// Toggle music on hold
    SetMusic { on: bool, class: Option<String> },
    /// Set the dialplan priority to continue in
    SetPriority { priority: String },
    /// Set a channel variable
    SetVariable { name: String, value: String },
    /// Play a file
    StreamFile {
        file: String,
        escape_digits: String,
        offset_samples: Option<u64>,
    },
    /// Toggle TDD mode
    TddMode { on: bool },
    /// Log a message on the Asterisk console
    Verbose { message: String, level: Option<u8> },
    /// Wait for one DTMF digit; `-1` waits forever
    WaitForDigit { timeout_ms: i64 },
    /// Anything not covered above
    Raw { verb: String, args: Vec<String> },
}

impl AgiCommand {
    /// Wire verb, e.g. `GET VARIABLE`.
    pub fn verb(&self) -> &str {
        match self {
            AgiCommand::Answer => "ANSWER",
            AgiCommand::AsyncAgiBreak => "ASYNCAGI BREAK",
            AgiCommand::ChannelStatus { .. } => "CHANNEL STATUS",
            AgiCommand::ControlStreamFile { .. } => "CONTROL STREAM FILE",
            AgiCommand::DatabaseDel { .. } => "DATABASE DEL",
            AgiCommand::DatabaseDelTree { .. } => "DATABASE DELTREE",
            AgiCommand::DatabaseGet { .. } => "DATABASE GET",
            AgiCommand::DatabasePut { .. } => "DATABASE PUT",
            AgiCommand::Exec { .. } => "EXEC",
            AgiCommand::GetData { .. } => "GET DATA",
            AgiCommand::GetFullVariable { .. } => "GET FULL VARIABLE",
            AgiCommand::GetOption { .. } => "GET OPTION",
            AgiCommand::GetVariable { .. } => "GET VARIABLE",
            AgiCommand::Gosub { .. } => "GOSUB",
            AgiCommand::Hangup { .. } => "HANGUP",
            AgiCommand::Noop => "NOOP",
            AgiCommand::ReceiveChar { .. } => "RECEIVE CHAR",
            AgiCommand::RecordFile { .. } => "RECORD FILE",
            AgiCommand::SayAlpha { .. } => "SAY ALPHA",
            AgiCommand::SayDateTime { .. } => "SAY DATETIME",
            AgiCommand::SayDigits { .. } => "SAY DIGITS",
            AgiCommand::SayNumber { .. } => "SAY NUMBER",
            AgiCommand::SayPhonetic { .. } => "SAY PHONETIC",
            AgiCommand::SendImage { .. } => "SEND IMAGE",
            AgiCommand::SendText { .. } => "SEND TEXT",
            AgiCommand::SetAutoHangup { .. } => "SET AUTOHANGUP",
            AgiCommand::SetCallerId { .. } => "SET CALLERID",
            AgiCommand::SetContext { .. } => "SET CONTEXT",
            AgiCommand::SetExtension { .. } => "SET EXTENSION",
            AgiCommand::SetMusic { .. } => "SET MUSIC",
            AgiCommand::SetPriority { .. } => "SET PRIORITY",
            AgiCommand::SetVariable { .. } => "SET VARIABLE",
            AgiCommand::StreamFile { .. } => "STREAM FILE",
            AgiCommand::TddMode { .. } => "TDD MODE",
            AgiCommand::Verbose { .. } => "VERBOSE",
            AgiCommand::WaitForDigit { .. } => "WAIT FOR DIGIT",
            AgiCommand::Raw { verb, .. } => verb.as_str(),
        }
    }

    /// Validate all user-supplied fields, then convert to wire format.
    pub fn to_wire_format(&self) -> AgiResult<String> {
        let cmd = CommandBuilder::new(self.verb());
        let cmd = match self {
            AgiCommand::Answer
            | AgiCommand::AsyncAgiBreak
            | AgiCommand::Noop => cmd,
            AgiCommand::ChannelStatus { channel } | AgiCommand::Hangup { channel } => {
                cmd.opt_arg(channel.as_deref())
            }
            AgiCommand::ControlStreamFile {
                file,
                escape_digits,
                skip_ms,
            } => cmd
                .arg(file)
                .arg(escape_digits)
                .opt_arg(*skip_ms),
            AgiCommand::DatabaseDel { family, key } | AgiCommand::DatabaseGet { family, key } => {
                cmd.arg(family)
                    .arg(key)
            }
            AgiCommand::DatabaseDelTree { family, key_tree } => cmd
                .arg(family)
                .opt_arg(key_tree.as_deref()),
            AgiCommand::DatabasePut { family, key, value } => cmd
                .arg(family)
                .arg(key)
                .quoted(value.as_str()),
            AgiCommand::Exec {
                application,
                options,
            } => {
                let cmd = cmd.arg(application);
                if options.is_empty() {
                    cmd.arg("")
                } else {
                    cmd.quoted(options.as_str())
                }
            }
            AgiCommand::GetData {
                file,
                timeout_ms,
                max_digits,
            } => cmd
                .arg(file)
                .arg(timeout_ms)
                .arg(max_digits),
            AgiCommand::GetFullVariable {
                expression,
                channel,
            } => cmd
                .quoted(expression.as_str())
                .opt_arg(channel.as_deref()),
            AgiCommand::GetOption {
                file,
                escape_digits,
                timeout_ms,
            } => cmd
                .arg(file)
                .arg(escape_digits)
                .opt_arg(*timeout_ms),
            AgiCommand::GetVariable { name } => cmd.arg(name),
            AgiCommand::Gosub {
                context,
                extension,
                priority,
                arguments,
            } => {
                let cmd = cmd
                    .arg(context)
                    .arg(extension)
                    .arg(priority);
                match arguments {
                    Some(a) => cmd.quoted(a.as_str()),
                    None => cmd,
                }
            }
            AgiCommand::ReceiveChar { timeout_ms } => cmd.arg(timeout_ms),
            AgiCommand::RecordFile {
                file,
                format,
                escape_digits,
                timeout_ms,
                offset_samples,
                beep,
                silence_s,
            } => cmd
                .arg(file)
                .arg(format)
                .arg(escape_digits)
                .arg(timeout_ms)
                .opt_arg(*offset_samples)
                .opt_arg(beep.then_some("BEEP"))
                .opt_arg(silence_s.map(|s| format!("s={}", s))),
            AgiCommand::SayAlpha {
                text,
                escape_digits,
            }
            | AgiCommand::SayPhonetic {
                text,
                escape_digits,
            } => cmd
                .arg(text)
                .arg(escape_digits),
            AgiCommand::SayDateTime {
                epoch,
                escape_digits,
                format,
                timezone,
            } => {
                let cmd = cmd
                    .arg(epoch)
                    .arg(escape_digits);
                match (format, timezone) {
                    (None, None) => cmd,
                    (Some(f), None) => cmd.quoted(f.as_str()),
                    // timezone is positional after format
                    (None, Some(tz)) => cmd
                        .arg("")
                        .arg(tz),
                    (Some(f), Some(tz)) => cmd
                        .quoted(f.as_str())
                        .arg(tz),
                }
            }
            AgiCommand::SayDigits {
                number,
                escape_digits,
            } => cmd
                .arg(number)
                .arg(escape_digits),
            AgiCommand::SayNumber {
                number,
                escape_digits,
                gender,
            } => cmd
                .arg(number)
                .arg(escape_digits)
                .opt_arg(gender.as_deref()),
            AgiCommand::SendImage { image } => cmd.arg(image),
            AgiCommand::SendText { text } => cmd.quoted(text.as_str()),
            AgiCommand::SetAutoHangup { seconds } => cmd.arg(seconds),
            AgiCommand::SetCallerId { number } => cmd.quoted(number.as_str()),
            AgiCommand::SetContext { context } => cmd.arg(context),
            AgiCommand::SetExtension { extension } => cmd.arg(extension),
            AgiCommand::SetMusic { on, class } => cmd
                .arg(if *on { "on" } else { "off" })
                .opt_arg(class.as_deref()),
            AgiCommand::SetPriority { priority } => cmd.arg(priority),
            AgiCommand::SetVariable { name, value } => cmd
                .arg(name)
                .quoted(value.as_str()),
            AgiCommand::StreamFile {
                file,
                escape_digits,
                offset_samples,
            } => cmd
                .arg(file)
                .arg(escape_digits)
                .opt_arg(*offset_samples),
            AgiCommand::TddMode { on } => cmd.arg(if *on { "on" } else { "off" }),
            AgiCommand::Verbose { message, level } => cmd
                .quoted(message.as_str())
                .opt_arg(*level),
            AgiCommand::WaitForDigit { timeout_ms } => cmd.arg(timeout_ms),
            AgiCommand::Raw { args, .. } => args
                .iter()
                .fold(cmd, |cmd, a| cmd.arg(a)),
        };
        cmd.build()
    }
}
