//! Convenience wrappers that run one command and interpret its result.
//!
//! [`AgiSession::execute`] and [`AgiSession::send_command`] hand back any
//! well-formed reply as-is. The methods here know what each command's
//! `result=` means and turn failure values into [`AgiError::CommandFailed`].

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::{
    channel::ChannelStatus,
    command::AgiCommand,
    constants::RESULT_TOKEN,
    error::{AgiError, AgiResult},
    response::{Response, RESULT_FAILURE},
    session::AgiSession,
};

/// Outcome of a playback command that can be interrupted by a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    /// Key that interrupted playback, if any.
    pub digit: Option<char>,
    /// Sample offset where playback stopped.
    pub endpos: Option<i64>,
}

/// Digits collected by `GET DATA`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedDigits {
    /// Digits as typed, leading zeros and `*` kept.
    pub digits: String,
    /// Input ended on the inter-digit timeout rather than `#` or the
    /// digit limit.
    pub timed_out: bool,
}

fn command_failed(command: &AgiCommand, raw: &str) -> AgiError {
    AgiError::CommandFailed {
        command: command
            .verb()
            .to_string(),
        raw: raw.to_string(),
    }
}

/// Key press encoded as its character code in `result=`.
fn digit_from_result(result: i64) -> Option<char> {
    if result <= 0 {
        return None;
    }
    u32::try_from(result)
        .ok()
        .and_then(char::from_u32)
}

/// Text of the `result=` token, before any integer conversion.
fn result_text(raw: &str) -> Option<&str> {
    let start = raw.find(RESULT_TOKEN)? + RESULT_TOKEN.len();
    let rest = &raw[start..];
    let end = rest
        .find(char::is_whitespace)
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

fn is_keypad(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || c == '*' || c == '#')
}

impl<S> AgiSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Run a command; error codes (`5xx`) and `result=-1` become
    /// [`AgiError::CommandFailed`].
    async fn run(&mut self, command: AgiCommand) -> AgiResult<Response> {
        let resp = self
            .send_command(&command)
            .await?;
        if resp.is_error() || resp.result() == RESULT_FAILURE {
            debug!("{} failed: {}", command.verb(), resp);
            return Err(command_failed(&command, resp.raw()));
        }
        Ok(resp)
    }

    /// Answer the channel.
    pub async fn answer(&mut self) -> AgiResult<()> {
        self.run(AgiCommand::Answer)
            .await
            .map(|_| ())
    }

    /// Hang up the current channel, or the named one.
    pub async fn hangup(&mut self, channel: Option<&str>) -> AgiResult<()> {
        self.run(AgiCommand::Hangup {
            channel: channel.map(str::to_string),
        })
        .await
        .map(|_| ())
    }

    /// Do nothing; useful as a liveness probe.
    pub async fn noop(&mut self) -> AgiResult<()> {
        self.run(AgiCommand::Noop)
            .await
            .map(|_| ())
    }

    /// Log a message to the Asterisk console.
    pub async fn verbose(&mut self, message: &str) -> AgiResult<()> {
        self.run(AgiCommand::Verbose {
            message: message.to_string(),
            level: None,
        })
        .await
        .map(|_| ())
    }

    /// Read a channel variable. `None` when it is not set.
    pub async fn get_variable(&mut self, name: &str) -> AgiResult<Option<String>> {
        let resp = self
            .run(AgiCommand::GetVariable {
                name: name.to_string(),
            })
            .await?;
        Ok(match resp.result() {
            1 => Some(
                resp.value()
                    .to_string(),
            ),
            _ => None,
        })
    }

    /// Evaluate an expression such as `${CALLERID(num)}`, optionally on
    /// another channel.
    pub async fn get_full_variable(
        &mut self,
        expression: &str,
        channel: Option<&str>,
    ) -> AgiResult<Option<String>> {
        let resp = self
            .run(AgiCommand::GetFullVariable {
                expression: expression.to_string(),
                channel: channel.map(str::to_string),
            })
            .await?;
        Ok(match resp.result() {
            1 => Some(
                resp.value()
                    .to_string(),
            ),
            _ => None,
        })
    }

    /// Set a channel variable.
    pub async fn set_variable(&mut self, name: &str, value: &str) -> AgiResult<()> {
        self.run(AgiCommand::SetVariable {
            name: name.to_string(),
            value: value.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Play a sound file, stopping early on any of `escape_digits`.
    ///
    /// A missing file is reported by Asterisk as `result=-1` and surfaces
    /// as [`AgiError::CommandFailed`].
    pub async fn stream_file(&mut self, file: &str, escape_digits: &str) -> AgiResult<Playback> {
        let resp = self
            .run(AgiCommand::StreamFile {
                file: file.to_string(),
                escape_digits: escape_digits.to_string(),
                offset_samples: None,
            })
            .await?;
        Ok(Playback {
            digit: digit_from_result(resp.result()),
            endpos: resp.endpos(),
        })
    }

    /// Wait for one key press. `None` on timeout; a negative timeout waits
    /// forever.
    pub async fn wait_for_digit(&mut self, timeout_ms: i64) -> AgiResult<Option<char>> {
        let resp = self
            .run(AgiCommand::WaitForDigit { timeout_ms })
            .await?;
        Ok(digit_from_result(resp.result()))
    }

    /// Play a prompt and collect up to `max_digits` key presses.
    pub async fn get_data(
        &mut self,
        file: &str,
        timeout_ms: u32,
        max_digits: u32,
    ) -> AgiResult<CollectedDigits> {
        let command = AgiCommand::GetData {
            file: file.to_string(),
            timeout_ms,
            max_digits,
        };
        // `*` makes the result non-numeric; such replies are still answers
        let raw = match self
            .send_command(&command)
            .await
        {
            Ok(resp) => {
                if resp.is_error() || resp.result() == RESULT_FAILURE {
                    return Err(command_failed(&command, resp.raw()));
                }
                resp.raw()
                    .to_string()
            }
            Err(AgiError::MalformedResult { raw })
                if result_text(&raw).map_or(false, is_keypad) =>
            {
                raw
            }
            Err(e) => return Err(e),
        };

        let digits = result_text(&raw)
            .unwrap_or_default()
            .to_string();
        Ok(CollectedDigits {
            digits,
            timed_out: raw.contains("(timeout)"),
        })
    }

    /// Run a dialplan application. Returns the application's own result.
    ///
    /// `-2` (application not found) surfaces as [`AgiError::CommandFailed`].
    pub async fn exec(&mut self, application: &str, options: &str) -> AgiResult<i64> {
        let command = AgiCommand::Exec {
            application: application.to_string(),
            options: options.to_string(),
        };
        let resp = self
            .send_command(&command)
            .await?;
        if resp.is_error() || resp.result() == -2 {
            return Err(command_failed(&command, resp.raw()));
        }
        Ok(resp.result())
    }

    /// Read an AstDB entry. `None` when the key does not exist.
    pub async fn database_get(&mut self, family: &str, key: &str) -> AgiResult<Option<String>> {
        let resp = self
            .run(AgiCommand::DatabaseGet {
                family: family.to_string(),
                key: key.to_string(),
            })
            .await?;
        Ok(match resp.result() {
            1 => Some(
                resp.value()
                    .to_string(),
            ),
            _ => None,
        })
    }

    /// Store an AstDB entry.
    pub async fn database_put(&mut self, family: &str, key: &str, value: &str) -> AgiResult<()> {
        let command = AgiCommand::DatabasePut {
            family: family.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        };
        let resp = self
            .run(command.clone())
            .await?;
        // 1 on success, 0 on failure
        if resp.result() != 1 {
            return Err(command_failed(&command, resp.raw()));
        }
        Ok(())
    }

    /// Delete an AstDB entry.
    pub async fn database_del(&mut self, family: &str, key: &str) -> AgiResult<()> {
        let command = AgiCommand::DatabaseDel {
            family: family.to_string(),
            key: key.to_string(),
        };
        let resp = self
            .run(command.clone())
            .await?;
        if resp.result() != 1 {
            return Err(command_failed(&command, resp.raw()));
        }
        Ok(())
    }

    /// State of the current channel, or the named one.
    pub async fn channel_status(&mut self, channel: Option<&str>) -> AgiResult<ChannelStatus> {
        let command = AgiCommand::ChannelStatus {
            channel: channel.map(str::to_string),
        };
        let resp = self
            .run(command.clone())
            .await?;
        ChannelStatus::from_result(resp.result()).ok_or_else(|| command_failed(&command, resp.raw()))
    }

    /// Say a string of digits, stopping early on any of `escape_digits`.
    pub async fn say_digits(&mut self, number: &str, escape_digits: &str) -> AgiResult<Option<char>> {
        let resp = self
            .run(AgiCommand::SayDigits {
                number: number.to_string(),
                escape_digits: escape_digits.to_string(),
            })
            .await?;
        Ok(digit_from_result(resp.result()))
    }

    /// Say a number, stopping early on any of `escape_digits`.
    pub async fn say_number(&mut self, number: i64, escape_digits: &str) -> AgiResult<Option<char>> {
        let resp = self
            .run(AgiCommand::SayNumber {
                number: number.to_string(),
                escape_digits: escape_digits.to_string(),
                gender: None,
            })
            .await?;
        Ok(digit_from_result(resp.result()))
    }

    /// Hang up automatically after `seconds`; `0` cancels.
    pub async fn set_auto_hangup(&mut self, seconds: u32) -> AgiResult<()> {
        self.run(AgiCommand::SetAutoHangup { seconds })
            .await
            .map(|_| ())
    }

    /// Turn music on hold on or off.
    pub async fn set_music(&mut self, on: bool, class: Option<&str>) -> AgiResult<()> {
        self.run(AgiCommand::SetMusic {
            on,
            class: class.map(str::to_string),
        })
        .await
        .map(|_| ())
    }
}
