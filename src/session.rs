//! AGI session: environment handshake and command execution

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    Join, Stdin, Stdout,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{AgiCommand, CommandBuilder},
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_HANDSHAKE_TIMEOUT_MS, ENV_ARG_PREFIX, ENV_PREFIX,
        ENV_SEPARATOR, HANGUP_MARKER, MAX_LINE_LENGTH, USAGE_CONTINUATION, USAGE_END,
    },
    error::{AgiError, AgiResult},
    response::Response,
};

/// Options for AGI sessions.
///
/// Use [`Default::default()`] for standard settings.
#[derive(Debug, Clone)]
pub struct AgiOptions {
    /// Deadline for a complete reply to one command. Default: 2 seconds.
    ///
    /// Commands that block on the caller (`STREAM FILE`, `GET DATA`,
    /// `RECORD FILE`, `EXEC Dial`) need more; raise it per session with
    /// [`AgiSession::set_command_timeout`].
    pub command_timeout: Duration,
    /// Deadline for the whole environment block. Default: 5 seconds.
    pub handshake_timeout: Duration,
    /// Longest accepted protocol line, terminator included. Default: 64KB.
    pub max_line_length: usize,
}

impl Default for AgiOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

/// Whether a session can still carry commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// Replies are in step with commands.
    Ready,
    /// A read timed out or failed part-way; the next reply on the stream
    /// could belong to an earlier command.
    Desynchronized,
    /// [`AgiSession::close`] was called.
    Closed,
}

/// One AGI call: the environment Asterisk sent, plus the stream to talk on.
///
/// Commands take `&mut self`, so a second command cannot be written before
/// the first one's reply is read. Replies carry no correlation id; this
/// ordering is the only thing pairing them with commands.
pub struct AgiSession<S> {
    stream: BufReader<S>,
    environment: HashMap<String, String>,
    args: Vec<String>,
    hung_up: bool,
    state: SessionState,
    command_timeout: Duration,
    max_line_length: usize,
    peer_addr: Option<SocketAddr>,
}

/// Session over a FastAGI TCP connection.
pub type FastAgiSession = AgiSession<TcpStream>;

impl<S> std::fmt::Debug for AgiSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgiSession")
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("hung_up", &self.hung_up)
            .field("environment", &self.environment)
            .field("args", &self.args)
            .finish()
    }
}

/// Read one `\n`-terminated line, bounded by `max` bytes.
///
/// Asterisk passes channel data through as raw bytes (Latin-1 caller names
/// and the like); anything that is not UTF-8 is decoded lossily so a
/// complete line is never a transport error.
async fn read_line<R>(reader: &mut R, max: usize) -> AgiResult<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = reader
        .take(max as u64)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(AgiError::Io)?;

    if n == 0 {
        return Err(AgiError::ConnectionClosed);
    }
    if buf.last() != Some(&b'\n') {
        if n >= max {
            return Err(AgiError::protocol_error(format!(
                "line exceeds {} bytes",
                max
            )));
        }
        // EOF in the middle of a line
        return Err(AgiError::ConnectionClosed);
    }
    Ok(match String::from_utf8(buf) {
        Ok(line) => line,
        Err(e) => {
            trace!("[RECV] Non-UTF-8 line, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

fn trim_terminator(line: &str) -> &str {
    let line = line
        .strip_suffix('\n')
        .unwrap_or(line);
    line.strip_suffix('\r')
        .unwrap_or(line)
}

/// Environment collected from the handshake block.
#[derive(Debug, Default)]
pub(crate) struct Environment {
    pub(crate) variables: HashMap<String, String>,
    pub(crate) args: Vec<String>,
}

impl Environment {
    /// Add one `agi_<name>: <value>` line.
    pub(crate) fn push_line(&mut self, line: &str) -> AgiResult<()> {
        let invalid = || AgiError::InvalidEnvironment {
            line: line.to_string(),
        };
        if !line.starts_with(ENV_PREFIX) {
            return Err(invalid());
        }
        let sep = line
            .find(ENV_SEPARATOR)
            .ok_or_else(invalid)?;
        let value = &line[sep + ENV_SEPARATOR.len()..];

        if line.starts_with(ENV_ARG_PREFIX) {
            trace!("[HANDSHAKE] arg {}: {:?}", self.args.len() + 1, value);
            self.args
                .push(value.to_string());
        } else {
            let name = &line[ENV_PREFIX.len()..sep];
            trace!("[HANDSHAKE] env {} = {:?}", name, value);
            self.variables
                .insert(name.to_string(), value.to_string());
        }
        Ok(())
    }
}

/// Consume lines up to and including the blank terminator.
async fn read_environment<R>(reader: &mut R, max_line_length: usize) -> AgiResult<Environment>
where
    R: AsyncBufRead + Unpin,
{
    let mut env = Environment::default();
    loop {
        let line = read_line(reader, max_line_length).await?;
        let line = trim_terminator(&line);
        if line.is_empty() {
            return Ok(env);
        }
        env.push_line(line)?;
    }
}

impl<S> AgiSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the environment block from a freshly opened stream.
    ///
    /// Either the whole block parses and a session is returned, or an error
    /// is; a malformed line aborts the handshake.
    pub async fn handshake(stream: S, options: &AgiOptions) -> AgiResult<Self> {
        let mut stream = BufReader::new(stream);
        let timeout_ms = options
            .handshake_timeout
            .as_millis() as u64;

        debug!("[HANDSHAKE] Reading AGI environment");
        let env = match timeout(
            options.handshake_timeout,
            read_environment(&mut stream, options.max_line_length),
        )
        .await
        {
            Ok(Ok(env)) => env,
            Ok(Err(e)) => {
                warn!("[HANDSHAKE] Failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!("[HANDSHAKE] Timed out after {}ms", timeout_ms);
                return Err(AgiError::Timeout { timeout_ms });
            }
        };

        debug!(
            "[HANDSHAKE] Complete: {} variables, {} arguments",
            env.variables
                .len(),
            env.args
                .len()
        );

        Ok(Self {
            stream,
            environment: env.variables,
            args: env.args,
            hung_up: false,
            state: SessionState::Ready,
            command_timeout: options.command_timeout,
            max_line_length: options.max_line_length,
            peer_addr: None,
        })
    }

    /// Execute a command given as verb plus pre-stringified arguments.
    ///
    /// Empty arguments go on the wire as `""`.
    ///
    /// ```rust,no_run
    /// # async fn example(session: &mut asterisk_agi_tokio::AgiSession<asterisk_agi_tokio::Stdio>) -> Result<(), asterisk_agi_tokio::AgiError> {
    /// let resp = session.execute("STREAM FILE", &["beep", ""]).await?;
    /// println!("stopped at {:?}", resp.endpos());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(&mut self, verb: &str, args: &[&str]) -> AgiResult<Response> {
        let line = args
            .iter()
            .fold(CommandBuilder::new(verb), |cmd, a| cmd.arg(a))
            .build()?;
        self.execute_line(line)
            .await
    }

    /// Execute a typed command.
    pub async fn send_command(&mut self, command: &AgiCommand) -> AgiResult<Response> {
        let line = command.to_wire_format()?;
        self.execute_line(line)
            .await
    }

    /// Write one command line and read back exactly one reply.
    async fn execute_line(&mut self, line: String) -> AgiResult<Response> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Desynchronized => return Err(AgiError::Desynchronized),
            SessionState::Closed => return Err(AgiError::ConnectionClosed),
        }

        debug!("[SEND] {}", line.trim_end());
        if let Err(e) = self
            .write_line(&line)
            .await
        {
            warn!("[SEND] Write failed: {}", e);
            self.state = SessionState::Desynchronized;
            return Err(AgiError::Io(e));
        }

        let hung_up_before = self.hung_up;
        let timeout_ms = self
            .command_timeout
            .as_millis() as u64;
        let raw = match timeout(self.command_timeout, self.read_reply()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                self.state = SessionState::Desynchronized;
                if self.hung_up && !hung_up_before {
                    return Err(AgiError::HungUp);
                }
                warn!("[RECV] Read failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                self.state = SessionState::Desynchronized;
                if self.hung_up && !hung_up_before {
                    return Err(AgiError::HungUp);
                }
                warn!("[RECV] No reply within {}ms", timeout_ms);
                return Err(AgiError::Timeout { timeout_ms });
            }
        };

        trace!("[RECV] {:?}", raw);
        let response = Response::parse(&raw)?;
        debug!(
            "[RECV] code={} result={}",
            response.code(),
            response.result()
        );
        Ok(response)
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let writer = self
            .stream
            .get_mut();
        writer
            .write_all(line.as_bytes())
            .await?;
        writer
            .flush()
            .await
    }

    /// Read one reply, including a leading `HANGUP` line and every line of
    /// a `520-` usage block.
    async fn read_reply(&mut self) -> AgiResult<String> {
        let mut raw = read_line(&mut self.stream, self.max_line_length).await?;

        if raw.starts_with(HANGUP_MARKER) {
            info!("[RECV] Channel hung up");
            self.hung_up = true;
            // The in-flight command still gets its own reply; drain it so the
            // stream stays in step.
            let first = read_line(&mut self.stream, self.max_line_length).await?;
            raw.push_str(&first);
            if !first.starts_with(USAGE_CONTINUATION) {
                return Ok(raw);
            }
        } else if !raw.starts_with(USAGE_CONTINUATION) {
            return Ok(raw);
        }

        loop {
            let line = read_line(&mut self.stream, self.max_line_length).await?;
            raw.push_str(&line);
            if line.starts_with(USAGE_END) {
                return Ok(raw);
            }
        }
    }

    /// Shut down the write side of the stream. Further commands fail.
    pub async fn close(&mut self) -> AgiResult<()> {
        info!("Closing AGI session");
        self.state = SessionState::Closed;
        self.stream
            .get_mut()
            .shutdown()
            .await
            .map_err(AgiError::Io)
    }
}

impl<S> AgiSession<S> {
    /// Environment value by name, without the `agi_` prefix
    /// (`channel`, `callerid`, ...) or as an [`AgiEnv`](crate::AgiEnv).
    pub fn env(&self, name: impl AsRef<str>) -> Option<&str> {
        self.environment
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All environment values, keyed without the `agi_` prefix.
    pub fn environment(&self) -> &HashMap<String, String> {
        &self.environment
    }

    /// Script arguments (`agi_arg_1`, `agi_arg_2`, ...) in the order received.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether Asterisk has sent an out-of-band `HANGUP`.
    ///
    /// Sticky: once set it stays set. Commands may still be sent; Asterisk
    /// answers them with `511`.
    pub fn is_hung_up(&self) -> bool {
        self.hung_up
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether commands can be sent.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Current reply deadline.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Set the reply deadline for subsequent commands.
    pub fn set_command_timeout(&mut self, duration: Duration) {
        self.command_timeout = duration;
    }

    /// Remote address for FastAGI sessions.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub(crate) fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }
}

/// Process stdin/stdout joined into one duplex stream (classic AGI).
pub type Stdio = Join<Stdin, Stdout>;

impl AgiSession<Stdio> {
    /// Start a classic AGI session on stdin/stdout (Asterisk spawned us).
    ///
    /// ```rust,no_run
    /// use asterisk_agi_tokio::{AgiEnv, AgiOptions, AgiSession};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), asterisk_agi_tokio::AgiError> {
    ///     let mut agi = AgiSession::stdio(&AgiOptions::default()).await?;
    ///     let channel = agi.env(AgiEnv::Channel).unwrap_or("?").to_string();
    ///     agi.verbose(&format!("AGI started on {}", channel)).await?;
    ///     agi.answer().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn stdio(options: &AgiOptions) -> AgiResult<Self> {
        let stdio = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
        Self::handshake(stdio, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    const ENV_BLOCK: &str = "agi_network: yes\n\
                             agi_network_script: foo?\n\
                             agi_request: agi://127.0.0.1/foo?\n\
                             agi_channel: SIP/2222@default-00000023\n\
                             agi_language: en\n\
                             agi_type: SIP\n\
                             agi_uniqueid: 1397044468.0\n\
                             agi_version: 0.1\n\
                             agi_callerid: 5001\n\
                             agi_calleridname: Alice\n\
                             agi_callingpres: 67\n\
                             agi_callingani2: 0\n\
                             agi_callington: 0\n\
                             agi_callingtns: 0\n\
                             agi_dnid: 123456\n\
                             agi_rdnis: unknown\n\
                             agi_context: default\n\
                             agi_extension: 2222\n\
                             agi_priority: 1\n\
                             agi_enhanced: 0.0\n\
                             agi_accountcode: 0\n\
                             agi_threadid: 140536028174080\n\
                             agi_arg_1: argument1\n\
                             agi_arg_2: bar=123\n\
                             agi_arg_3: 3\n\
                             \n";

    fn fast_options() -> AgiOptions {
        AgiOptions {
            command_timeout: Duration::from_millis(200),
            handshake_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    async fn session_with_switch() -> (AgiSession<DuplexStream>, BufReader<DuplexStream>) {
        let (client, mut switch) = duplex(4096);
        switch
            .write_all(ENV_BLOCK.as_bytes())
            .await
            .unwrap();
        let session = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap();
        (session, BufReader::new(switch))
    }

    async fn expect_command(switch: &mut BufReader<DuplexStream>, expected: &str) {
        let mut line = String::new();
        switch
            .read_line(&mut line)
            .await
            .unwrap();
        assert_eq!(line, expected);
    }

    async fn reply(switch: &mut BufReader<DuplexStream>, text: &str) {
        switch
            .get_mut()
            .write_all(text.as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handshake_collects_environment_and_args() {
        let (session, _switch) = session_with_switch().await;
        assert_eq!(
            session
                .environment()
                .len(),
            22
        );
        assert_eq!(session.env("channel"), Some("SIP/2222@default-00000023"));
        assert_eq!(session.env(crate::AgiEnv::CallerIdName), Some("Alice"));
        assert_eq!(session.env("network_script"), Some("foo?"));
        assert_eq!(session.env("unknown"), None);
        assert_eq!(session.args(), &["argument1", "bar=123", "3"]);
        assert!(session.is_ready());
        assert!(!session.is_hung_up());
    }

    #[test]
    fn test_environment_line_counts() {
        let mut env = Environment::default();
        for i in 0..5 {
            env.push_line(&format!("agi_var{}: v{}", i, i))
                .unwrap();
        }
        for i in 0..3 {
            env.push_line(&format!("agi_arg_{}: a{}", i + 1, i))
                .unwrap();
        }
        assert_eq!(
            env.variables
                .len(),
            5
        );
        assert_eq!(env.args, vec!["a0", "a1", "a2"]);
    }

    #[test]
    fn test_environment_value_keeps_later_separators() {
        let mut env = Environment::default();
        env.push_line("agi_request: agi://host/script?a: b")
            .unwrap();
        assert_eq!(
            env.variables
                .get("request")
                .map(|s| s.as_str()),
            Some("agi://host/script?a: b")
        );
    }

    #[tokio::test]
    async fn test_handshake_rejects_missing_prefix() {
        let (client, mut switch) = duplex(1024);
        switch
            .write_all(b"agi_network: yes\nnot_agi_env: bar\nagi_language: en\n\n")
            .await
            .unwrap();
        let err = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap_err();
        match err {
            AgiError::InvalidEnvironment { line } => assert_eq!(line, "not_agi_env: bar"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handshake_rejects_missing_separator() {
        let (client, mut switch) = duplex(1024);
        switch
            .write_all(b"agi_network: yes\nagi_env_no_delim bar\n\n")
            .await
            .unwrap();
        let err = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("agi_env_no_delim"));
    }

    #[tokio::test]
    async fn test_handshake_eof_before_terminator() {
        let (client, mut switch) = duplex(1024);
        switch
            .write_all(b"agi_network: yes\nagi_language: en\n")
            .await
            .unwrap();
        drop(switch);
        let err = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        let (client, _switch) = duplex(1024);
        let err = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_handshake_accepts_crlf() {
        let (client, mut switch) = duplex(1024);
        switch
            .write_all(b"agi_channel: PJSIP/1\r\n\r\n")
            .await
            .unwrap();
        let session = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap();
        assert_eq!(session.env("channel"), Some("PJSIP/1"));
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "ANSWER\n").await;
            reply(&mut switch, "200 result=0\n").await;
            switch
        });
        let resp = session
            .execute("ANSWER", &[])
            .await
            .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.result(), 0);
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_execute_empty_argument_on_wire() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "STREAM FILE beep \"\"\n").await;
            reply(&mut switch, "200 result=0 endpos=1600\n").await;
            switch
        });
        let resp = session
            .execute("STREAM FILE", &["beep", ""])
            .await
            .unwrap();
        assert_eq!(resp.endpos(), Some(1600));
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_execute_reads_whole_usage_block() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "DATABASE GET\n").await;
            reply(
                &mut switch,
                "520-Invalid command syntax.  Proper usage follows:\n\
                 Usage: DATABASE GET <family> <key>\n\
                 520 End of proper usage.\n",
            )
            .await;
            expect_command(&mut switch, "NOOP\n").await;
            reply(&mut switch, "200 result=0\n").await;
            switch
        });
        let resp = session
            .execute("DATABASE GET", &[])
            .await
            .unwrap();
        assert_eq!(resp.result(), -1);
        assert_eq!(
            resp.data(),
            "Invalid command syntax.  Proper usage follows:\nUsage: DATABASE GET <family> <key>\n"
        );

        // the next command sees its own reply, not leftovers of the usage block
        let resp = session
            .execute("NOOP", &[])
            .await
            .unwrap();
        assert!(resp.is_success());
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hangup_before_reply() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "WAIT FOR DIGIT 5000\n").await;
            reply(&mut switch, "HANGUP\n200 result=-1\n").await;
            expect_command(&mut switch, "NOOP\n").await;
            reply(&mut switch, "511 Command Not Permitted on a dead channel\n").await;
            switch
        });
        let err = session
            .execute("WAIT FOR DIGIT", &["5000"])
            .await
            .unwrap_err();
        assert!(err.is_hangup());
        assert!(session.is_hung_up());
        assert!(session.is_ready());

        let resp = session
            .execute("NOOP", &[])
            .await
            .unwrap();
        assert_eq!(resp.code(), crate::ReplyCode::DeadChannel);
        assert!(session.is_hung_up());
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hangup_then_close() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "NOOP\n").await;
            reply(&mut switch, "HANGUP\n").await;
            drop(switch);
        });
        let err = session
            .execute("NOOP", &[])
            .await
            .unwrap_err();
        assert!(err.is_hangup());
        assert_eq!(session.state(), SessionState::Desynchronized);
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timeout_then_desynchronized() {
        let (mut session, mut switch) = session_with_switch().await;
        session.set_command_timeout(Duration::from_millis(50));
        let started = tokio::time::Instant::now();
        let err = session
            .execute("NOOP", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::Timeout { timeout_ms: 50 }));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(session.state(), SessionState::Desynchronized);

        let err = session
            .execute("NOOP", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::Desynchronized));

        // nothing but the first command was written
        expect_command(&mut switch, "NOOP\n").await;
    }

    #[tokio::test]
    async fn test_connection_closed_during_read() {
        let (mut session, switch) = session_with_switch().await;
        drop(switch);
        let err = session
            .execute("NOOP", &[])
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_stdio_is_a_session_stream() {
        fn duplex_stream<T: AsyncRead + AsyncWrite + Unpin + Send>() {}
        duplex_stream::<Stdio>();
    }

    #[tokio::test]
    async fn test_handshake_accepts_latin1_caller_name() {
        let (client, mut switch) = duplex(1024);
        switch
            .write_all(b"agi_calleridname: Jos\xe9\nagi_arg_1: caf\xe9\n\n")
            .await
            .unwrap();
        let session = AgiSession::handshake(client, &fast_options())
            .await
            .unwrap();
        assert_eq!(session.env("calleridname"), Some("Jos\u{FFFD}"));
        assert_eq!(session.args(), &["caf\u{FFFD}"]);
    }

    #[tokio::test]
    async fn test_non_utf8_reply_keeps_session_in_step() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "GET VARIABLE CALLERNAME\n").await;
            switch
                .get_mut()
                .write_all(b"200 result=1 (Jos\xe9)\n")
                .await
                .unwrap();
            expect_command(&mut switch, "NOOP\n").await;
            reply(&mut switch, "200 result=0\n").await;
            switch
        });
        let resp = session
            .execute("GET VARIABLE", &["CALLERNAME"])
            .await
            .unwrap();
        assert_eq!(resp.result(), 1);
        assert_eq!(resp.value(), "Jos\u{FFFD}");
        assert!(session.is_ready());

        let resp = session
            .execute("NOOP", &[])
            .await
            .unwrap();
        assert!(resp.is_success());
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_parse_error_keeps_session_ready() {
        let (mut session, mut switch) = session_with_switch().await;
        let task = tokio::spawn(async move {
            expect_command(&mut switch, "NOOP\n").await;
            reply(&mut switch, "garbage\n").await;
            switch
        });
        let err = session
            .execute("NOOP", &[])
            .await
            .unwrap_err();
        assert!(err.is_parse_error());
        assert_eq!(err.raw(), Some("garbage\n"));
        assert!(session.is_ready());
        task.await
            .unwrap();
    }

    #[tokio::test]
    async fn test_overlong_line_is_protocol_error() {
        let (client, mut switch) = duplex(1024);
        let options = AgiOptions {
            max_line_length: 16,
            ..fast_options()
        };
        switch
            .write_all(b"agi_channel: a-very-long-channel-name\n\n")
            .await
            .unwrap();
        let err = AgiSession::handshake(client, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::ProtocolError { .. }));
    }

    #[tokio::test]
    async fn test_newline_in_argument_never_written() {
        let (mut session, _switch) = session_with_switch().await;
        let err = session
            .execute("VERBOSE", &["a\nANSWER"])
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::ProtocolError { .. }));
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn test_close_refuses_further_commands() {
        let (mut session, _switch) = session_with_switch().await;
        session
            .close()
            .await
            .unwrap();
        let err = session
            .execute("NOOP", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AgiError::ConnectionClosed));
    }
}
