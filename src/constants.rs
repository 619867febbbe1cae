//! Protocol constants and configuration values

/// Default TCP port Asterisk dials for `agi://` URLs (FastAGI)
pub const DEFAULT_FASTAGI_PORT: u16 = 4573;

/// Prefix carried by every environment line of the session handshake
pub const ENV_PREFIX: &str = "agi_";

/// Environment prefix of positional script arguments (`agi_arg_1`, `agi_arg_2`, ...)
pub const ENV_ARG_PREFIX: &str = "agi_arg_";

/// Separator between an environment name and its value
pub const ENV_SEPARATOR: &str = ": ";

/// Out-of-band line Asterisk writes when the channel hangs up
pub const HANGUP_MARKER: &str = "HANGUP";

/// First line prefix of a multi-line usage reply
pub const USAGE_CONTINUATION: &str = "520-";

/// Line prefix closing a multi-line usage reply
pub const USAGE_END: &str = "520 End";

/// Literal introducing the primary result of a reply
pub const RESULT_TOKEN: &str = "result=";

/// Literal introducing the playback/recording offset
pub const ENDPOS_TOKEN: &str = "endpos=";

/// Literal introducing the digit sub-field
pub const DIGIT_TOKEN: &str = "digit=";

/// Literal introducing the speech results sub-field
pub const RESULTS_TOKEN: &str = "results=";

/// Wire token for an argument that is explicitly empty
pub const EMPTY_ARGUMENT: &str = "\"\"";

/// Command line terminator
pub const LINE_TERMINATOR: &str = "\n";

/// Shortest reply that can carry a status code and a separator (`200 `)
pub const MIN_REPLY_LEN: usize = 4;

/// Default command reply timeout in milliseconds
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 2000;

/// Default handshake (environment block) timeout in milliseconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

/// Maximum length of a single protocol line (64KB)
/// Asterisk usage texts are a few hundred bytes; anything near this is garbage.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default capacity of the FastAGI session handoff queue
pub const DEFAULT_HANDOFF_QUEUE_SIZE: usize = 16;
