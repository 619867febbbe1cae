//! Typed names for the `agi_*` environment block.

/// Error returned when parsing an unrecognized environment name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAgiEnvError(pub String);

impl std::fmt::Display for ParseAgiEnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown AGI environment name: {}", self.0)
    }
}

impl std::error::Error for ParseAgiEnvError {}

define_wire_enum! {
    error_type: ParseAgiEnvError,
    prefix: "agi_",
    /// Environment names Asterisk sends before the first command, without
    /// the `agi_` prefix.
    ///
    /// Use with [`AgiSession::env()`](crate::AgiSession::env) for type-safe
    /// lookups. Positional arguments (`agi_arg_N`) are not listed here; they
    /// are available from [`AgiSession::args()`](crate::AgiSession::args).
    pub enum AgiEnv {
        Network => "network",
        NetworkScript => "network_script",
        Request => "request",
        Channel => "channel",
        Language => "language",
        Type => "type",
        UniqueId => "uniqueid",
        Version => "version",
        CallerId => "callerid",
        CallerIdName => "calleridname",
        CallingPres => "callingpres",
        CallingAni2 => "callingani2",
        CallingTon => "callington",
        CallingTns => "callingtns",
        Dnid => "dnid",
        Rdnis => "rdnis",
        Context => "context",
        Extension => "extension",
        Priority => "priority",
        Enhanced => "enhanced",
        AccountCode => "accountcode",
        ThreadId => "threadid",
    }
}
