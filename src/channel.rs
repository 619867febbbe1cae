//! Channel state as reported by `CHANNEL STATUS`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel state from `ast_channel_state`, the `result=` of `CHANNEL STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[repr(u8)]
pub enum ChannelStatus {
    /// Channel is down and available
    Down = 0,
    /// Channel is down, but reserved
    Reserved = 1,
    /// Channel is off hook
    OffHook = 2,
    /// Digits (or equivalent) have been dialed
    Dialing = 3,
    /// Line is ringing
    Ring = 4,
    /// Remote end is ringing
    Ringing = 5,
    /// Line is up
    Up = 6,
    /// Line is busy
    Busy = 7,
}

impl ChannelStatus {
    /// Map a `CHANNEL STATUS` result. Negative results (no such channel) are `None`.
    pub fn from_result(n: i64) -> Option<Self> {
        match n {
            0 => Some(Self::Down),
            1 => Some(Self::Reserved),
            2 => Some(Self::OffHook),
            3 => Some(Self::Dialing),
            4 => Some(Self::Ring),
            5 => Some(Self::Ringing),
            6 => Some(Self::Up),
            7 => Some(Self::Busy),
            _ => None,
        }
    }

    /// Numeric value as sent by Asterisk.
    pub fn as_number(&self) -> u8 {
        *self as u8
    }

    /// `true` once the call is answered.
    pub fn is_up(&self) -> bool {
        *self == Self::Up
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Down => "DOWN",
            Self::Reserved => "RESERVED",
            Self::OffHook => "OFFHOOK",
            Self::Dialing => "DIALING",
            Self::Ring => "RING",
            Self::Ringing => "RINGING",
            Self::Up => "UP",
            Self::Busy => "BUSY",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid channel status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelStatusError(pub String);

impl fmt::Display for ParseChannelStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel status: {}", self.0)
    }
}

impl std::error::Error for ParseChannelStatusError {}

impl FromStr for ChannelStatus {
    type Err = ParseChannelStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s
            .to_uppercase()
            .as_str()
        {
            "DOWN" => Ok(Self::Down),
            "RESERVED" => Ok(Self::Reserved),
            "OFFHOOK" => Ok(Self::OffHook),
            "DIALING" => Ok(Self::Dialing),
            "RING" => Ok(Self::Ring),
            "RINGING" => Ok(Self::Ringing),
            "UP" => Ok(Self::Up),
            "BUSY" => Ok(Self::Busy),
            _ => Err(ParseChannelStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_status_from_result() {
        assert_eq!(ChannelStatus::from_result(0), Some(ChannelStatus::Down));
        assert_eq!(ChannelStatus::from_result(6), Some(ChannelStatus::Up));
        assert_eq!(ChannelStatus::from_result(7), Some(ChannelStatus::Busy));
        assert_eq!(ChannelStatus::from_result(8), None);
        assert_eq!(ChannelStatus::from_result(-1), None);
    }

    #[test]
    fn test_channel_status_as_number() {
        for n in 0..=7 {
            let status = ChannelStatus::from_result(n).unwrap();
            assert_eq!(i64::from(status.as_number()), n);
        }
    }

    #[test]
    fn test_channel_status_display_and_from_str() {
        assert_eq!(ChannelStatus::OffHook.to_string(), "OFFHOOK");
        assert_eq!("up".parse::<ChannelStatus>(), Ok(ChannelStatus::Up));
        assert_eq!("RINGING".parse::<ChannelStatus>(), Ok(ChannelStatus::Ringing));
    }

    #[test]
    fn test_channel_status_from_str_unknown() {
        let err = "CS_NEW"
            .parse::<ChannelStatus>()
            .unwrap_err();
        assert_eq!(err.to_string(), "unknown channel status: CS_NEW");
    }

    #[test]
    fn test_channel_status_serde() {
        let json = serde_json::to_string(&ChannelStatus::Up).unwrap();
        assert_eq!(json, "\"Up\"");
        let back: ChannelStatus = serde_json::from_str(&json).unwrap();
        assert!(back.is_up());
    }
}
