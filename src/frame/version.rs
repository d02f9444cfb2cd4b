//! Protocol version tags carried in every frame header.

use std::fmt;

use bincode::{Decode, Encode};
use serde::Deserialize;

/// Length of the fixed header written before every `V1`-family payload.
pub const V1_HEADER_LEN: usize = 16;

/// Protocol version negotiated for a single message.
///
/// The tag is copied verbatim from a request onto its reply and is never
/// renegotiated mid-call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Encode, Decode, Deserialize)]
pub enum VersionTag {
    /// Original protocol with a fixed 16 byte header.
    V1,
    /// `V1` with a compressed body; shares the `V1` header layout.
    V1Compress,
    /// Second generation protocol; its header is variable and not counted.
    V2,
}

impl VersionTag {
    /// Value written to the version byte of the frame header.
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::V1 => 1,
            Self::V1Compress => 2,
            Self::V2 => 3,
        }
    }

    /// Resolve a header version byte, returning `None` for unknown values.
    #[must_use]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::V1),
            2 => Some(Self::V1Compress),
            3 => Some(Self::V2),
            _ => None,
        }
    }

    /// Fixed header length added to the payload when accounting frame bytes.
    ///
    /// Only the `V1` family carries a fixed header; `V2` returns `None`.
    #[must_use]
    pub const fn fixed_header_len(self) -> Option<usize> {
        match self {
            Self::V1 | Self::V1Compress => Some(V1_HEADER_LEN),
            Self::V2 => None,
        }
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V1 => "v1",
            Self::V1Compress => "v1-compress",
            Self::V2 => "v2",
        };
        f.write_str(name)
    }
}
