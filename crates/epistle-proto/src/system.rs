//! Server-authored broadcast messages.
//!
//! Grammar: `SERVER:<typeCode>:<payload>`. The body is split on every `:` and
//! must yield exactly three parts, so a payload containing `:` is malformed.
//! The type code selects a fixed taxonomy; unknown codes pass through as
//! [`SystemEvent::Unknown`] rather than failing.

use std::fmt;

use crate::errors::{ProtocolError, Result};

/// Bitmask of conversation fields changed by an admin.
///
/// Bits read left to right in the four-digit binary rendering: admin,
/// title, description, expiration. Password is the fifth flag. A payload of
/// `5` (`0101`) therefore means title and expiration changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MetadataChanges(u32);

impl MetadataChanges {
    /// Expiration date changed.
    pub const EXPIRATION: Self = Self(1);
    /// Description changed.
    pub const DESCRIPTION: Self = Self(1 << 1);
    /// Title changed.
    pub const TITLE: Self = Self(1 << 2);
    /// Admin handed over.
    pub const ADMIN: Self = Self(1 << 3);
    /// Password changed.
    pub const PASSWORD: Self = Self(1 << 4);

    const ALL: [(Self, &'static str); 5] = [
        (Self::ADMIN, "admin"),
        (Self::TITLE, "title"),
        (Self::DESCRIPTION, "description"),
        (Self::EXPIRATION, "expiration"),
        (Self::PASSWORD, "password"),
    ];

    /// Build from raw bits. Unknown bits are kept but never reported.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Whether every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// No known flag set.
    pub fn is_empty(self) -> bool {
        self.names().next().is_none()
    }

    /// Stable names of the set flags, in bit-listing order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().filter(move |(flag, _)| self.contains(*flag)).map(|(_, name)| name)
    }
}

impl std::ops::BitOr for MetadataChanges {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for MetadataChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.names().collect();
        f.write_str(&names.join(", "))
    }
}

/// Structured meaning of a server marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Type 0: a user joined.
    UserJoined {
        /// User named in the payload.
        user: String,
    },
    /// Type 1: a user left.
    UserLeft {
        /// User named in the payload.
        user: String,
    },
    /// Type 2: a user was kicked.
    UserKicked {
        /// User named in the payload.
        user: String,
    },
    /// Type 3: the conversation expires soon.
    ConvoExpiringSoon {
        /// Raw payload (server-formatted expiry hint).
        detail: String,
    },
    /// Type 4: conversation metadata changed.
    MetadataChanged(MetadataChanges),
    /// Any other type code. Rendered as empty text.
    Unknown {
        /// Unrecognized type code.
        code: i32,
        /// Raw payload.
        payload: String,
    },
}

/// A parsed `SERVER:<type>:<payload>` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemMessage {
    /// Numeric type code.
    pub code: i32,
    /// Everything after the second `:`.
    pub payload: String,
}

impl SystemMessage {
    /// Parse a server marker body.
    ///
    /// # Errors
    ///
    /// - `MalformedSystemMessage` if the body does not split into exactly
    ///   three `:`-separated parts or the type code is not an integer.
    pub fn parse(body: &str) -> Result<Self> {
        let parts: Vec<&str> = body.split(':').collect();
        let [_, code, payload] = parts.as_slice() else {
            return Err(ProtocolError::MalformedSystemMessage {
                reason: format!("expected 3 parts, found {}", parts.len()),
            });
        };

        let code = code.trim().parse::<i32>().map_err(|e| {
            ProtocolError::MalformedSystemMessage { reason: format!("type code {code:?}: {e}") }
        })?;

        Ok(Self { code, payload: (*payload).to_string() })
    }

    /// Interpret the type code.
    ///
    /// # Errors
    ///
    /// - `MalformedSystemMessage` if a metadata-change payload is not an
    ///   integer bitmask.
    pub fn event(&self) -> Result<SystemEvent> {
        let payload = self.payload.clone();
        let event = match self.code {
            0 => SystemEvent::UserJoined { user: payload },
            1 => SystemEvent::UserLeft { user: payload },
            2 => SystemEvent::UserKicked { user: payload },
            3 => SystemEvent::ConvoExpiringSoon { detail: payload },
            4 => {
                let bits = self.payload.trim().parse::<u32>().map_err(|e| {
                    ProtocolError::MalformedSystemMessage {
                        reason: format!("metadata bitmask {:?}: {e}", self.payload),
                    }
                })?;
                SystemEvent::MetadataChanged(MetadataChanges::from_bits(bits))
            },
            code => SystemEvent::Unknown { code, payload },
        };
        Ok(event)
    }
}
