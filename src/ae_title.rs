//! Application Entity titles.
//!
//! An AE title is transmitted on the wire as a fixed 16-byte,
//! space-padded field. This module gives that field a single canonical
//! in-memory representation, converting to and from the padded wire form
//! only at the codec boundary.

use std::fmt;

use snafu::Snafu;

/// Width in bytes of an AE title field on the wire.
pub const AE_TITLE_LEN: usize = 16;

#[derive(Debug, Snafu, Eq, PartialEq, Clone)]
#[non_exhaustive]
pub enum InvalidAeTitle {
    /// AE title is empty or consists only of spaces
    Empty,

    #[snafu(display("AE title contains a forbidden character (backslash, CR, LF or TAB)"))]
    ForbiddenCharacter,
}

/// A validated, fixed-width Application Entity title.
///
/// Titles shorter than 16 bytes are right-padded with spaces; titles
/// longer than 16 bytes are truncated. Comparisons and [`Display`] use
/// the trimmed (unpadded) form.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct AeTitle([u8; AE_TITLE_LEN]);

impl AeTitle {
    /// Validate and build an AE title from a string, padding or
    /// truncating it to the wire's fixed width.
    pub fn new(title: &str) -> Result<Self, InvalidAeTitle> {
        if title.trim().is_empty() {
            return EmptySnafu.fail();
        }
        if title.bytes().any(|b| matches!(b, b'\\' | b'\r' | b'\n' | b'\t')) {
            return ForbiddenCharacterSnafu.fail();
        }

        let mut buf = [b' '; AE_TITLE_LEN];
        let bytes = title.as_bytes();
        let n = bytes.len().min(AE_TITLE_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);

        Ok(AeTitle(buf))
    }

    /// Build an AE title directly from its 16-byte wire representation,
    /// as read off the wire by the codec. Unlike [`AeTitle::new`], an
    /// all-spaces value is rejected here too, per the standard.
    pub fn from_wire_bytes(raw: [u8; AE_TITLE_LEN]) -> Result<Self, InvalidAeTitle> {
        if raw.iter().all(|&b| b == b' ') {
            return EmptySnafu.fail();
        }
        if raw.iter().any(|&b| matches!(b, b'\\' | b'\r' | b'\n' | b'\t')) {
            return ForbiddenCharacterSnafu.fail();
        }
        Ok(AeTitle(raw))
    }

    /// The padded, fixed-width wire representation.
    pub fn to_wire_bytes(self) -> [u8; AE_TITLE_LEN] {
        self.0
    }

    /// The trimmed (unpadded) string form.
    pub fn trimmed(&self) -> &str {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != b' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        // `new`/`from_wire_bytes` only ever accept printable ASCII content,
        // so this is always valid UTF-8.
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Debug for AeTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AeTitle").field(&self.trimmed()).finish()
    }
}

impl fmt::Display for AeTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trimmed())
    }
}

impl std::str::FromStr for AeTitle {
    type Err = InvalidAeTitle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AeTitle::new(s)
    }
}
