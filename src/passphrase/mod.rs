//! Passphrase grammar.
//!
//! A passphrase is `N-word-word`: a number from 0 to 100 written without a
//! superfluous leading zero, followed by two lowercase ASCII words of three to
//! eight letters each, separated by single hyphens. Nothing else is accepted,
//! including surrounding whitespace or a trailing newline.
//!
//! The check is the same on the register and claim paths. Phrases are
//! deliberately low-entropy; brute-force resistance comes from the rate
//! governor, not from this module.

mod words;

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;

pub use words::WORDS;

const MAX_NUMBER: u32 = 100;
const MIN_WORD_LEN: usize = 3;
const MAX_WORD_LEN: usize = 8;

/// Returns true iff `phrase` matches `^(0|[1-9][0-9]?|100)-[a-z]{3,8}-[a-z]{3,8}$`.
pub fn is_valid(phrase: &str) -> bool {
    let mut parts = phrase.split('-');
    let (Some(number), Some(first), Some(second), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    is_valid_number(number) && is_valid_word(first) && is_valid_word(second)
}

fn is_valid_number(part: &str) -> bool {
    let bytes = part.as_bytes();
    if bytes.is_empty() || bytes.len() > 3 || !bytes.iter().all(u8::is_ascii_digit) {
        return false;
    }
    if bytes.len() > 1 && bytes[0] == b'0' {
        return false;
    }
    part.parse::<u32>().map(|n| n <= MAX_NUMBER).unwrap_or(false)
}

fn is_valid_word(part: &str) -> bool {
    (MIN_WORD_LEN..=MAX_WORD_LEN).contains(&part.len())
        && part.bytes().all(|b| b.is_ascii_lowercase())
}

/// Rejected passphrase input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid passphrase format: {0:?}")]
pub struct InvalidPassphrase(pub String);

/// A string known to satisfy the passphrase grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    /// Validate and wrap `phrase`.
    pub fn parse(phrase: impl Into<String>) -> Result<Self, InvalidPassphrase> {
        let phrase = phrase.into();
        if is_valid(&phrase) {
            Ok(Self(phrase))
        } else {
            Err(InvalidPassphrase(phrase))
        }
    }

    /// Generate a random phrase: a number in 1..=100 and two words from [`WORDS`].
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let number = rng.gen_range(1..=MAX_NUMBER);
        let first = WORDS[rng.gen_range(0..WORDS.len())];
        let second = WORDS[rng.gen_range(0..WORDS.len())];
        Self(format!("{number}-{first}-{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for Passphrase {
    type Err = InvalidPassphrase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Passphrase {
    type Error = InvalidPassphrase;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl AsRef<str> for Passphrase {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
