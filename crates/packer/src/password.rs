//! Password obfuscation and content-addressed naming.
//!
//! The archive password is hidden inside a larger string: the base secret is
//! bracketed by two "carriers" sampled from the archive's random name, and the
//! result is wrapped in a user prefix and suffix:
//!
//! ```text
//! prefix [carrierB] base [carrierA] suffix
//! ```
//!
//! This is obfuscation, not cryptography. Anyone who knows the layout can
//! recover the base.

use md5::{Digest, Md5};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::LazyLock;

/// `[carrierB] base [carrierA]`, greedy in the middle.
static WRAPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[([0-9A-Za-z]*)\](.*)\[([0-9A-Za-z]*)\]").expect("valid pattern")
});

/// Length of a content-addressed token (hex MD5 digest).
pub const TOKEN_LEN: usize = 32;

/// Letters inserted into a token; none of them is a lowercase hex digit.
const EXTRA_ALPHABET: &[u8] = b"ghijklmnopqrstuvwxyzGHIJKLMNOPQRSTUVWXYZ";

/// Lowercase hex MD5 of a byte slice.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Md5::digest(data.as_ref()))
}

/// Lowercase hex MD5 of a file's contents, streamed.
pub fn md5_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A fresh random token shaped like an MD5 digest.
pub fn random_token() -> String {
    let seed: [u8; 16] = rand::thread_rng().gen();
    md5_hex(seed)
}

/// Insert `count` random non-hex letters at random positions of `token`.
pub fn insert_random_chars(token: &str, count: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut chars: Vec<char> = token.chars().collect();
    for _ in 0..count {
        let at = rng.gen_range(0..=chars.len());
        let letter = EXTRA_ALPHABET[rng.gen_range(0..EXTRA_ALPHABET.len())] as char;
        chars.insert(at, letter);
    }
    chars.into_iter().collect()
}

/// Recover a token from a decorated name by dropping every non-hex character.
///
/// Returns `None` unless exactly [`TOKEN_LEN`] hex digits remain.
pub fn extract_token(name: &str) -> Option<String> {
    let token: String = name
        .chars()
        .filter(|c| c.is_ascii_digit() || ('a'..='f').contains(c))
        .collect();
    (token.len() == TOKEN_LEN).then_some(token)
}

/// A random sub-multiset of `seed`'s characters, in random order.
///
/// The length is drawn from `1..=len(seed)`; an empty seed yields an empty
/// carrier.
pub fn derive_carrier(seed: &str) -> String {
    let mut chars: Vec<char> = seed.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    let mut rng = rand::thread_rng();
    let len = rng.gen_range(1..=chars.len());
    chars.shuffle(&mut rng);
    chars.truncate(len);
    chars.into_iter().collect()
}

/// Compose `prefix[carrier_b]base[carrier_a]suffix`.
pub fn wrap(base: &str, carrier_b: &str, carrier_a: &str, prefix: &str, suffix: &str) -> String {
    format!("{prefix}[{carrier_b}]{base}[{carrier_a}]{suffix}")
}

/// How [`extract`] treats the recovered candidate.
#[derive(Debug, Clone, Default)]
pub struct UnwrapOptions {
    /// Only return a candidate whose MD5 equals `checksum`
    pub verify: bool,

    /// Hex MD5 of the expected base
    pub checksum: Option<String>,
}

impl UnwrapOptions {
    pub fn verified(checksum: impl Into<String>) -> Self {
        Self {
            verify: true,
            checksum: Some(checksum.into()),
        }
    }
}

/// Recover the base secret from an obfuscated password.
///
/// Finds the first bracketed carrier and the last bracketed carrier and
/// returns what lies between them. With `verify` set the candidate is only
/// returned when its MD5 matches the supplied checksum; a missing checksum
/// fails verification.
pub fn extract(obfuscated: &str, options: &UnwrapOptions) -> Option<String> {
    let candidate = WRAPPED.captures(obfuscated)?.get(2)?.as_str().to_string();

    if !options.verify {
        return Some(candidate);
    }

    match &options.checksum {
        Some(expected) if md5_hex(&candidate).eq_ignore_ascii_case(expected) => Some(candidate),
        _ => None,
    }
}

/// Verified extraction that falls back to the unverified candidate.
pub fn extract_or_candidate(obfuscated: &str, options: &UnwrapOptions) -> Option<String> {
    extract(obfuscated, options).or_else(|| {
        tracing::warn!("password verification failed, using unverified candidate");
        extract(obfuscated, &UnwrapOptions::default())
    })
}

/// The parts of an obfuscated password, kept so they can be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObfuscatedPassword {
    pub base: String,
    pub carrier_a: String,
    pub carrier_b: String,
    pub prefix: String,
    pub suffix: String,
}

impl ObfuscatedPassword {
    /// Derive both carriers from `seed` and keep the given prefix and suffix.
    pub fn generate(base: &str, seed: &str, prefix: &str, suffix: &str) -> Self {
        Self {
            base: base.to_string(),
            carrier_b: derive_carrier(seed),
            carrier_a: derive_carrier(seed),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// The full password handed to the codec.
    pub fn compose(&self) -> String {
        wrap(
            &self.base,
            &self.carrier_b,
            &self.carrier_a,
            &self.prefix,
            &self.suffix,
        )
    }

    /// Hex MD5 of the base, for verified extraction.
    pub fn checksum(&self) -> String {
        md5_hex(&self.base)
    }
}
