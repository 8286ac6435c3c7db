use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::Error;
use crate::model::{CACHE_KEY_SALT, EntryKind, SALT_KEYS, Value};
use crate::reader::Reader;

/// Characters a generated key is drawn from.
pub const KEY_ALPHABET: &[u8; 91] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()-_[]{}<>~`+=,.;:/?|";

pub const DEFAULT_KEY_LENGTH: usize = 64;

/// Bytes at or above this would bias `byte % 91` and are discarded.
const ACCEPT_BELOW: u8 = (256 / KEY_ALPHABET.len() * KEY_ALPHABET.len()) as u8;

/// Generate a key from the operating system's secure random source.
pub fn generate_key(length: usize) -> Result<String, Error> {
    generate_key_with(&mut OsRng, length)
}

/// Generate a key from `rng`. A failing source yields
/// [`Error::InsecureRandomnessUnavailable`].
pub fn generate_key_with<R: RngCore + ?Sized>(rng: &mut R, length: usize) -> Result<String, Error> {
    let mut key = String::with_capacity(length);
    let mut buf = [0u8; 64];
    while key.len() < length {
        rng.try_fill_bytes(&mut buf)
            .map_err(Error::InsecureRandomnessUnavailable)?;
        for byte in buf.iter().copied().filter(|byte| *byte < ACCEPT_BELOW) {
            if key.len() == length {
                break;
            }
            key.push(char::from(KEY_ALPHABET[usize::from(byte) % KEY_ALPHABET.len()]));
        }
    }
    Ok(key)
}

/// A fresh value for every salt constant, in their canonical order.
pub fn generate_salt_set<R: RngCore + ?Sized>(
    rng: &mut R,
    include_cache_salt: bool,
) -> Result<Vec<(String, String)>, Error> {
    let names = SALT_KEYS
        .iter()
        .copied()
        .chain(include_cache_salt.then_some(CACHE_KEY_SALT));
    names
        .map(|name| Ok((name.to_owned(), generate_key_with(&mut *rng, DEFAULT_KEY_LENGTH)?)))
        .collect()
}

pub fn is_salt_key(name: &str) -> bool {
    SALT_KEYS.contains(&name)
}

/// Extract `define(...)` salts from a remote service response body.
pub fn parse_salts(body: &str) -> Result<Vec<(String, String)>, Error> {
    let source = if body.trim_start().starts_with("<?") {
        body.to_owned()
    } else {
        format!("<?php\n{body}")
    };
    let entries = Reader::new().read_source(&source, "salts.php")?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry.value {
            Value::String(value) if entry.kind == EntryKind::Constant => {
                Some((entry.name, value))
            }
            _ => None,
        })
        .collect())
}
