//! Wrapper around str that makes comparisons follow IRC casemapping.
//!
//! IRC identifiers (nicknames and channel names) are compared case-insensitively, with the
//! additional twist that `{`, `}` and `|` are the lowercase forms of `[`, `]` and `\`.  This crate
//! provides a wrapper that implements `Hash` and `Eq` accordingly, so that it can be used as a
//! `HashMap` key.  Actually used by kaede's `State`.

#![warn(clippy::all, rust_2018_idioms)]
#![allow(clippy::filter_map, clippy::find_map, clippy::shadow_unrelated, clippy::use_self)]

use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

/// Maps a byte to its canonical (lowercase) form for comparisons.
pub fn scrub(b: u8) -> u8 {
    match b {
        b'{' => b'[',
        b'}' => b']',
        b'|' => b'\\',
        other => other.to_ascii_lowercase(),
    }
}

/// Case-insensitive wrapper.
#[repr(transparent)]
pub struct UniCase<S: ?Sized>(pub S);

impl<'a> From<&'a str> for &'a UniCase<str> {
    fn from(s: &'a str) -> &'a UniCase<str> {
        // UniCase is repr(transparent) over its only field, so a &str can be reinterpreted
        // as a &UniCase<str>.
        unsafe { &*(s as *const str as *const UniCase<str>) }
    }
}

/// Borrows a `&str` as a `&UniCase<str>`, for map lookups.
pub fn u(s: &str) -> &UniCase<str> {
    s.into()
}

impl<S> AsRef<str> for UniCase<S>
    where S: AsRef<str> + ?Sized,
{
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl<S> Hash for UniCase<S>
    where S: AsRef<str> + ?Sized,
{
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        let bytes = self.0.as_ref().as_bytes();
        for &byte in bytes {
            hasher.write_u8(scrub(byte));
        }
    }
}

impl<S1, S2> PartialEq<UniCase<S2>> for UniCase<S1>
    where S1: AsRef<str> + ?Sized,
          S2: AsRef<str> + ?Sized,
{
    fn eq(&self, other: &UniCase<S2>) -> bool {
        let a = self.0.as_ref().as_bytes();
        let b = other.0.as_ref().as_bytes();
        a.len() == b.len() && a.iter().zip(b).all(|(&a, &b)| scrub(a) == scrub(b))
    }
}

impl<S> Eq for UniCase<S>
    where S: AsRef<str> + ?Sized,
{}

impl Borrow<UniCase<str>> for UniCase<String> {
    fn borrow(&self) -> &UniCase<str> {
        self.0.as_str().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_case_fold() {
        assert_eq!(u("Kaede"), u("kAEDE"));
        assert_eq!(u("#Channel"), u("#channel"));
        assert!(u("kaede") != u("kaede_"));
    }

    #[test]
    fn test_irc_casemapping() {
        assert_eq!(u("nick{}|"), u("NICK[]\\"));
        assert_eq!(u("{o}"), u("[O]"));
        assert!(u("nick{") != u("nick}"));
    }

    #[test]
    fn test_hashmap_key() {
        let mut map = std::collections::HashMap::new();
        map.insert(UniCase(String::from("#Test{}")), 1);
        assert_eq!(map.get(u("#test[]")), Some(&1));
        assert_eq!(map.get(u("#other")), None);
    }
}
