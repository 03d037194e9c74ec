//! Input hardening: best-effort cleaning, strict allow-list gates and room
//! code generation.
//!
//! [`sanitize`] is advisory. It is never the acceptance gate; callers must run
//! the cleaned value through [`is_valid_username`] or [`is_valid_room_id`]
//! before trusting it.

use rand::Rng;

use crate::models::RoomId;

pub const ROOM_ID_LEN: usize = 4;
pub const USERNAME_MAX_LEN: usize = 20;
const USERNAME_MIN_LEN: usize = 3;

const STRIPPED_CHARS: &[char] = &['<', '>', '"', '\'', '`'];
const SCRIPT_SCHEME: &str = "javascript:";

/// Clean an untrusted string.
///
/// Steps, in order: missing input becomes empty, surrounding whitespace is
/// trimmed, markup/quote characters are dropped, `javascript:` and
/// `on<word>=` fragments are removed case-insensitively, NUL bytes are
/// dropped, and the result is cut to `max_len` characters.
pub fn sanitize(input: Option<&str>, max_len: usize) -> String {
    let trimmed = input.unwrap_or("").trim();
    let without_chars: String = trimmed
        .chars()
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .collect();
    let without_scheme = remove_ignore_ascii_case(&without_chars, SCRIPT_SCHEME);
    let without_handlers = remove_event_handlers(&without_scheme);
    without_handlers
        .chars()
        .filter(|c| *c != '\0')
        .take(max_len)
        .collect()
}

/// `^[A-Za-z0-9_-]{3,20}$`
pub fn is_valid_username(s: &str) -> bool {
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&s.len())
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// `^[A-Z]{4}$`
pub fn is_valid_room_id(s: &str) -> bool {
    s.len() == ROOM_ID_LEN && s.bytes().all(|b| b.is_ascii_uppercase())
}

/// Room code pipeline shared by create and join: sanitize to four
/// characters, upper-case, then keep `A`-`Z` only. The result may be empty or
/// short; validation is the caller's job.
pub fn clean_room_input(raw: &str) -> String {
    sanitize(Some(raw), ROOM_ID_LEN)
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .collect()
}

/// Produce a uniformly distributed 4-letter room code.
///
/// Not a secret; any uniform source is acceptable.
pub fn generate_room_code() -> RoomId {
    generate_room_code_with(&mut rand::rng())
}

pub fn generate_room_code_with<R: Rng + ?Sized>(rng: &mut R) -> RoomId {
    let code: String = (0..ROOM_ID_LEN)
        .map(|_| char::from(b'A' + rng.random_range(0..26u8)))
        .collect();
    RoomId::new_unchecked(code)
}

fn remove_ignore_ascii_case(haystack: &str, needle: &str) -> String {
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack;
    while !rest.is_empty() {
        if starts_with_ignore_ascii_case(rest, needle) {
            rest = &rest[needle.len()..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Drop every `on<word>=` fragment, where `<word>` is one or more of
/// `[A-Za-z0-9_]`.
fn remove_event_handlers(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while !rest.is_empty() {
        if starts_with_ignore_ascii_case(rest, "on") {
            let word_len = rest[2..]
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                .count();
            let eq_at = 2 + word_len;
            if word_len > 0 && rest.as_bytes().get(eq_at) == Some(&b'=') {
                rest = &rest[eq_at + 1..];
                continue;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
