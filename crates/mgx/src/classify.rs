//! 🏷️ classify.rs — the sorting hat for object keys.
//!
//! 🎬 *[a key approaches the velvet rope]*
//! "Name?" — "vendor-feed_2021.json" — "...you're on the list. Group: vendor-feed."
//! "Name?" — "readme.txt" — "...sir, this is a JSON merge pipeline."
//!
//! Every key in the bucket walks past this module twice: once during the
//! census pass, once during the merge pass. Both passes MUST agree on the
//! group, or the completion math turns into modern art. That's why everything
//! in here is a pure function of the key string. No state. No I/O. No vibes
//! that could differ between Tuesday and Wednesday.
//!
//! 🧠 Knowledge graph:
//! - A key **qualifies** iff it ends in `.json` AND contains `_YYYY` where
//!   YYYY is 1990..=2029 (two disjoint shapes: `199x` and `20[0-2]x`).
//! - The **GroupId** is the sanitized basename, truncated at the first
//!   `_YYYY`. The underscore is the year's problem, not the group's.
//! - Sanitization: anything outside {word chars, `-`, `_`, `.`, space}
//!   becomes `_`. Applied before the split, so census and merge see the
//!   same string. One reality. Shared by both passes. Revolutionary.
//! - Underscore hunting is done with `memchr` — a metal detector for bytes.
//!
//! 📜 Ancient proverb: "He who classifies keys differently in two passes,
//! waits forever for a group that was complete last Tuesday."

use memchr::memchr_iter;

/// 📄 The one true document suffix. Everything else is somebody else's data.
pub(crate) const DOC_SUFFIX: &str = ".json";

/// 🗓️ Is the 4-byte window at the front of `bytes` a year we care about?
///
/// Accepted shapes, straight from the qualification rule:
/// - `199x` — the dial-up years (1990..=1999)
/// - `20[0-2]x` — everything from Y2K up to 2029
///
/// `1989` is rejected for being too retro. `2030` is rejected for being
/// science fiction. No boundary check after the 4th digit — `_20200` counts,
/// because the match is "contains", not "is exactly".
fn is_year_token(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }
    let all_digits = bytes[..4].iter().all(u8::is_ascii_digit);
    if !all_digits {
        return false;
    }
    match (bytes[0], bytes[1]) {
        (b'1', b'9') => bytes[2] == b'9',
        (b'2', b'0') => bytes[2] <= b'2',
        _ => false,
    }
}

/// 🔍 Finds the byte offset of the first `_` that is immediately followed by
/// a qualifying year token. Returns `None` if the string is year-free.
///
/// memchr does the underscore hunting at SIMD speed; we only pay the
/// four-byte year check at each candidate. For key-sized strings this is
/// overkill, and we regret nothing.
fn find_year_split(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    memchr_iter(b'_', bytes).find(|&pos| is_year_token(&bytes[pos + 1..]))
}

/// 🧼 Scrubs a filename until it is fit for local disk duty.
///
/// Anything outside {word chars, `-`, `_`, `.`, space} becomes `_`. The same
/// scrubbed string feeds both the GroupId split and the scratch filename, so
/// the group a file counts toward is the group its bytes land in. No
/// census-says-one-thing-merge-says-another energy allowed here.
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// 🏷️ The classifier itself: key in, `Some(GroupId)` out — or `None` for the
/// keys that never belonged here.
///
/// # Contract
/// - Pure. Deterministic. Same key, same answer, both passes, forever.
/// - Qualification looks at the *whole key* (a year hiding in a directory
///   name still counts), but the GroupId is cut from the sanitized basename.
/// - If the basename itself carries no year token, the whole sanitized
///   basename is the GroupId. Odd? Yes. Consistent? Also yes, and consistent
///   pays the bills around here.
pub(crate) fn classify(key: &str) -> Option<String> {
    if !key.ends_with(DOC_SUFFIX) {
        return None;
    }
    find_year_split(key)?;

    // 🔪 basename: everything after the last '/'. rsplit always yields at
    // least one piece, so the unwrap_or is ceremonial.
    let basename = key.rsplit('/').next().unwrap_or(key);
    let safe = sanitize(basename);

    let group = match find_year_split(&safe) {
        Some(split_at) => safe[..split_at].to_string(),
        None => safe,
    };
    Some(group)
}

// ============================================================
//  🧪 Tests — the classifier gets deposed under oath.
// ============================================================
