//! Three word address detection in free text
//!
//! Words are runs of Unicode letters with their combining marks. Besides the ASCII
//! dot, the separators include the full stops of the scripts what3words supports.

use std::sync::LazyLock;

use regex::Regex;

/// A complete address, e.g. `///filled.count.soap`
static POSSIBLE_3WA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^/*(?:",
        r"(?:\p{L}\p{M}*)+[.｡。･・︒។։။۔።।](?:\p{L}\p{M}*)+[.｡。･・︒។։။۔።।](?:\p{L}\p{M}*)+",
        r"|",
        r"(?:\p{L}\p{M}*)+(?:[\x20\x{A0}](?:\p{L}\p{M}*)+){1,3}",
        r"[.｡。･・︒។։။۔።।](?:\p{L}\p{M}*)+(?:[\x20\x{A0}](?:\p{L}\p{M}*)+){1,3}",
        r"[.｡。･・︒។։။۔።।](?:\p{L}\p{M}*)+(?:[\x20\x{A0}](?:\p{L}\p{M}*)+){1,3}",
        r")$"
    ))
    .expect("address pattern is valid")
});

/// Three words joined by one or two loose delimiters, e.g. `filled count soap`
static DID_YOU_MEAN_3WA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^/*(?:\p{L}\p{M}*)+[.｡。･・︒។։။۔።। ,\\\^_/+'&:;|　\-]{1,2}",
        r"(?:\p{L}\p{M}*)+[.｡。･・︒។։။۔።। ,\\\^_/+'&:;|　\-]{1,2}",
        r"(?:\p{L}\p{M}*)+$"
    ))
    .expect("did-you-mean pattern is valid")
});

/// An address anywhere inside a longer text
static SEARCH_3WA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?:\p{L}\p{M}*)+[.｡。･・︒។։။۔።।]",
        r"(?:\p{L}\p{M}*)+[.｡。･・︒។։။۔።।]",
        r"(?:\p{L}\p{M}*)+"
    ))
    .expect("search pattern is valid")
});

static DELIMITERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[.｡。･・︒។։။۔።। ,\\\^_/+'&:;|　\-]+").expect("delimiter pattern is valid")
});

/// Whether `text` has the exact shape of a three word address
pub fn is_possible_3wa(text: &str) -> bool {
    POSSIBLE_3WA.is_match(text)
}

/// Whether `text` looks like three words typed with the wrong delimiters
pub fn did_you_mean_3wa(text: &str) -> bool {
    DID_YOU_MEAN_3WA.is_match(text)
}

/// Every address found in `text`, in order of appearance
pub fn search_possible_3wa(text: &str) -> Vec<String> {
    SEARCH_3WA
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Rewrite loosely delimited words into dotted form: `filled count soap` -> `filled.count.soap`
pub fn normalize_delimiters(text: &str) -> String {
    DELIMITERS
        .splitn(text.trim_start_matches('/'), 3)
        .collect::<Vec<_>>()
        .join(".")
}
