// vendabot-core/src/services/sanitize.rs

use once_cell::sync::Lazy;
use regex::Regex;

static LONG_DIGIT_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{7,}").unwrap_or_else(|e| panic!("invalid digit-run regex: {e}"))
});

/// Breaks runs of 7+ consecutive digits into space-separated groups of 4.
///
/// The marketplace's spam filter rejects answers containing raw long numeric
/// strings (phone numbers, part registration numbers). After one pass no run
/// of 7+ digits remains, so reapplying is a no-op.
pub fn space_long_digit_runs(text: &str) -> String {
    LONG_DIGIT_RUN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let digits = &caps[0];
            digits
                .as_bytes()
                .chunks(4)
                .map(|c| std::str::from_utf8(c).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .into_owned()
}
