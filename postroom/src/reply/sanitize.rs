//! Inbound reply content cleanup
//!
//! Replies arrive as full plaintext bodies carrying the quoted previous
//! message, an attribution header, and often a signature. [`clean`] strips
//! all of that so only the author's new text reaches the response record.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches reply attribution headers such as
/// `On Jan 1, 2024, at 9:00 AM, Alice <alice@example.com> wrote:`.
static REPLY_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^On .+wrote:$").expect("reply header pattern is valid"));

/// Strip quoted reply chains and signatures from an inbound plaintext body.
///
/// Rules, applied line by line:
/// - An `On <date…> wrote:` attribution header ends the author's text;
///   everything from there on is the quoted chain and is discarded.
/// - Lines beginning with `>` (quoted text) are dropped.
/// - A line consisting solely of `--` is the signature delimiter; it and
///   everything after are discarded.
/// - Runs of three or more blank lines collapse to a single blank line.
/// - Leading and trailing whitespace is trimmed.
///
/// Total function: never panics, and empty input yields empty output.
#[must_use]
pub fn clean(input: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed == "--" || REPLY_HEADER.is_match(trimmed) {
            break;
        }
        if trimmed.starts_with('>') {
            continue;
        }
        kept.push(line);
    }

    let mut out: Vec<&str> = Vec::new();
    let mut index = 0;
    while index < kept.len() {
        if kept[index].trim().is_empty() {
            let mut end = index;
            while end < kept.len() && kept[end].trim().is_empty() {
                end += 1;
            }
            let run = end - index;
            if run >= 3 {
                out.push("");
            } else {
                for _ in 0..run {
                    out.push("");
                }
            }
            index = end;
        } else {
            out.push(kept[index]);
            index += 1;
        }
    }

    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_quotes_attribution_and_signature() {
        let input = "Hello\n> quoted line\nOn Jan 1, 2024, X wrote:\nBody\n--\nSignature";
        assert_eq!(clean(input), "Hello");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(clean(""), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(clean("Looks good to me.\nShipping today."), "Looks good to me.\nShipping today.");
    }

    #[test]
    fn signature_delimiter_truncates() {
        assert_eq!(clean("Thanks!\n--\nAlice\nExample Corp"), "Thanks!");
    }

    #[test]
    fn signature_delimiter_with_trailing_space_truncates() {
        assert_eq!(clean("Thanks!\n-- \nAlice"), "Thanks!");
    }

    #[test]
    fn quoted_lines_are_dropped_anywhere() {
        assert_eq!(clean("> earlier\nReply text\n> more quoting\nAnd more reply"), "Reply text\nAnd more reply");
    }

    #[test]
    fn attribution_header_discards_the_rest() {
        let input = "My answer\nOn Mon, Feb 5, 2024 at 10:12 AM Bob <bob@example.com> wrote:\n> old\n> older";
        assert_eq!(clean(input), "My answer");
    }

    #[test]
    fn sentence_starting_with_on_is_kept() {
        assert_eq!(clean("On balance I agree."), "On balance I agree.");
    }

    #[test]
    fn long_blank_runs_collapse_to_one() {
        assert_eq!(clean("first\n\n\n\n\nsecond"), "first\n\nsecond");
    }

    #[test]
    fn short_blank_runs_are_preserved() {
        assert_eq!(clean("first\n\nsecond"), "first\n\nsecond");
    }

    #[test]
    fn crlf_input_is_handled() {
        assert_eq!(clean("Hello\r\n> quoted\r\n--\r\nsig"), "Hello");
    }

    proptest! {
        #[test]
        fn never_panics_and_output_has_no_quoted_lines(input in ".{0,400}") {
            let cleaned = clean(&input);
            prop_assert!(cleaned.lines().all(|l| !l.trim().starts_with('>')));
        }

        #[test]
        fn cleaning_is_idempotent(input in "[a-zA-Z>\\-\n ]{0,200}") {
            let once = clean(&input);
            prop_assert_eq!(clean(&once), once);
        }
    }
}
