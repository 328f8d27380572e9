use std::collections::HashSet;

/// Shortest digit run that counts as a score code.
pub const MIN_CODE_LEN: usize = 5;

/// Pulls every distinct score code out of pasted text.
///
/// Each line is scanned for maximal runs of ASCII digits; runs shorter than
/// [`MIN_CODE_LEN`] are dropped (track counts, dates) and repeats collapse.
/// Runs embedded in alphanumeric tokens still count. Output keeps first-seen
/// order, although callers treat it as a set.
pub fn extract_score_codes(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut codes = Vec::new();

    for line in text.lines() {
        for run in digit_runs(line) {
            if run.len() >= MIN_CODE_LEN && seen.insert(run) {
                codes.push(run.to_string());
            }
        }
    }

    codes
}

fn digit_runs(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
}

/// `^\d{5,}$` after trimming.
pub fn is_valid_score_code(value: &str) -> bool {
    let value = value.trim();
    value.len() >= MIN_CODE_LEN && value.bytes().all(|b| b.is_ascii_digit())
}

/// Parses a completion percentage, accepting only whole numbers in 0..=100.
pub fn parse_completion(raw: &str) -> Option<u8> {
    raw.trim()
        .parse::<u8>()
        .ok()
        .filter(|value| *value <= 100)
}
