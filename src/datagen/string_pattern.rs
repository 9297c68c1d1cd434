//! Generates strings matching a JSON Schema `pattern` regex, so the Data
//! Generator never has to guess at a pattern's structure by trial and error.

use rand::distr::Distribution;

const MAX_REPEAT: u32 = 16;

/// Returns a string matching `pattern`, or `None` if the pattern cannot be
/// compiled into a generator (malformed regex, unsupported construct).
pub fn generate_matching(pattern: &str) -> Option<String> {
    // rand_regex can't compile the `^`/`$` anchor tokens JSON Schema patterns
    // commonly wrap a pattern in; stripping them is safe since rand_regex
    // already generates a string matching the expression in full.
    let trimmed = pattern.strip_prefix('^').unwrap_or(pattern);
    let trimmed = trimmed.strip_suffix('$').unwrap_or(trimmed);
    let generator_ = rand_regex::Regex::compile(trimmed, MAX_REPEAT).ok()?;
    let mut rng = rand::rng();
    Some(generator_.sample(&mut rng))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_digit_triplet() {
        let re = regex::Regex::new("^[0-9]{3}$").unwrap();
        for _ in 0..20 {
            let s = generate_matching("[0-9]{3}").unwrap();
            assert!(re.is_match(&s));
        }
    }
}
