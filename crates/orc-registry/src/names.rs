//! Funny two-part instance display names, used when a spawn caller doesn't
//! supply one (SPEC_FULL.md §1B, grounded on the source system's
//! `name_generator.py`). Collisions append a numeric suffix.

const ADJECTIVES: &[&str] = &[
    "brisk", "cosmic", "quiet", "nimble", "stubborn", "velvet", "rusty", "amber",
    "placid", "feral", "lucid", "gilded", "wry", "sturdy", "errant", "vivid",
];

const NOUNS: &[&str] = &[
    "falcon", "otter", "ember", "cipher", "harbor", "ridge", "lantern", "quill",
    "anchor", "thicket", "comet", "meadow", "forge", "tideline", "compass", "warden",
];

fn pick<'a>(list: &'a [&'a str], seed: u64) -> &'a str {
    list[(seed as usize) % list.len()]
}

/// Deterministic given a seed (typically derived from a counter or a random
/// source at the call site), so tests can assert on specific output.
pub fn generate_name(seed: u64) -> String {
    let adj = pick(ADJECTIVES, seed);
    let noun = pick(NOUNS, seed.rotate_right(7));
    format!("{adj}-{noun}")
}

/// Appends a numeric suffix if `base` collides with an existing name.
pub fn disambiguate(base: &str, existing: &[String]) -> String {
    if !existing.iter().any(|n| n == base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !existing.iter().any(|e| e == &candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_name_is_adjective_dash_noun() {
        let name = generate_name(42);
        let parts: Vec<&str> = name.split('-').collect();
        assert_eq!(parts.len(), 2);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
    }

    #[test]
    fn disambiguate_appends_suffix_on_collision() {
        let existing = vec!["brisk-otter".to_string()];
        assert_eq!(disambiguate("brisk-otter", &existing), "brisk-otter-2");
    }

    #[test]
    fn disambiguate_skips_taken_suffixes() {
        let existing = vec!["brisk-otter".to_string(), "brisk-otter-2".to_string()];
        assert_eq!(disambiguate("brisk-otter", &existing), "brisk-otter-3");
    }

    #[test]
    fn disambiguate_passthrough_when_unique() {
        let existing = vec!["cosmic-ember".to_string()];
        assert_eq!(disambiguate("brisk-otter", &existing), "brisk-otter");
    }
}
