mod id;

pub use id::*;

use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Returns a random lowercase alphanumeric string of the given length.
pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .map(|c| c.to_ascii_lowercase())
        .take(length)
        .collect()
}

/// Trims the input and rejects it if it ends up empty or longer than `max_length` characters.
pub fn normalize_text(input: &str, max_length: usize) -> Option<String> {
    let trimmed = input.trim();

    if trimmed.is_empty() || trimmed.chars().count() > max_length {
        return None;
    }

    Some(trimmed.to_string())
}

#[cfg(test)]
mod test {
    use super::{normalize_text, random_string};

    #[test]
    fn random_string_has_requested_length() {
        let value = random_string(9);

        assert_eq!(value.len(), 9);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(value, value.to_ascii_lowercase());
    }

    #[test]
    fn normalize_text_trims_and_bounds() {
        assert_eq!(normalize_text("  movie night ", 32), Some("movie night".into()));
        assert_eq!(normalize_text("   ", 32), None);
        assert_eq!(normalize_text("abcdef", 5), None);
    }
}
