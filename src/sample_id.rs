use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Placeholder base name used when the caller did not send a filename.
const DEFAULT_BASE_NAME: &str = "unknown";

/// Generate a sample id of the form `<epoch_ms>_<random>_<base_name>`.
///
/// The random component is bounded to [0, 9999]; uniqueness is probabilistic
/// and collisions within the same millisecond are accepted rather than
/// coordinated away.
pub fn generate(file_name: Option<&str>) -> String {
    let timestamp = epoch_time_ms();
    let random = rand::rng().random_range(0..10_000u32);
    let safe_name = sanitize_base_name(file_name.unwrap_or(DEFAULT_BASE_NAME));
    format!("{}_{}_{}", timestamp, random, safe_name)
}

fn epoch_time_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis()
}

/// Strip the final extension and replace everything outside `[A-Za-z0-9_-]`
/// with `_`.
pub fn sanitize_base_name(name: &str) -> String {
    strip_extension(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// The extension is only stripped when at least one character follows the
// final dot and none of them is a path separator, matching how browsers
// name uploaded files.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() && !name[idx + 1..].contains('/') => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    #[test]
    fn test_sanitize_strips_extension_and_specials() {
        assert_eq!(sanitize_base_name("my photo!!.PNG"), "my_photo__");
        assert_eq!(sanitize_base_name("cat.jpg"), "cat");
        assert_eq!(sanitize_base_name("a.b.c"), "a_b");
        assert_eq!(sanitize_base_name("plain"), "plain");
        assert_eq!(sanitize_base_name("snake_case-name.jpeg"), "snake_case-name");
    }

    #[test]
    fn test_sanitize_edge_cases() {
        // A trailing dot is not an extension.
        assert_eq!(sanitize_base_name("name."), "name_");
        // A leading-dot name is all extension.
        assert_eq!(sanitize_base_name(".gitignore"), "");
        assert_eq!(sanitize_base_name(""), "");
    }

    #[test]
    fn test_generate_without_filename() {
        let id = generate(None);
        assert!(id.ends_with("_unknown"));
        assert!(!id.is_empty());
    }

    #[test]
    fn test_generate_charset() {
        let id = generate(Some("my photo!!.PNG"));
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!id.contains("PNG"));
    }

    #[test]
    fn test_generate_is_unique_across_milliseconds() {
        let first = generate(Some("cat.jpg"));
        // Force a different timestamp component.
        thread::sleep(Duration::from_millis(2));
        let second = generate(Some("cat.jpg"));
        assert_ne!(first, second);
    }
}
