use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum number of tags a single post may carry
pub const MAX_TAGS_PER_POST: usize = 5;

/// Preset topic tags shown in the composer, slug → display label
pub const PRESET_TAGS: [(&str, &str); 5] = [
    ("general", "一般"),
    ("question", "質問"),
    ("chat", "雑談"),
    ("illustration", "イラスト"),
    ("progress", "進捗"),
];

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

/// Display label for a preset tag slug, None for free-form tags
pub fn preset_label(slug: &str) -> Option<&'static str> {
    PRESET_TAGS
        .iter()
        .find(|(preset, _)| *preset == slug)
        .map(|(_, label)| *label)
}

/// Normalize a single tag: trim, lowercase, collapse internal
/// whitespace runs to a hyphen. Returns None when nothing is left.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let collapsed = WHITESPACE_RUN.replace_all(trimmed, "-");
    Some(collapsed.to_lowercase())
}

/// Normalize a submitted tag list: drop empties, dedupe preserving
/// first occurrence, cap at the per-post limit
pub fn prepare_tags(raw: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for tag in raw {
        if let Some(normalized) = normalize_tag(tag) {
            if !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
        if seen.len() == MAX_TAGS_PER_POST {
            break;
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize_tag("  Illustration  "), Some("illustration".to_string()));
        assert_eq!(normalize_tag("PROGRESS"), Some("progress".to_string()));
    }

    #[test]
    fn test_normalize_collapses_whitespace_to_hyphen() {
        assert_eq!(normalize_tag("pixel art"), Some("pixel-art".to_string()));
        assert_eq!(normalize_tag("pixel   art"), Some("pixel-art".to_string()));
        assert_eq!(normalize_tag("one\ttwo three"), Some("one-two-three".to_string()));
    }

    #[test]
    fn test_normalize_keeps_unicode() {
        assert_eq!(normalize_tag("イラスト"), Some("イラスト".to_string()));
        assert_eq!(normalize_tag("お絵描き 練習"), Some("お絵描き-練習".to_string()));
    }

    #[test]
    fn test_normalize_empty_is_none() {
        assert_eq!(normalize_tag(""), None);
        assert_eq!(normalize_tag("   "), None);
        assert_eq!(normalize_tag("\t\n"), None);
    }

    #[test]
    fn test_prepare_dedupes_preserving_order() {
        let raw = vec![
            "Rust".to_string(),
            "art".to_string(),
            "rust".to_string(),
            "  ART ".to_string(),
        ];
        assert_eq!(prepare_tags(&raw), vec!["rust", "art"]);
    }

    #[test]
    fn test_prepare_drops_empties() {
        let raw = vec!["".to_string(), "  ".to_string(), "chat".to_string()];
        assert_eq!(prepare_tags(&raw), vec!["chat"]);
    }

    #[test]
    fn test_prepare_caps_at_limit() {
        let raw: Vec<String> = (1..=8).map(|i| format!("tag{}", i)).collect();
        let prepared = prepare_tags(&raw);
        assert_eq!(prepared.len(), MAX_TAGS_PER_POST);
        assert_eq!(prepared[0], "tag1");
        assert_eq!(prepared[4], "tag5");
    }

    #[test]
    fn test_preset_labels() {
        assert_eq!(preset_label("general"), Some("一般"));
        assert_eq!(preset_label("question"), Some("質問"));
        assert_eq!(preset_label("chat"), Some("雑談"));
        assert_eq!(preset_label("illustration"), Some("イラスト"));
        assert_eq!(preset_label("progress"), Some("進捗"));
        assert_eq!(preset_label("rust"), None);
    }
}
