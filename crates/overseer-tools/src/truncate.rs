//! Output truncation shared by the tools.

/// Ceiling applied to shell stdout/stderr before they enter step results.
pub const OUTPUT_CEILING_CHARS: usize = 10_000;

/// Truncate `input` to `max_chars`, appending an explicit marker when
/// anything was cut. Input at exactly the ceiling passes through intact.
pub fn truncate_output(input: &str, max_chars: usize) -> (String, bool) {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return (input.to_string(), false);
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("\n... [truncated, total_chars={}]", char_count));
    (preview, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_at_ceiling_is_untouched() {
        let input = "x".repeat(OUTPUT_CEILING_CHARS);
        let (out, truncated) = truncate_output(&input, OUTPUT_CEILING_CHARS);
        assert!(!truncated);
        assert_eq!(out.len(), OUTPUT_CEILING_CHARS);
    }

    #[test]
    fn test_output_one_past_ceiling_is_truncated() {
        let input = "x".repeat(OUTPUT_CEILING_CHARS + 1);
        let (out, truncated) = truncate_output(&input, OUTPUT_CEILING_CHARS);
        assert!(truncated);
        assert!(out.contains("[truncated, total_chars=10001]"));
        assert!(out.starts_with(&"x".repeat(100)));
    }
}
