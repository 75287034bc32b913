//! Per-model metadata: context windows and output-token defaults.
//!
//! These are hints, not contracts. The context window feeds the engine's
//! history trimming; the max-token default is applied when a request
//! does not set one.

/// Context window size in tokens for a model name.
///
/// Matching is substring-based on the lowercased name, so versioned
/// identifiers ("claude-3-5-sonnet-20241022") resolve without updates.
pub fn context_window(model: &str) -> u32 {
    let name = model.to_ascii_lowercase();

    if name.contains("claude-3") || name.contains("claude-sonnet") {
        return 200_000;
    }
    if name.contains("gpt-4") {
        if name.contains("turbo") || name.contains("128k") {
            return 128_000;
        }
        if name.contains("32k") {
            return 32_000;
        }
        return 8_000;
    }
    if name.contains("gpt-3.5") {
        if name.contains("16k") {
            return 16_000;
        }
        return 4_000;
    }
    if name.contains("deepseek") {
        return 64_000;
    }

    // Conservative default for unknown models.
    10_000
}

/// Default `max_tokens` for a model when the request does not set one.
pub fn default_max_tokens(model: &str) -> u32 {
    let name = model.to_ascii_lowercase();

    if name.starts_with("claude-3-5") || name.starts_with("claude-3-7") {
        return 8_192;
    }
    if name.starts_with("claude-3") && name.contains("opus") {
        return 4_096;
    }
    4_096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_models_get_large_window() {
        assert_eq!(context_window("claude-3-5-sonnet-20241022"), 200_000);
        assert_eq!(context_window("claude-sonnet-4-20250514"), 200_000);
    }

    #[test]
    fn gpt4_variants() {
        assert_eq!(context_window("gpt-4-turbo"), 128_000);
        assert_eq!(context_window("gpt-4-32k"), 32_000);
        assert_eq!(context_window("gpt-4"), 8_000);
    }

    #[test]
    fn gpt35_and_deepseek() {
        assert_eq!(context_window("gpt-3.5-turbo-16k"), 16_000);
        assert_eq!(context_window("gpt-3.5-turbo"), 4_000);
        assert_eq!(context_window("deepseek-chat"), 64_000);
    }

    #[test]
    fn unknown_model_gets_conservative_default() {
        assert_eq!(context_window("mistral-large"), 10_000);
    }

    #[test]
    fn max_tokens_by_claude_family() {
        assert_eq!(default_max_tokens("claude-3-5-sonnet-20241022"), 8_192);
        assert_eq!(default_max_tokens("claude-3-7-sonnet-latest"), 8_192);
        assert_eq!(default_max_tokens("claude-3-opus-20240229"), 4_096);
        assert_eq!(default_max_tokens("gpt-4o"), 4_096);
    }
}
