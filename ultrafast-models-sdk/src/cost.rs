//! Cost table (C17): `(provider, model) -> {prompt_usd_per_1k, completion_usd_per_1k}`.
//! A missing entry yields no cost at all rather than a fabricated number —
//! cost is only ever reported when a real rate is on file.

#[derive(Debug, Clone, Copy)]
struct Rate {
    prompt_usd_per_1k: f64,
    completion_usd_per_1k: f64,
}

fn rate_for(provider: &str, model: &str) -> Option<Rate> {
    // Exact (provider, model) entries first; providers with per-model
    // pricing go here instead of a flat provider-wide rate.
    let exact = match (provider, model) {
        ("openai", "gpt-4o") => Some(Rate { prompt_usd_per_1k: 0.0025, completion_usd_per_1k: 0.01 }),
        ("openai", "gpt-4o-mini") => Some(Rate { prompt_usd_per_1k: 0.00015, completion_usd_per_1k: 0.0006 }),
        ("openai", "gpt-4-turbo") => Some(Rate { prompt_usd_per_1k: 0.01, completion_usd_per_1k: 0.03 }),
        ("openai", "gpt-4") => Some(Rate { prompt_usd_per_1k: 0.03, completion_usd_per_1k: 0.06 }),
        ("openai", "gpt-3.5-turbo") => Some(Rate { prompt_usd_per_1k: 0.0005, completion_usd_per_1k: 0.0015 }),
        ("anthropic", "claude-opus-4-20250514") => Some(Rate { prompt_usd_per_1k: 0.015, completion_usd_per_1k: 0.075 }),
        ("anthropic", "claude-sonnet-4-20250514") => Some(Rate { prompt_usd_per_1k: 0.003, completion_usd_per_1k: 0.015 }),
        ("anthropic", "claude-3-5-haiku-20241022") => Some(Rate { prompt_usd_per_1k: 0.0008, completion_usd_per_1k: 0.004 }),
        ("gemini", "gemini-1.5-pro") => Some(Rate { prompt_usd_per_1k: 0.0035, completion_usd_per_1k: 0.0105 }),
        ("gemini", "gemini-1.5-flash") => Some(Rate { prompt_usd_per_1k: 0.000075, completion_usd_per_1k: 0.0003 }),
        _ => None,
    };
    if exact.is_some() {
        return exact;
    }

    // Providers priced uniformly across their catalog, or where the caller
    // did not pin a model whose pricing is tracked above.
    match provider {
        "ollama" => Some(Rate { prompt_usd_per_1k: 0.0, completion_usd_per_1k: 0.0 }),
        "anthropic" => Some(Rate { prompt_usd_per_1k: 0.015, completion_usd_per_1k: 0.075 }),
        "openai" => Some(Rate { prompt_usd_per_1k: 0.03, completion_usd_per_1k: 0.06 }),
        "google-vertex-ai" => Some(Rate { prompt_usd_per_1k: 0.0005, completion_usd_per_1k: 0.0015 }),
        _ => None,
    }
}

/// Estimated USD cost for a completed request. Returns `None` when no rate
/// is on file for `(provider, model)` — never fabricate a number.
pub fn estimate_cost_usd(provider: &str, model: &str, prompt_tokens: u32, completion_tokens: u32) -> Option<f64> {
    let rate = rate_for(provider, model)?;
    let prompt_cost = (prompt_tokens as f64 / 1_000.0) * rate.prompt_usd_per_1k;
    let completion_cost = (completion_tokens as f64 / 1_000.0) * rate.completion_usd_per_1k;
    Some(prompt_cost + completion_cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_model_pricing_used_when_present() {
        let cost = estimate_cost_usd("openai", "gpt-4", 1000, 1000).unwrap();
        assert!((cost - 0.09).abs() < 1e-9);
    }

    #[test]
    fn ollama_is_free() {
        assert_eq!(estimate_cost_usd("ollama", "llama3", 10_000, 10_000), Some(0.0));
    }

    #[test]
    fn unknown_provider_reports_no_cost() {
        assert_eq!(estimate_cost_usd("made-up-provider", "x", 500, 500), None);
    }

    #[test]
    fn falls_back_to_provider_wide_rate_for_untracked_model() {
        let cost = estimate_cost_usd("anthropic", "claude-unreleased-model", 1000, 1000);
        assert_eq!(cost, Some(0.015 + 0.075));
    }
}
