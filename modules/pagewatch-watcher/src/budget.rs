//! Context budgeting for the two snapshot bodies of a diff prompt.
//!
//! A model's context window is given in tokens; we approximate 4 characters
//! per token, subtract the fixed prompt overhead, and split the remainder
//! three ways: two text bodies plus the instructions themselves.

/// Characters reserved for the prompt scaffolding around the two bodies.
pub const PROMPT_OVERHEAD_CHARS: u64 = 3000;

/// Safe character budget per text body for a model with the given context
/// window. Deterministic; `round((tokens * 4 - overhead) / 3)`.
pub fn char_budget(context_tokens: u64, prompt_overhead_chars: u64) -> usize {
    let usable = (context_tokens * 4).saturating_sub(prompt_overhead_chars);
    (usable as f64 / 3.0).round() as usize
}

/// Head-truncate to at most `max_chars` characters (not bytes), so the cut
/// always lands on a character boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
