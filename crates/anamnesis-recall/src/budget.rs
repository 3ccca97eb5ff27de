//! Character-budget accounting for the composer. Deliberately not coupled
//! to a tokenizer crate — the 4-chars-≈-1-token heuristic is good enough
//! for deciding how much to include, and the manifest reports exact chars
//! anyway.

/// Approximates token count from a character count. Used only to annotate
/// budget-related log lines; the manifest itself always reports chars.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Greedily takes whole items while they fit in `remaining_budget`, in the
/// given order. Never truncates an item mid-sentence — an item that
/// doesn't fit is dropped, not clipped.
pub fn fit_budget(items: Vec<String>, remaining_budget: usize) -> (Vec<String>, usize) {
    let mut kept = Vec::new();
    let mut used = 0usize;
    for item in items {
        let len = item.chars().count();
        if used + len > remaining_budget {
            continue;
        }
        used += len;
        kept.push(item);
    }
    (kept, used)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_divides_by_four_rounding_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn fit_budget_drops_whole_items_that_overflow() {
        let items = vec!["a".repeat(10), "b".repeat(10), "c".repeat(5)];
        let (kept, used) = fit_budget(items, 15);
        assert_eq!(kept, vec!["a".repeat(10), "c".repeat(5)]);
        assert_eq!(used, 15);
    }
}
