//! Token estimation and greedy budget filling.
//!
//! Token counts are a cheap length-based estimate, not a tokenizer. The fill
//! is greedy and skip-not-stop: an item that does not fit is skipped whole
//! (never truncated) and the walk continues, so a later, smaller item can
//! still use the remaining budget.

/// Default characters per token (conservative estimate for English text).
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Estimate the token cost of `text` with the default ratio.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_with(text, DEFAULT_CHARS_PER_TOKEN)
}

/// Estimate the token cost of `text` with a custom chars-per-token ratio.
pub fn estimate_tokens_with(text: &str, chars_per_token: f64) -> usize {
    if text.is_empty() || chars_per_token <= 0.0 {
        return 0;
    }
    (text.len() as f64 / chars_per_token).ceil() as usize
}

/// Result of a greedy fill.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetFill<T> {
    /// Items that fit, in walk order.
    pub selected: Vec<T>,
    /// Items that did not fit, in walk order.
    pub skipped: Vec<T>,
    pub used_tokens: usize,
    pub max_tokens: usize,
}

impl<T> BudgetFill<T> {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context injection: {} selected, {} skipped, ~{}/{} tokens",
            self.selected.len(),
            self.skipped.len(),
            self.used_tokens,
            self.max_tokens,
        )
    }
}

/// Walk `items` in order, keeping each one whose cost still fits.
pub fn fill_budget<T>(
    items: impl IntoIterator<Item = T>,
    max_tokens: usize,
    cost: impl Fn(&T) -> usize,
) -> BudgetFill<T> {
    let mut fill = BudgetFill {
        selected: Vec::new(),
        skipped: Vec::new(),
        used_tokens: 0,
        max_tokens,
    };
    for item in items {
        let tokens = cost(&item);
        if fill.used_tokens + tokens <= max_tokens {
            fill.used_tokens += tokens;
            fill.selected.push(item);
        } else {
            fill.skipped.push(item);
        }
    }
    fill
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(35)), 10);
        assert_eq!(estimate_tokens(&"a".repeat(36)), 11);
        assert_eq!(estimate_tokens_with("abcdefgh", 4.0), 2);
    }

    #[test]
    fn never_exceeds_budget() {
        let costs = [40usize, 30, 25, 10, 5, 60];
        let fill = fill_budget(costs, 70, |c| *c);
        assert!(fill.used_tokens <= 70);
        assert_eq!(fill.selected, vec![40, 30]);
        assert_eq!(fill.skipped, vec![25, 10, 5, 60]);
    }

    #[test]
    fn oversized_item_is_skipped_not_stopped() {
        let items = [("big", 90usize), ("small", 20), ("tiny", 5)];
        let fill = fill_budget(items, 50, |(_, c)| *c);
        let names: Vec<&str> = fill.selected.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["small", "tiny"]);
        assert_eq!(fill.used_tokens, 25);
        assert_eq!(fill.skipped.len(), 1);
    }

    #[test]
    fn exact_fit_is_included() {
        let fill = fill_budget([25usize, 25], 50, |c| *c);
        assert_eq!(fill.selected.len(), 2);
        assert_eq!(fill.used_tokens, 50);
    }

    #[test]
    fn zero_budget_selects_only_free_items() {
        let fill = fill_budget([0usize, 1], 0, |c| *c);
        assert_eq!(fill.selected, vec![0]);
        assert!(fill.to_log_string().contains("1 selected, 1 skipped"));
    }
}
