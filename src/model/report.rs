/// Achieved count of one `(category, value)` in a panel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CategoryCount {
    /// Category name.
    pub category: String,
    /// Category value.
    pub value: String,
    /// Panel members with this value.
    pub selected: usize,
    /// Active lower bound.
    pub lower: usize,
    /// Active upper bound.
    pub upper: usize,
    /// Pool members with this value.
    pub pool_count: usize,
}

impl CategoryCount {
    /// Share of a panel of size `panel_size`, in percent.
    pub fn percent(&self, panel_size: usize) -> f64 {
        if panel_size == 0 {
            return 0.0;
        }
        self.selected as f64 * 100.0 / panel_size as f64
    }

    /// Whether `selected` lies within `[lower, upper]`.
    pub fn is_within_bounds(&self) -> bool {
        self.lower <= self.selected && self.selected <= self.upper
    }
}

impl std::fmt::Display for CategoryCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} selected {} of {} (want [{}, {}])",
            self.category, self.value, self.selected, self.pool_count, self.lower, self.upper
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_and_bounds() {
        let count = CategoryCount {
            category: "gender".into(),
            value: "F".into(),
            selected: 2,
            lower: 2,
            upper: 3,
            pool_count: 5,
        };
        assert!((count.percent(5) - 40.0).abs() < 1e-12);
        assert_eq!(count.percent(0), 0.0);
        assert!(count.is_within_bounds());
        assert_eq!(count.to_string(), "gender:F selected 2 of 5 (want [2, 3])");
    }
}
