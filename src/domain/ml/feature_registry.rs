/// Columns whose name starts with this prefix are model features.
pub const DEFAULT_FEATURE_PREFIX: &str = "%";

/// Name of the column produced by the forward mean return label.
pub const DEFAULT_LABEL: &str = "s";

/// Price column the label is derived from.
pub const CLOSE_COLUMN: &str = "close";

/// Ordered list of indicator columns written by `populate_indicators`.
/// Saved models depend on this order; any change here breaks them.
pub const INDICATOR_FEATURES: &[&str] = &[
    "%-rsi",
    "%-roc",
    "%-bb_width",
    "%-close_sma_ratio",
    "%-pct_change",
    "%-volume_change",
];

pub fn is_feature_column(name: &str, prefix: &str) -> bool {
    !prefix.is_empty() && name.starts_with(prefix)
}

/// Feature columns of `columns`, in their original order.
pub fn feature_columns(columns: &[String], prefix: &str) -> Vec<String> {
    columns
        .iter()
        .filter(|c| is_feature_column(c, prefix))
        .cloned()
        .collect()
}
