/// Ordered list of feature names produced by the feature builder.
/// Column order of every dataset and artifact follows this list; any change
/// here is a breaking change for stored artifacts.
pub const FEATURE_NAMES: &[&str] = &[
    "return_1",
    "log_return",
    "rsi",
    "rsi_delta",
    "macd",
    "macd_signal",
    "macd_hist",
    "bb_width",
    "bb_position",
    "atr_pct",
    "sma_ratio",
    "ema_ratio",
    "volatility",
    "momentum",
    "volume_ratio",
    "range_pct",
    "close_zscore",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

pub fn feature_names_owned() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_feature_names_unique() {
        let set: HashSet<_> = FEATURE_NAMES.iter().collect();
        assert_eq!(set.len(), FEATURE_COUNT);
    }
}
