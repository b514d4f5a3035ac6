//! Worker version comparison.

/// Numeric components of a dotted version string.
///
/// Components that are not plain digits (e.g. `0-beta`) are dropped.
fn components(version: &str) -> Vec<u64> {
    version
        .split('.')
        .filter(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Whether `version` is at least `minimum`.
///
/// Compares component-wise; missing trailing components count as 0, so
/// `"1.5"` satisfies `"1.5.0"`.
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    let mut current = components(version);
    let mut required = components(minimum);
    let len = current.len().max(required.len());
    current.resize(len, 0);
    required.resize(len, 0);
    current >= required
}
