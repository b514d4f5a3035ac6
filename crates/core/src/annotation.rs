//! Human preference annotation rules.

use crate::error::CoreError;

/// Validate a chosen/rejected selection against a prompt with `seed_count`
/// generated images.
///
/// Rules:
/// - `chosen_index` is required unless the prompt is flagged as spam.
/// - `rejected_index` must differ from `chosen_index`.
/// - Both indexes must address an existing image.
pub fn validate_selection(
    chosen_index: Option<i32>,
    rejected_index: Option<i32>,
    spam: bool,
    seed_count: usize,
) -> Result<(), CoreError> {
    if !spam && chosen_index.is_none() {
        return Err(CoreError::Validation(
            "chosen_index is required unless marked as spam".to_string(),
        ));
    }
    if chosen_index.is_some() && chosen_index == rejected_index {
        return Err(CoreError::Validation(
            "rejected_index cannot be the same as chosen_index".to_string(),
        ));
    }
    for (label, index) in [("chosen_index", chosen_index), ("rejected_index", rejected_index)] {
        if let Some(index) = index {
            if index < 0 || index as usize >= seed_count {
                return Err(CoreError::Validation(format!(
                    "{label} {index} is out of range for {seed_count} images"
                )));
            }
        }
    }
    Ok(())
}
