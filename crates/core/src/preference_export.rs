//! Preference pairs for DPO training data.
//!
//! Each non-spam annotation becomes one JSONL record pairing the chosen
//! image with the rejected one (when there is one). Image `i` of a prompt
//! is the render of seed `i`.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::types::{DbId, Timestamp};

/// One rendered image and the seed that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceSample {
    pub uri: String,
    pub seed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceMetadata {
    pub workflow_id: DbId,
    pub variable_pool_version: String,
    /// When the annotation was recorded.
    pub created_at: Timestamp,
}

/// One line of the export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreferenceRecord {
    pub prompt: String,
    pub chosen: PreferenceSample,
    /// Empty or a single sample.
    pub rejected: Vec<PreferenceSample>,
    pub metadata: PreferenceMetadata,
}

/// URI of image `index` in a worker's `images` output.
///
/// Entries are either plain strings or objects carrying `uri`, `url` or
/// `filename` (first match wins).
pub fn image_uri(images: &Value, index: usize) -> Option<String> {
    let entry = images.as_array()?.get(index)?;
    let uri = match entry {
        Value::String(s) => s.as_str(),
        Value::Object(fields) => ["uri", "url", "filename"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_str))?,
        _ => return None,
    };
    (!uri.is_empty()).then(|| uri.to_string())
}

fn sample(seeds: &[i64], images: &Value, index: Option<i32>) -> Option<PreferenceSample> {
    let index = usize::try_from(index?).ok()?;
    let seed = *seeds.get(index)?;
    Some(PreferenceSample {
        uri: image_uri(images, index)?,
        seed,
    })
}

/// Build the record for one annotation.
///
/// Returns `None` for spam, or when the chosen index has no seed or no
/// image. A rejected index without a seed or image yields an empty
/// `rejected` list.
pub fn build_record(
    prompt: &str,
    seeds: &[i64],
    images: &Value,
    chosen_index: Option<i32>,
    rejected_index: Option<i32>,
    spam: bool,
    metadata: PreferenceMetadata,
) -> Option<PreferenceRecord> {
    if spam {
        return None;
    }
    let chosen = sample(seeds, images, chosen_index)?;
    let rejected = sample(seeds, images, rejected_index).into_iter().collect();
    Some(PreferenceRecord {
        prompt: prompt.to_string(),
        chosen,
        rejected,
        metadata,
    })
}

/// Write records as newline-delimited JSON.
pub fn write_jsonl<W: Write>(records: &[PreferenceRecord], mut out: W) -> Result<(), serde_json::Error> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n").map_err(serde_json::Error::io)?;
    }
    Ok(())
}
