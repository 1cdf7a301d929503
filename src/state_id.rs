//! Composite resource ids.
//!
//! Resources addressed by more than one value store them all in `id` as a
//! sorted list of `key:base64(value)` pairs joined with `-`, for example
//! `entry:MTAuMC4wLjAvMjQ=-project_id:NWYx`.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::ProviderError;

/// Encode `parts` into an id. Keys are sorted.
pub fn encode_state_id<K, V>(parts: impl IntoIterator<Item = (K, V)>) -> String
where
    K: Into<String>,
    V: AsRef<[u8]>,
{
    let sorted: BTreeMap<String, String> = parts
        .into_iter()
        .map(|(k, v)| (k.into(), STANDARD.encode(v)))
        .collect();
    sorted
        .into_iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("-")
}

/// Decode an id produced by [`encode_state_id`].
pub fn decode_state_id(id: &str) -> Result<BTreeMap<String, String>, ProviderError> {
    let mut parts = BTreeMap::new();
    for pair in id.split('-').filter(|p| !p.is_empty()) {
        let (key, encoded) = pair
            .split_once(':')
            .ok_or_else(|| ProviderError::InvalidRequest(format!("malformed id segment {:?}", pair)))?;
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ProviderError::InvalidRequest(format!("malformed id segment {:?}: {}", pair, e)))?;
        let value = String::from_utf8(bytes)
            .map_err(|e| ProviderError::InvalidRequest(format!("malformed id segment {:?}: {}", pair, e)))?;
        parts.insert(key.to_string(), value);
    }
    Ok(parts)
}

/// Fetch a required part of a decoded id.
pub fn id_part<'a>(parts: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, ProviderError> {
    parts
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ProviderError::InvalidRequest(format!("id is missing {:?}", key)))
}

/// Split an import id of the form `{first}-{rest}` on its first `-`.
pub fn split_import_id<'a>(id: &'a str, expected: &str) -> Result<(&'a str, &'a str), ProviderError> {
    match id.split_once('-') {
        Some((first, rest)) if !first.is_empty() && !rest.is_empty() => Ok((first, rest)),
        _ => Err(ProviderError::InvalidRequest(format!(
            "import format error: to import, use the format {}, got {:?}",
            expected, id
        ))),
    }
}
