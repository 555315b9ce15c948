//! Payload transformation utilities shared by the WAF and API probe families

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};

/// Per-field ceiling for synthetic oversized bodies; keeps any single
/// string allocation bounded no matter what the test spec asks for
const MAX_FIELD_BYTES: usize = 32 * 1024;

/// Named payload encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    Raw,
    UrlEncode,
    Base64,
    CaseMix,
}

impl EncodingMode {
    /// Parse an encoding name; unknown names fall back to raw
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "urlencode" | "url" => EncodingMode::UrlEncode,
            "base64" | "b64" => EncodingMode::Base64,
            "case-mix" | "case_mix" | "casemix" => EncodingMode::CaseMix,
            _ => EncodingMode::Raw,
        }
    }
}

/// Transform a literal payload through the named encoding
///
/// `CaseMix` alternates character case while preserving length. The
/// transform is deliberately lossy on round-trip; the other modes decode
/// back to the original exactly.
pub fn encode_payload(payload: &str, mode: EncodingMode) -> String {
    match mode {
        EncodingMode::Raw => payload.to_string(),
        EncodingMode::UrlEncode => {
            url::form_urlencoded::byte_serialize(payload.as_bytes()).collect()
        }
        EncodingMode::Base64 => BASE64.encode(payload.as_bytes()),
        EncodingMode::CaseMix => payload
            .chars()
            .enumerate()
            .flat_map(|(i, c)| {
                let mixed: Vec<char> = if i % 2 == 0 {
                    c.to_lowercase().collect()
                } else {
                    c.to_uppercase().collect()
                };
                mixed
            })
            .collect(),
    }
}

/// Build a JSON body of roughly `body_size_kb` kilobytes spread across
/// `field_repeats` fields, each capped at 32 KB
pub fn build_oversized_json(body_size_kb: u32, field_repeats: u32) -> Value {
    let fields = field_repeats.max(1) as usize;
    let total_bytes = (body_size_kb as usize).saturating_mul(1024);
    let per_field = (total_bytes / fields).clamp(1, MAX_FIELD_BYTES);

    let mut map = Map::with_capacity(fields);
    for i in 0..fields {
        map.insert(format!("field_{i}"), Value::String("A".repeat(per_field)));
    }
    Value::Object(map)
}

/// Append query parameters to a URL without re-encoding the values
///
/// Values arrive already transformed by `encode_payload`, so this is plain
/// string assembly rather than `Url::query_pairs_mut`, which would encode
/// them a second time.
pub fn append_query_params(base: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return base.to_string();
    }
    let query: Vec<String> = pairs.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query.join("&"))
}

/// Truncate a credential for logging: first three characters plus a mask
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(3).collect();
    format!("{visible}***")
}
