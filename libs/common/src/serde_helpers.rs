//! Shared Serde deserializers
//!
//! Upstream industrial endpoints are loose about JSON types: the same field may
//! arrive as a number on one device and as a quoted string on another. These
//! helpers accept both.
//! - `null` → None
//! - `""` (empty string) → None for numeric fields
//! - String number `"123"` → Some(123)
//! - Native number `123` → Some(123)

use serde::{Deserialize, Deserializer};

// ============================================================================
// Default Value Functions (for serde #[serde(default = "...")] attributes)
// ============================================================================

/// Default value: true
pub fn bool_true() -> bool {
    true
}

/// Default value: false
pub fn bool_false() -> bool {
    false
}

// ============================================================================
// Custom Deserializers
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

/// Deserialize optional i32
///
/// Supports the following input formats:
/// - `null` → `None`
/// - `""` → `None`
/// - `123` or `"123"` → `Some(123)`
///
/// # Example
/// ```ignore
/// #[derive(Deserialize)]
/// struct Properties {
///     #[serde(default, deserialize_with = "deserialize_optional_i32")]
///     command: Option<i32>,
/// }
/// ```
pub fn deserialize_optional_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match deserialize_optional_i64(deserializer)? {
        None => Ok(None),
        Some(v) => i32::try_from(v)
            .map(Some)
            .map_err(|_| D::Error::custom(format!("integer out of range: {}", v))),
    }
}

/// Deserialize optional i64
///
/// Same input formats as [`deserialize_optional_i32`]. Surrounding whitespace
/// in string numbers is ignored.
pub fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Int(i)) => Ok(Some(i)),
        Some(Scalar::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
        Some(Scalar::Float(f)) => Err(D::Error::custom(format!("invalid integer: {}", f))),
        Some(Scalar::Bool(b)) => Err(D::Error::custom(format!("invalid integer: {}", b))),
        Some(Scalar::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                t.parse::<i64>()
                    .map(Some)
                    .map_err(|_| D::Error::custom(format!("invalid integer: {}", s)))
            }
        },
    }
}

/// Deserialize an optional text field that may also arrive as a number or bool
///
/// Non-string scalars are rendered with their JSON text (`5` → `"5"`,
/// `true` → `"true"`). Empty strings are kept as `Some("")`.
pub fn deserialize_optional_string_lenient<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => None,
        Some(Scalar::String(s)) => Some(s),
        Some(Scalar::Int(i)) => Some(i.to_string()),
        Some(Scalar::Float(f)) => Some(f.to_string()),
        Some(Scalar::Bool(b)) => Some(b.to_string()),
    })
}
