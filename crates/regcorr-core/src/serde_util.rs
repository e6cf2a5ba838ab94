//! Serde helpers for values JSON cannot represent directly.
//!
//! Degenerate correlations are NaN, which `serde_json` writes as `null` and
//! refuses to read back as `f64`. These adapters map `null` ↔ NaN.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `f64` field that may be NaN.
pub mod nan_as_null {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// `category → coefficients` map whose coefficients may be NaN.
pub mod nan_map {
    use super::*;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, values)| {
                let values: Vec<Option<f64>> = values
                    .iter()
                    .map(|v| if v.is_nan() { None } else { Some(*v) })
                    .collect();
                (k, values)
            })
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<f64>>, D::Error> {
        Ok(BTreeMap::<String, Vec<Option<f64>>>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, values)| {
                (
                    k,
                    values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
                )
            })
            .collect())
    }
}
