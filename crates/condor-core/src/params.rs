//! Parameter binding for module configuration.
//!
//! Binding is a merge, not a replace: a module builds a default-populated
//! configuration value and hands it to [`bind`] together with the caller's
//! params; only the fields present in the params are overwritten.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Overlays `params` onto a default-populated configuration value.
///
/// The defaults are serialized to a JSON object, the params are merged
/// over it (nested objects merge recursively, params win), and the result
/// is deserialized back into `T`. Fields absent from the params keep their
/// defaults. Configs that derive `deny_unknown_fields` reject unknown
/// keys here.
pub fn bind<T>(defaults: T, params: &Map<String, Value>) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut bound = serde_json::to_value(&defaults)?;
    merge(&mut bound, params);
    serde_json::from_value(bound).map_err(|err| Error::invalid_config(err.to_string()))
}

fn merge(base: &mut Value, params: &Map<String, Value>) {
    let Value::Object(fields) = base else {
        *base = Value::Object(params.clone());
        return;
    };
    for (key, value) in params {
        match (fields.get_mut(key), value) {
            (Some(field @ Value::Object(_)), Value::Object(nested)) => merge(field, nested),
            (Some(field), _) => *field = value.clone(),
            (None, _) => {
                fields.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Fetcher {
        url: String,
        interval_secs: u64,
        retry: Retry,
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Retry {
        attempts: u32,
        backoff_secs: u64,
    }

    fn defaults() -> Fetcher {
        Fetcher {
            url: "http://127.0.0.1:8080".into(),
            interval_secs: 15,
            retry: Retry {
                attempts: 3,
                backoff_secs: 5,
            },
        }
    }

    fn params(json: serde_json::Value) -> Map<String, Value> {
        json.as_object().cloned().unwrap()
    }

    #[test]
    fn absent_fields_keep_defaults() {
        let bound = bind(defaults(), &params(serde_json::json!({"interval_secs": 60}))).unwrap();
        assert_eq!(bound.interval_secs, 60);
        assert_eq!(bound.url, "http://127.0.0.1:8080");
        assert_eq!(bound.retry.attempts, 3);
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let bound = bind(
            defaults(),
            &params(serde_json::json!({"retry": {"attempts": 10}})),
        )
        .unwrap();
        assert_eq!(bound.retry.attempts, 10);
        assert_eq!(bound.retry.backoff_secs, 5);
    }

    #[test]
    fn empty_params_are_the_defaults() {
        let bound = bind(defaults(), &Map::new()).unwrap();
        assert_eq!(bound, defaults());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = bind(defaults(), &params(serde_json::json!({"intervall": 60})));
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
