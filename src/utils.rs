use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-resource overrides of the configured wait budgets.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct Timeouts {
    #[serde(default, with = "optional_duration", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub create: Option<Duration>,
    #[serde(default, with = "optional_duration", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub delete: Option<Duration>,
}

/// Durations written the way `humantime` reads them, e.g. `"30s"` or `"2h 45m"`.
pub mod optional_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_str(&humantime::format_duration(*duration).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => humantime::parse_duration(raw.trim())
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Comma separated, quoted list of names for log lines.
pub fn resource_names<'a, I: IntoIterator<Item = &'a str>>(names: I) -> String {
    names
        .into_iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_round_trip_through_yaml() {
        let timeouts: Timeouts = serde_yaml::from_str("create: 2h 45m\ndelete: 1500ms\n").unwrap();
        assert_eq!(timeouts.create, Some(Duration::from_secs(2 * 3600 + 45 * 60)));
        assert_eq!(timeouts.delete, Some(Duration::from_millis(1500)));

        let yaml = serde_yaml::to_string(&timeouts).unwrap();
        assert!(yaml.contains("2h 45m"));
        assert!(yaml.contains("1s 500ms"));
    }

    #[test]
    fn test_timeouts_reject_missing_unit() {
        assert!(serde_yaml::from_str::<Timeouts>("create: \"120\"\n").is_err());
        assert!(serde_yaml::from_str::<Timeouts>("create: 5x\n").is_err());
    }

    #[test]
    fn test_timeouts_from_yaml() {
        let timeouts: Timeouts = serde_yaml::from_str("create: 10m\n").unwrap();
        assert_eq!(timeouts.create, Some(Duration::from_secs(600)));
        assert_eq!(timeouts.delete, None);
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(resource_names(vec!["a", "b"]), "\"a\", \"b\"");
        assert_eq!(resource_names(Vec::<&str>::new()), "");
    }
}
