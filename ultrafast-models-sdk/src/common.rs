//! Small helpers shared across the SDK that don't belong to any one module.

pub mod duration_serde {
    //! Serde helper for `Duration` fields in config-shaped structs. Accepts
    //! either a human string (`"30s"`, `"500ms"`, `"5m"`, `"1h"`) or a plain
    //! `{secs, nanos}` object on the way in; always serializes as a string.

    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DurationForm {
            Human(String),
            Parts { secs: u64, nanos: u32 },
        }

        match DurationForm::deserialize(deserializer)? {
            DurationForm::Human(s) => {
                parse_duration_string(&s).map_err(serde::de::Error::custom)
            }
            DurationForm::Parts { secs, nanos } => Ok(Duration::new(secs, nanos)),
        }
    }

    /// Parses a suffixed human duration string. Used directly (outside
    /// serde) wherever a raw string needs turning into a `Duration`, e.g.
    /// environment-variable overrides.
    pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
        parse_duration_string(s).map_err(|e| anyhow::anyhow!(e))
    }

    fn parse_duration_string(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            return ms
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| format!("invalid duration '{s}': {e}"));
        }
        if let Some(secs) = s.strip_suffix('s') {
            return secs
                .trim()
                .parse::<f64>()
                .map(Duration::from_secs_f64)
                .map_err(|e| format!("invalid duration '{s}': {e}"));
        }
        if let Some(mins) = s.strip_suffix('m') {
            return mins
                .trim()
                .parse::<f64>()
                .map(|m| Duration::from_secs_f64(m * 60.0))
                .map_err(|e| format!("invalid duration '{s}': {e}"));
        }
        if let Some(hours) = s.strip_suffix('h') {
            return hours
                .trim()
                .parse::<f64>()
                .map(|h| Duration::from_secs_f64(h * 3600.0))
                .map_err(|e| format!("invalid duration '{s}': {e}"));
        }
        s.parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| format!("invalid duration '{s}', expected a suffix (ms/s/m/h): {e}"))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_suffixed_forms() {
            assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
            assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
            assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
            assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        }

        #[test]
        fn rejects_garbage() {
            assert!(parse_duration("banana").is_err());
        }
    }
}
