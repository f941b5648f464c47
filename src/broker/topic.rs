//! Topic helpers.
//!
//! Filters follow MQTT semantics: levels are separated by `/`, `+` matches exactly
//! one level and `#` (last level only) matches the parent level and everything below.

/// `true` when `topic` matches `filter`.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(fl), Some(tl)) if fl == tl => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Topic an entity is mirrored to: `{base}/{id}`.
pub fn entity_topic(base: &str, id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), id)
}

/// Filter covering every entity under `base`: `{base}/#`.
pub fn entity_filter(base: &str) -> String {
    format!("{}/#", base.trim_end_matches('/'))
}

/// Entity id of `topic` under `base`, if the topic belongs to it.
pub fn strip_base<'a>(base: &str, topic: &'a str) -> Option<&'a str> {
    topic
        .strip_prefix(base.trim_end_matches('/'))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matching() {
        assert!(matches("station/#", "station/gpio/wifi"));
        assert!(matches("station/#", "station"));
        assert!(matches("station/+/wifi", "station/gpio/wifi"));
        assert!(matches("station/gpio/wifi", "station/gpio/wifi"));

        assert!(!matches("station/+", "station/gpio/wifi"));
        assert!(!matches("station/gpio", "station/gpio/wifi"));
        assert!(!matches("station/#", "other/gpio/wifi"));
        assert!(!matches("station/gpio/wifi/x", "station/gpio/wifi"));
    }

    #[test]
    fn entity_topics_round_trip_through_strip() {
        let topic = entity_topic("station/", "gpio/wifi");
        assert_eq!(topic, "station/gpio/wifi");
        assert_eq!(strip_base("station", &topic), Some("gpio/wifi"));
        assert_eq!(entity_filter("station"), "station/#");
    }

    #[test]
    fn strip_rejects_foreign_and_bare_topics() {
        assert_eq!(strip_base("station", "stationx/gpio"), None);
        assert_eq!(strip_base("station", "station"), None);
        assert_eq!(strip_base("station", "station/"), None);
    }
}
