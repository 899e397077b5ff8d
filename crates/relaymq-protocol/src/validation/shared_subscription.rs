/// Splits `$share/{group}/{filter}` into the filter and the group name.
#[must_use]
pub fn parse_shared_subscription(topic_filter: &str) -> (&str, Option<&str>) {
    if let Some(rest) = topic_filter.strip_prefix("$share/") {
        if let Some((group, filter)) = rest.split_once('/') {
            return (filter, Some(group));
        }
    }
    (topic_filter, None)
}

#[must_use]
pub fn strip_shared_subscription_prefix(topic_filter: &str) -> &str {
    parse_shared_subscription(topic_filter).0
}

#[must_use]
pub fn is_shared_subscription(topic_filter: &str) -> bool {
    parse_shared_subscription(topic_filter).1.is_some()
}
