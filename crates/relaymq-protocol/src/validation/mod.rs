mod shared_subscription;

pub use shared_subscription::{
    is_shared_subscription, parse_shared_subscription, strip_shared_subscription_prefix,
};

use crate::constants::MAX_STRING_LENGTH;
use crate::error::{MqttError, Result};

#[must_use]
pub fn is_valid_topic_name(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= MAX_STRING_LENGTH
        && !topic.contains(['+', '#', '\0'])
}

pub fn validate_topic_name(topic: &str) -> Result<()> {
    if is_valid_topic_name(topic) {
        Ok(())
    } else {
        Err(MqttError::InvalidTopicName(topic.to_string()))
    }
}

/// Checks wildcard placement: `+` fills a whole level, `#` is the whole last
/// level. Shared subscriptions need a non-empty group without wildcards.
#[must_use]
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.len() > MAX_STRING_LENGTH || filter.contains('\0') {
        return false;
    }

    let inner = if let Some(rest) = filter.strip_prefix("$share/") {
        match rest.split_once('/') {
            Some((group, inner))
                if !group.is_empty() && !group.contains(['+', '#']) && !inner.is_empty() =>
            {
                inner
            }
            _ => return false,
        }
    } else {
        filter
    };

    let levels: Vec<&str> = inner.split('/').collect();
    let last = levels.len() - 1;
    levels.iter().enumerate().all(|(i, level)| match *level {
        "#" => i == last,
        "+" => true,
        other => !other.contains(['+', '#']),
    })
}

pub fn validate_topic_filter(filter: &str) -> Result<()> {
    if is_valid_topic_filter(filter) {
        Ok(())
    } else {
        Err(MqttError::InvalidTopicFilter(filter.to_string()))
    }
}

#[must_use]
pub fn has_wildcards(filter: &str) -> bool {
    strip_shared_subscription_prefix(filter).contains(['+', '#'])
}

/// Matches a topic name against a filter. Shared prefixes are ignored, and
/// wildcards at the first level do not match topics starting with `$`.
#[must_use]
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let filter = strip_shared_subscription_prefix(filter);
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    for filter_level in filter.split('/') {
        match (filter_level, topic_levels.next()) {
            ("#", _) => return true,
            ("+", Some(_)) => {}
            (expected, Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
    topic_levels.next().is_none()
}

/// Client identifiers must be valid UTF-8 strings that fit the length prefix.
/// An empty id asks the broker to assign one.
pub fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.len() > MAX_STRING_LENGTH {
        return Err(MqttError::InvalidClientId(format!(
            "length {} exceeds {MAX_STRING_LENGTH}",
            client_id.len()
        )));
    }
    if client_id.contains('\0') {
        return Err(MqttError::InvalidClientId(
            "contains a null character".to_string(),
        ));
    }
    Ok(())
}
