use super::SystemTopic;
use crate::utils::TopicError;

/// Check that `topic` is usable.
///
/// Rules are applied in order: empty, space, `*` wildcard, and, when
/// `for_publishing` is set, membership in the reserved system topic set.
pub fn validate(topic: &str, for_publishing: bool) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::EmptyTopic);
    }
    if topic.contains(' ') {
        return Err(TopicError::ContainsSpace);
    }
    if topic.contains('*') {
        return Err(TopicError::ContainsWildcard);
    }
    if for_publishing && SystemTopic::is_reserved(topic) {
        return Err(TopicError::SystemTopicPublish);
    }
    Ok(())
}
