use super::{SystemTopic, validate};
use crate::utils::TopicError;

#[test]
fn test_validate_rejects_each_rule() {
    assert_eq!(validate("", false), Err(TopicError::EmptyTopic));
    assert_eq!(validate("a b", false), Err(TopicError::ContainsSpace));
    assert_eq!(validate("a*b", false), Err(TopicError::ContainsWildcard));
}

#[test]
fn test_validate_accepts_dotted_topic() {
    assert_eq!(validate("a.b.c", false), Ok(()));
    assert_eq!(validate("a.b.c", true), Ok(()));
}

#[test]
fn test_rules_apply_in_order() {
    // space is reported before the wildcard
    assert_eq!(validate("a *", true), Err(TopicError::ContainsSpace));
}

#[test]
fn test_system_topics_cannot_be_published() {
    for topic in SystemTopic::ALL {
        assert_eq!(
            validate(topic.as_str(), true),
            Err(TopicError::SystemTopicPublish)
        );
        assert_eq!(validate(topic.as_str(), false), Ok(()));
    }
}

#[test]
fn test_system_topic_parse() {
    assert_eq!(
        SystemTopic::parse("message-resend"),
        Some(SystemTopic::MessageResend)
    );
    assert_eq!(SystemTopic::parse("chat"), None);
    assert!(SystemTopic::is_reserved("reconnected"));
    assert_eq!(SystemTopic::Connected.to_string(), "connected");
}
