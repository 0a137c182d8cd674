// src/providers/tests/twitter_tests.rs

use super::super::twitter::{parse_search_response, status_text};
use crate::error::PlatformError;
use crate::models::MediaRef;

const SEARCH_BODY: &str = r#"{
    "data": [
        {
            "id": "1001",
            "text": "@agentbot draw a cat",
            "author_id": "u1",
            "created_at": "2024-05-01T12:00:00.000Z",
            "conversation_id": "900",
            "referenced_tweets": [
                {"type": "quoted", "id": "500"},
                {"type": "replied_to", "id": "900"}
            ]
        },
        {
            "id": "1002",
            "text": "@agentbot hi",
            "author_id": "u9"
        }
    ],
    "includes": {
        "users": [{"id": "u1", "username": "alice", "name": "Alice"}]
    },
    "meta": {"result_count": 2}
}"#;

#[test]
fn test_parse_search_response() {
    let items = parse_search_response(SEARCH_BODY).unwrap();
    assert_eq!(items.len(), 2);

    let first = &items[0];
    assert_eq!(first.id, "1001");
    assert_eq!(first.author_handle, "alice");
    assert_eq!(first.created_at_epoch_secs, Some(1_714_564_800));
    assert_eq!(first.conversation_id.as_deref(), Some("900"));
    assert_eq!(first.in_reply_to_id.as_deref(), Some("900"));

    // Unknown author falls back to the raw id; missing timestamp stays missing
    let second = &items[1];
    assert_eq!(second.author_handle, "u9");
    assert_eq!(second.created_at_epoch_secs, None);
    assert_eq!(second.in_reply_to_id, None);
}

#[test]
fn test_parse_empty_search() {
    let items = parse_search_response(r#"{"meta": {"result_count": 0}}"#).unwrap();
    assert!(items.is_empty());
}

#[test]
fn test_parse_invalid_search() {
    let result = parse_search_response("<html>oops</html>");
    assert!(matches!(result, Err(PlatformError::InvalidResponse(_))));
}

#[test]
fn test_status_text_appends_media_link() {
    let media = MediaRef {
        url: "https://cdn/x.png".to_string(),
    };
    assert_eq!(
        status_text("here you go ", Some(&media)),
        "here you go https://cdn/x.png"
    );
    assert_eq!(
        status_text("see https://cdn/x.png", Some(&media)),
        "see https://cdn/x.png"
    );
    assert_eq!(status_text("plain", None), "plain");
}
