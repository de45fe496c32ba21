use notebookchat::chat::{Conversation, Message, MessageId, Roster, User};

fn user(id: &str, name: &str, online: bool) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        email: None,
        is_online: online,
        last_seen: None,
    }
}

fn roster() -> Roster {
    let mut roster = Roster::new();
    roster.replace(
        vec![
            user("u0", "Me", true),
            user("u1", "Martin", false),
            user("u2", "Maria", true),
            user("u3", "bob", false),
        ],
        "u0",
    );
    roster
}

#[test]
fn test_replace_excludes_current_user() {
    let roster = roster();
    assert_eq!(roster.len(), 3);
    assert!(roster.get("u0").is_none());
}

#[test]
fn test_find_by_id_name_or_number() {
    let roster = roster();
    assert_eq!(roster.find("u3").unwrap().name, "bob");
    assert_eq!(roster.find("MARIA").unwrap().id, "u2");
    assert_eq!(roster.find("1").unwrap().id, "u1");
    assert!(roster.find("0").is_none());
    assert!(roster.find("nobody").is_none());
}

#[test]
fn test_matching_names_prefers_online_users() {
    let roster = roster();
    assert_eq!(roster.matching_names("ma"), vec!["Maria", "Martin"]);
    assert_eq!(roster.matching_names("B"), vec!["bob"]);
    assert!(roster.matching_names("z").is_empty());
}

#[test]
fn test_unread_counts_survive_refresh_only_for_known_users() {
    let mut roster = roster();
    roster.mark_unread("u1");
    roster.mark_unread("u1");
    roster.mark_unread("u3");
    assert_eq!(roster.unread_count("u1"), 2);

    roster.replace(vec![user("u1", "Martin", true)], "u0");
    assert_eq!(roster.unread_count("u1"), 2);
    assert_eq!(roster.unread_count("u3"), 0);

    roster.clear_unread("u1");
    assert_eq!(roster.unread_count("u1"), 0);
}

#[test]
fn test_presence_label() {
    assert_eq!(user("u1", "x", true).presence_label(), "Online");
    assert_eq!(user("u1", "x", false).presence_label(), "Offline");
}

#[test]
fn test_users_decode_from_backend_shape() {
    let json = r#"[{"_id":"u1","name":"Ada","email":"ada@example.com","isOnline":true,"lastSeen":"2024-06-04T10:15:30.000Z"},{"_id":"u2","name":"Bob"}]"#;
    let users: Vec<User> = serde_json::from_str(json).unwrap();
    assert!(users[0].is_online);
    assert!(users[0].last_seen.is_some());
    assert!(!users[1].is_online);
}

#[test]
fn test_conversation_matches_both_directions() {
    let conversation = Conversation::new("a", "b");
    let message = |from: &str, to: &str| Message {
        id: MessageId::Server("m".into()),
        sender_id: from.into(),
        receiver_id: to.into(),
        body: "x".into(),
        created_at: chrono::Utc::now(),
        is_read: false,
    };
    assert!(conversation.includes(&message("a", "b")));
    assert!(conversation.includes(&message("b", "a")));
    assert!(!conversation.includes(&message("a", "c")));
    assert!(!conversation.includes(&message("c", "a")));
}
