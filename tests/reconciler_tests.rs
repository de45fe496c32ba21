//! Behaviour of the open-thread message list under fetches, sends and pushes.

use chrono::Utc;
use notebookchat::chat::{
    ConfirmOutcome, Conversation, IgnoreReason, LocalId, Message, MessageId,
    MessageStreamReconciler, PushOutcome, RollbackOutcome, ThreadChange,
};
use tokio::sync::mpsc;

const ME: &str = "alice";
const PEER: &str = "bob";

fn server(id: &str, from: &str, to: &str, body: &str) -> Message {
    Message {
        id: MessageId::Server(id.to_string()),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        body: body.to_string(),
        created_at: Utc::now(),
        is_read: false,
    }
}

fn open_with_peer() -> MessageStreamReconciler {
    let mut thread = MessageStreamReconciler::new();
    thread.open(Conversation::new(ME, PEER));
    thread
}

fn count_id(thread: &MessageStreamReconciler, id: &MessageId) -> usize {
    thread.messages().iter().filter(|m| &m.id == id).count()
}

#[test]
fn test_push_is_idempotent() {
    let mut thread = open_with_peer();
    let message = server("m1", PEER, ME, "hey");

    assert_eq!(thread.apply_remote_push(message.clone()), PushOutcome::Applied);
    let len_after_first = thread.len();

    assert_eq!(
        thread.apply_remote_push(message),
        PushOutcome::Ignored(IgnoreReason::Duplicate)
    );
    assert_eq!(thread.len(), len_after_first);
}

#[test]
fn test_confirm_replaces_placeholder_in_place() {
    let mut thread = open_with_peer();
    thread.reset(vec![server("m0", PEER, ME, "first")]);

    let local = thread.begin_optimistic_send("hi").unwrap();
    let local_key = MessageId::Local(local);
    assert_eq!(thread.position(&local_key), Some(1));

    let outcome = thread.confirm_send(local, server("S1", ME, PEER, "hi"));
    assert_eq!(outcome, ConfirmOutcome::Confirmed);

    let server_key = MessageId::Server("S1".into());
    assert_eq!(thread.position(&server_key), Some(1));
    assert_eq!(count_id(&thread, &server_key), 1);
    assert!(thread.get(&local_key).is_none());
    assert!(thread.messages()[1].is_confirmed());
}

#[test]
fn test_confirmation_must_fit_the_thread() {
    let mut thread = open_with_peer();
    let local = thread.begin_optimistic_send("hi").unwrap();
    let local_key = MessageId::Local(local);

    let misaddressed = server("S1", ME, "carol", "hi");
    assert_eq!(thread.confirm_send(local, misaddressed), ConfirmOutcome::NotFound);

    let mut unconfirmed = server("S2", ME, PEER, "hi");
    unconfirmed.id = MessageId::Local(LocalId::next());
    assert_eq!(thread.confirm_send(local, unconfirmed), ConfirmOutcome::NotFound);

    // The placeholder is untouched and can still be rolled back.
    assert_eq!(thread.position(&local_key), Some(0));
    assert_eq!(thread.fail_send(local), RollbackOutcome::RolledBack);
    assert!(thread.is_empty());
}

#[test]
fn test_failed_send_rolls_back() {
    let mut thread = open_with_peer();
    thread.reset(vec![server("m0", PEER, ME, "first")]);
    let before = thread.len();

    let local = thread.begin_optimistic_send("hi").unwrap();
    assert_eq!(thread.len(), before + 1);

    assert_eq!(thread.fail_send(local), RollbackOutcome::RolledBack);
    assert_eq!(thread.len(), before);
    assert!(thread.get(&MessageId::Local(local)).is_none());
}

#[test]
fn test_switching_conversation_isolates_messages() {
    let mut thread = open_with_peer();
    thread.apply_remote_push(server("m1", PEER, ME, "for a-b"));
    assert_eq!(thread.len(), 1);

    thread.open(Conversation::new(ME, "carol"));
    thread.reset(vec![server("c1", "carol", ME, "for a-c")]);

    assert!(thread.get(&MessageId::Server("m1".into())).is_none());
    assert_eq!(
        thread.apply_remote_push(server("m2", PEER, ME, "late")),
        PushOutcome::Ignored(IgnoreReason::OtherConversation)
    );
    assert_eq!(thread.len(), 1);
}

#[test]
fn test_stale_completions_are_not_found() {
    let mut thread = open_with_peer();
    let local = thread.begin_optimistic_send("hi").unwrap();

    thread.open(Conversation::new(ME, "carol"));
    thread.reset(vec![server("c1", "carol", ME, "hello")]);
    let snapshot = thread.messages().to_vec();

    assert_eq!(
        thread.confirm_send(local, server("S1", ME, PEER, "hi")),
        ConfirmOutcome::NotFound
    );
    assert_eq!(thread.fail_send(local), RollbackOutcome::NotFound);
    assert_eq!(thread.messages(), snapshot.as_slice());
}

#[test]
fn test_send_confirm_then_echo() {
    let mut thread = open_with_peer();
    thread.reset(vec![server("m1", PEER, ME, "hi there")]);

    let local = thread.begin_optimistic_send("hello").unwrap();
    assert_eq!(thread.len(), 2);
    assert!(!thread.messages()[1].is_confirmed());

    assert_eq!(
        thread.confirm_send(local, server("m2", ME, PEER, "hello")),
        ConfirmOutcome::Confirmed
    );
    assert_eq!(thread.len(), 2);
    assert!(thread.messages().iter().all(Message::is_confirmed));
    assert_eq!(thread.messages()[1].id, MessageId::Server("m2".into()));

    let echo = server("m2", ME, PEER, "hello");
    assert_eq!(
        thread.apply_remote_push(echo),
        PushOutcome::Ignored(IgnoreReason::Duplicate)
    );
    assert_eq!(thread.len(), 2);
}

#[test]
fn test_push_before_confirm_does_not_duplicate() {
    let mut thread = open_with_peer();
    let local = thread.begin_optimistic_send("hello").unwrap();

    assert_eq!(
        thread.apply_remote_push(server("S1", ME, PEER, "hello")),
        PushOutcome::Applied
    );
    assert_eq!(thread.len(), 2);

    assert_eq!(
        thread.confirm_send(local, server("S1", ME, PEER, "hello")),
        ConfirmOutcome::Confirmed
    );
    assert_eq!(thread.len(), 1);
    assert_eq!(count_id(&thread, &MessageId::Server("S1".into())), 1);
    assert_eq!(thread.pending_count(), 0);
}

#[test]
fn test_push_never_touches_pending_entry() {
    let mut thread = open_with_peer();
    let local = thread.begin_optimistic_send("same text").unwrap();

    assert_eq!(
        thread.apply_remote_push(server("S9", ME, PEER, "same text")),
        PushOutcome::Applied
    );
    let pending = thread.get(&MessageId::Local(local)).unwrap();
    assert!(!pending.is_confirmed());
    assert_eq!(thread.position(&MessageId::Local(local)), Some(0));
}

#[test]
fn test_pushes_must_carry_server_ids() {
    let mut thread = open_with_peer();
    let mut message = server("x", PEER, ME, "spoof");
    message.id = MessageId::Local(LocalId::next());

    assert_eq!(
        thread.apply_remote_push(message),
        PushOutcome::Ignored(IgnoreReason::Unconfirmed)
    );
    assert!(thread.is_empty());
}

#[test]
fn test_nothing_happens_without_a_conversation() {
    let mut thread = MessageStreamReconciler::new();
    assert!(thread.begin_optimistic_send("hi").is_none());
    assert_eq!(
        thread.apply_remote_push(server("m1", PEER, ME, "hey")),
        PushOutcome::Ignored(IgnoreReason::NoConversation)
    );
    assert!(thread.is_empty());
}

#[test]
fn test_local_ids_unique_across_conversations() {
    let mut thread = open_with_peer();
    let first = thread.begin_optimistic_send("one").unwrap();
    thread.open(Conversation::new(ME, "carol"));
    let second = thread.begin_optimistic_send("two").unwrap();
    thread.open(Conversation::new(ME, PEER));
    let third = thread.begin_optimistic_send("three").unwrap();

    assert_ne!(first, second);
    assert_ne!(second, third);
    assert_ne!(first, third);
}

#[test]
fn test_positions_stay_consistent_after_rollback() {
    let mut thread = open_with_peer();
    let l1 = thread.begin_optimistic_send("one").unwrap();
    let l2 = thread.begin_optimistic_send("two").unwrap();
    let l3 = thread.begin_optimistic_send("three").unwrap();

    thread.fail_send(l2);
    assert_eq!(thread.position(&MessageId::Local(l3)), Some(1));

    thread.confirm_send(l3, server("S3", ME, PEER, "three"));
    thread.confirm_send(l1, server("S1", ME, PEER, "one"));

    let ids: Vec<String> = thread.messages().iter().map(|m| m.id.to_string()).collect();
    assert_eq!(ids, vec!["S1", "S3"]);
}

#[test]
fn test_outgoing_messages_are_addressed_to_peer() {
    let mut thread = open_with_peer();
    let local = thread.begin_optimistic_send("hi").unwrap();
    let message = thread.get(&MessageId::Local(local)).unwrap();

    assert_eq!(message.sender_id, ME);
    assert_eq!(message.receiver_id, PEER);
    assert_eq!(message.body, "hi");
}

#[test]
fn test_every_change_is_reported() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut thread = MessageStreamReconciler::with_notifier(tx);

    thread.open(Conversation::new(ME, PEER));
    thread.reset(vec![server("m1", PEER, ME, "hey")]);
    let local = thread.begin_optimistic_send("yo").unwrap();
    thread.confirm_send(local, server("m2", ME, PEER, "yo"));
    let other = thread.begin_optimistic_send("oops").unwrap();
    thread.fail_send(other);
    // Ignored pushes are not changes.
    thread.apply_remote_push(server("m1", PEER, ME, "hey"));

    let mut changes = Vec::new();
    while let Ok(change) = rx.try_recv() {
        changes.push(change);
    }

    assert_eq!(
        changes,
        vec![
            ThreadChange::Reset { len: 0 },
            ThreadChange::Reset { len: 1 },
            ThreadChange::Appended {
                id: MessageId::Local(local)
            },
            ThreadChange::Replaced {
                position: 1,
                old: MessageId::Local(local),
                new: MessageId::Server("m2".into()),
            },
            ThreadChange::Appended {
                id: MessageId::Local(other)
            },
            ThreadChange::Removed {
                id: MessageId::Local(other)
            },
        ]
    );
}
