//! End-to-end transfers through the workflow with recording adapters.

use karma_test_utils::{Harness, ALICE, BOB, CAROL, DAVE, MALLORY};
use karma_workflow::{
    Choice, Direction, InboundEvent, MessageId, Notice, Outcome, SessionId, SessionKind,
    WorkflowError,
};

const REQUEST: MessageId = MessageId::new(1);

fn sid(prompt: i64) -> SessionId {
    SessionId::from(MessageId::new(prompt))
}

/// Alice asks for +1 and picks Bob; returns the confirmation session id.
async fn nominate_bob(harness: &Harness) -> SessionId {
    let outcome = harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, Some("fixed the build".to_string()))
        .await
        .unwrap();
    let session_id = match outcome {
        Outcome::SelectionPrompted { session_id } => session_id,
        other => panic!("unexpected outcome: {:?}", other),
    };

    let outcome = harness
        .workflow
        .select_recipient(ALICE, &session_id, BOB)
        .await
        .unwrap();
    match outcome {
        Outcome::ConfirmationPrompted { session_id } => session_id,
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_happy_path_commits_once() {
    let harness = Harness::new();

    let outcome = harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, Some("fixed the build".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::SelectionPrompted { session_id: sid(1000) });

    let selections = harness.transport.selections();
    assert_eq!(selections.len(), 1);
    let names: Vec<&str> = selections[0].1.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Bob", "Carol", "Dave"]);

    let outcome = harness
        .workflow
        .select_recipient(ALICE, &sid(1000), BOB)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::ConfirmationPrompted { session_id: sid(1001) });
    assert_eq!(harness.transport.retracted(), vec![MessageId::new(1000)]);

    let confirmations = harness.transport.confirmations();
    assert_eq!(confirmations.len(), 1);
    let summary = &confirmations[0].1;
    assert_eq!(summary.requester_name, "Alice");
    assert_eq!(summary.recipient_name, "Bob");
    assert_eq!(summary.direction, Direction::Up);

    let outcome = harness
        .workflow
        .resolve_confirmation(CAROL, &sid(1001), Choice::Confirm)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Committed {
            recipient: BOB,
            delta: 1
        }
    );

    assert_eq!(harness.total(BOB).await, 1);
    assert_eq!(harness.live_sessions().await, 0);
    assert_eq!(
        harness.transport.retracted(),
        vec![MessageId::new(1000), MessageId::new(1001)]
    );
    assert_eq!(
        harness.transport.last_notice(),
        Some((
            Some(REQUEST),
            Notice::Granted {
                recipient_name: "Bob".to_string(),
                delta: 1,
                reason: Some("fixed the build".to_string()),
            }
        ))
    );

    let entries = harness.ledger.inner().entries_for(BOB).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason.as_deref(), Some("fixed the build"));

    let metrics = harness.workflow.metrics().snapshot();
    assert_eq!(metrics.sessions_created, 2);
    assert_eq!(metrics.transfers_committed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_down_request_subtracts() {
    let harness = Harness::new();

    harness
        .workflow
        .request(BOB, REQUEST, Direction::Down, None)
        .await
        .unwrap();
    harness
        .workflow
        .select_recipient(BOB, &sid(1000), CAROL)
        .await
        .unwrap();
    harness
        .workflow
        .resolve_confirmation(DAVE, &sid(1001), Choice::Confirm)
        .await
        .unwrap();

    assert_eq!(harness.total(CAROL).await, -1);
}

#[tokio::test(start_paused = true)]
async fn test_recipient_cannot_confirm() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;

    let err = harness
        .workflow
        .resolve_confirmation(BOB, &session, Choice::Confirm)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::CandidateApproval(u) if u == BOB));
    assert!(err.is_policy_violation());
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(MessageId::new(1001)), Notice::CandidateCannotApprove))
    );

    // Session untouched; someone else can still confirm
    assert_eq!(harness.live_sessions().await, 1);
    harness
        .workflow
        .resolve_confirmation(CAROL, &session, Choice::Confirm)
        .await
        .unwrap();
    assert_eq!(harness.total(BOB).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_requester_cannot_confirm() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;

    let err = harness
        .workflow
        .resolve_confirmation(ALICE, &session, Choice::Confirm)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SelfApproval(u) if u == ALICE));
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(MessageId::new(1001)), Notice::RequesterCannotApprove))
    );
    assert_eq!(harness.live_sessions().await, 1);
    assert_eq!(harness.ledger.write_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_requester_may_withdraw() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;

    let outcome = harness
        .workflow
        .resolve_confirmation(ALICE, &session, Choice::Decline)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Declined);
    assert_eq!(harness.total(BOB).await, 0);
    assert_eq!(harness.live_sessions().await, 0);
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(REQUEST), Notice::Declined))
    );
    assert!(harness.transport.retracted().contains(&MessageId::new(1001)));
    assert_eq!(harness.workflow.metrics().snapshot().transfers_declined, 1);
}

#[tokio::test(start_paused = true)]
async fn test_recipient_cannot_decline() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;

    let err = harness
        .workflow
        .resolve_confirmation(BOB, &session, Choice::Decline)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::CandidateDecline(u) if u == BOB));
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(MessageId::new(1001)), Notice::CandidateCannotDecline))
    );
    assert_eq!(harness.live_sessions().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_third_party_decline() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;

    let outcome = harness
        .workflow
        .resolve_confirmation(DAVE, &session, Choice::Decline)
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Declined);
    assert_eq!(harness.ledger.write_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_second_selection_rejected_while_first_live() {
    let harness = Harness::new();

    harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap();

    let err = harness
        .workflow
        .request(ALICE, MessageId::new(2), Direction::Down, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateSelectionSession(u) if u == ALICE));
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(MessageId::new(2)), Notice::SelectionAlreadyActive))
    );
    assert_eq!(harness.live_sessions().await, 1);
    assert_eq!(harness.transport.selections().len(), 1);

    // Someone else can still start their own
    harness
        .workflow
        .request(BOB, MessageId::new(3), Direction::Up, None)
        .await
        .unwrap();
    assert_eq!(harness.live_sessions().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_pending_confirmation_does_not_block_new_request() {
    let harness = Harness::new();
    nominate_bob(&harness).await;

    harness
        .workflow
        .request(ALICE, MessageId::new(2), Direction::Up, None)
        .await
        .unwrap();

    let sessions = harness.workflow.sessions().lock().await;
    assert!(sessions.has_session(ALICE, Some(SessionKind::ConfirmRequest)));
    assert!(sessions.has_session(ALICE, Some(SessionKind::SelectRecipient)));
    assert_eq!(sessions.owned_by(ALICE).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_only_requester_may_select() {
    let harness = Harness::new();
    harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap();

    let err = harness
        .workflow
        .select_recipient(BOB, &sid(1000), CAROL)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::UnauthorizedActor { actor, .. } if actor == BOB));
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(REQUEST), Notice::OnlyRequesterMaySelect))
    );
    assert_eq!(harness.live_sessions().await, 1);
    assert!(harness.transport.confirmations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_or_self_candidate_rejected() {
    let harness = Harness::new();
    harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap();

    for candidate in [MALLORY, ALICE] {
        let err = harness
            .workflow
            .select_recipient(ALICE, &sid(1000), candidate)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownUser(u) if u == candidate));
        assert_eq!(
            harness.transport.last_notice(),
            Some((Some(REQUEST), Notice::UnknownCandidate))
        );
    }

    // Selection session is still usable
    harness
        .workflow
        .select_recipient(ALICE, &sid(1000), CAROL)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ledger_failure_is_not_retried() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;
    harness.ledger.fail_writes(true);

    let err = harness
        .workflow
        .resolve_confirmation(CAROL, &session, Choice::Confirm)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::LedgerWriteFailure(_)));
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(REQUEST), Notice::CommandFailed))
    );
    assert_eq!(harness.live_sessions().await, 0);
    assert!(harness.transport.retracted().contains(&MessageId::new(1001)));

    // Clicking again finds nothing to confirm
    harness.ledger.fail_writes(false);
    let err = harness
        .workflow
        .resolve_confirmation(CAROL, &session, Choice::Confirm)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionNotFound(_)));
    assert_eq!(harness.ledger.write_attempts(), 1);
    assert_eq!(harness.total(BOB).await, 0);
    assert_eq!(harness.workflow.metrics().snapshot().ledger_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_click_after_commit() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;
    harness
        .workflow
        .resolve_confirmation(CAROL, &session, Choice::Confirm)
        .await
        .unwrap();
    harness.transport.clear();

    let err = harness
        .workflow
        .resolve_confirmation(DAVE, &session, Choice::Confirm)
        .await
        .unwrap_err();
    assert!(err.is_stale());
    assert_eq!(
        harness.transport.notices(),
        vec![(None, Notice::RequestNoLongerValid)]
    );
    // The prompt went away with the commit; nothing is deleted twice
    assert!(harness.transport.retracted().is_empty());
    assert_eq!(harness.total(BOB).await, 1);
    assert_eq!(harness.workflow.metrics().snapshot().transport_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_answer_naming_a_plain_message_retracts_nothing() {
    let harness = Harness::new();
    harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap();
    harness.transport.clear();
    harness.transport.fail_retractions(true);

    // The request message itself never carried a session
    let err = harness
        .workflow
        .resolve_confirmation(CAROL, &sid(1), Choice::Confirm)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::SessionNotFound(_)));
    assert!(harness.transport.retracted().is_empty());
    assert_eq!(
        harness.transport.notices(),
        vec![(None, Notice::RequestNoLongerValid)]
    );
    assert_eq!(harness.workflow.metrics().snapshot().transport_failures, 0);
    assert_eq!(harness.live_sessions().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_event_for_wrong_phase() {
    let harness = Harness::new();
    harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap();
    harness.transport.clear();

    let err = harness
        .workflow
        .resolve_confirmation(CAROL, &sid(1000), Choice::Confirm)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::WrongSessionKind {
            expected: SessionKind::ConfirmRequest,
            found: SessionKind::SelectRecipient,
            ..
        }
    ));
    assert!(harness.transport.sent().is_empty());
    assert_eq!(harness.live_sessions().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_prompt_failure_leaves_no_session() {
    let harness = Harness::new();
    harness.transport.fail_prompts(true);

    let err = harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Transport(_)));
    assert_eq!(harness.live_sessions().await, 0);
    assert_eq!(
        harness.transport.last_notice(),
        Some((Some(REQUEST), Notice::CommandFailed))
    );

    // Nothing left behind that would block a retry
    harness.transport.fail_prompts(false);
    harness
        .workflow
        .request(ALICE, REQUEST, Direction::Up, None)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_notice_failure_does_not_undo_commit() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;
    harness.transport.fail_notices(true);

    let outcome = harness
        .workflow
        .resolve_confirmation(CAROL, &session, Choice::Confirm)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Committed { .. }));
    assert_eq!(harness.total(BOB).await, 1);
    assert_eq!(harness.workflow.metrics().snapshot().transport_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_confirmations_commit_once() {
    let harness = Harness::new();
    let session = nominate_bob(&harness).await;

    let (carol, dave) = tokio::join!(
        harness
            .workflow
            .resolve_confirmation(CAROL, &session, Choice::Confirm),
        harness
            .workflow
            .resolve_confirmation(DAVE, &session, Choice::Confirm),
    );

    let committed = [&carol, &dave].iter().filter(|r| r.is_ok()).count();
    assert_eq!(committed, 1);
    assert!([carol, dave]
        .into_iter()
        .filter_map(|r| r.err())
        .all(|err| matches!(err, WorkflowError::SessionNotFound(_))));
    assert_eq!(harness.total(BOB).await, 1);
    assert_eq!(harness.ledger.write_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_reports_rejections() {
    let harness = Harness::new();

    let handled = harness
        .workflow
        .handle(InboundEvent::RequestIssued {
            actor: ALICE,
            request_message: REQUEST,
            direction: Direction::Up,
            reason: None,
        })
        .await;
    assert!(handled.outcome().is_some());

    let handled = harness
        .workflow
        .handle(InboundEvent::RecipientSelected {
            actor: CAROL,
            session_id: sid(1000),
            candidate: BOB,
        })
        .await;
    assert!(matches!(
        handled.error(),
        Some(WorkflowError::UnauthorizedActor { .. })
    ));

    let handled = harness
        .workflow
        .handle(InboundEvent::ConfirmationResolved {
            actor: CAROL,
            session_id: sid(4242),
            choice: Choice::Confirm,
        })
        .await;
    assert!(handled.error().map(|e| e.is_stale()).unwrap_or(false));
}
