//! Orchestrator integration tests
//!
//! Drives full runs against scripted collaborators and an in-memory store

use murmur::orchestrator::TurnState;
use murmur::{ConversationSession, Error, HistoryStore, Orchestrator, Termination};

mod common;
use common::{Harness, Script, open_test_session, setup_test_db};

const SYSTEM: &str = "You are helpful.";

fn lines(store: &HistoryStore, id: &str) -> Vec<String> {
    store
        .read_all(id)
        .unwrap()
        .iter()
        .map(murmur::Message::transcript_line)
        .collect()
}

#[tokio::test]
async fn test_single_turn_then_stop() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec!["Hi there!"],
        continues: vec![false],
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert!(matches!(report.termination, Termination::Stopped));
    assert!(!report.termination.is_failure());
    assert_eq!(report.conversation_id, "c1");
    assert_eq!(report.turns_committed, 1);
    assert_eq!(report.last_sequence, Some(2));
    assert!(report.session_closed);

    assert_eq!(
        harness.calls(),
        vec!["capture", "transcribe", "generate", "synthesize", "play", "continue"]
    );
    assert_eq!(harness.contexts(), vec![vec!["System: You are helpful.".to_string()]]);
    assert_eq!(harness.inputs(), vec!["Hello".to_string()]);
    assert_eq!(harness.spoken(), vec!["Hi there!".to_string()]);
    assert_eq!(
        lines(&store, "c1"),
        vec!["System: You are helpful.", "Human: Hello", "AI: Hi there!"]
    );
}

#[tokio::test]
async fn test_two_turns_grow_context() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello", "What's the weather?"],
        replies: vec!["Hi there!", "Sunny."],
        continues: vec![true, false],
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert!(matches!(report.termination, Termination::Stopped));
    assert_eq!(report.turns_committed, 2);
    assert_eq!(report.last_sequence, Some(4));

    let contexts = harness.contexts();
    assert_eq!(contexts.len(), 2);
    assert_eq!(
        contexts[1],
        vec!["System: You are helpful.", "Human: Hello", "AI: Hi there!"]
    );
    assert_eq!(harness.inputs()[1], "What's the weather?");

    let sequences: Vec<u64> = store
        .read_all("c1")
        .unwrap()
        .iter()
        .map(|m| m.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_turn_is_committed_before_synthesis() {
    let pool = setup_test_db();
    let store = HistoryStore::new(pool);
    let session = ConversationSession::open(store.clone(), "c1", SYSTEM).unwrap();
    let harness = Harness::observing(
        Script {
            transcripts: vec!["one", "two"],
            replies: vec!["uno", "dos"],
            continues: vec![true, false],
            ..Script::default()
        },
        store,
        "c1",
    );

    Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert_eq!(harness.committed_at_synthesis(), vec![3, 5]);
}

#[tokio::test]
async fn test_turn_text_is_stored_as_returned() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec![" Hello."],
        replies: vec!["Hi there!\n"],
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;
    assert_eq!(report.turns_committed, 1);

    let texts: Vec<String> = store
        .read_all("c1")
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec![SYSTEM, " Hello.", "Hi there!\n"]);
    assert_eq!(harness.inputs(), vec![" Hello.".to_string()]);
    assert_eq!(harness.spoken(), vec!["Hi there!\n".to_string()]);
}

#[tokio::test]
async fn test_run_turn_leaves_state_at_playing() {
    let (_store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec!["Hi there!"],
        ..Script::default()
    });

    let mut orchestrator = Orchestrator::new(session, harness.collaborators()).unwrap();
    assert_eq!(orchestrator.state(), TurnState::Idle);

    let turn = orchestrator.run_turn().await.unwrap();
    assert_eq!(turn.human.sequence, 1);
    assert_eq!(turn.ai.sequence, 2);
    assert_eq!(orchestrator.state(), TurnState::Playing);
    assert_eq!(harness.count("continue"), 0);
}

#[tokio::test]
async fn test_playback_failure_keeps_committed_turn() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec!["Hi there!"],
        continues: vec![true],
        fail_play_at: Some(0),
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    match &report.termination {
        Termination::Failed { state, error } => {
            assert_eq!(*state, TurnState::Playing);
            assert!(matches!(error, Error::Playback(_)));
        }
        other => panic!("unexpected termination: {other}"),
    }
    assert_eq!(report.termination.kind(), "playback");
    assert_eq!(
        report.termination.to_string(),
        "playback error: device busy (while playing)"
    );
    assert_eq!(report.turns_committed, 1);
    assert_eq!(report.last_sequence, Some(2));
    assert_eq!(store.count("c1").unwrap(), 3);
    assert_eq!(harness.count("continue"), 0);
}

#[tokio::test]
async fn test_capture_failure_commits_nothing() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        fail_capture_at: Some(0),
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert_eq!(report.termination.kind(), "capture");
    assert!(matches!(
        report.termination,
        Termination::Failed { state: TurnState::Capturing, .. }
    ));
    assert_eq!(report.turns_committed, 0);
    assert_eq!(report.last_sequence, Some(0));
    assert!(report.session_closed);
    assert_eq!(harness.calls(), vec!["capture"]);
    assert_eq!(store.count("c1").unwrap(), 1);
}

#[tokio::test]
async fn test_transcription_error_is_normalized() {
    let (_store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        fail_transcribe_at: Some(0),
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    match report.termination {
        Termination::Failed { state, error } => {
            assert_eq!(state, TurnState::Transcribing);
            assert!(matches!(error, Error::Transcription(msg) if msg.contains("connection reset")));
        }
        other => panic!("unexpected termination: {other}"),
    }
    assert_eq!(harness.count("generate"), 0);
}

#[tokio::test]
async fn test_empty_transcription_ends_run() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["   "],
        replies: vec!["unused"],
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert!(matches!(report.termination, Termination::EmptyTranscription));
    assert!(report.termination.is_failure());
    assert_eq!(report.termination.kind(), "empty_transcription");
    assert_eq!(harness.count("generate"), 0);
    assert_eq!(store.count("c1").unwrap(), 1);
}

#[tokio::test]
async fn test_empty_reply_ends_run() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec![""],
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert!(matches!(report.termination, Termination::EmptyResponse));
    assert_eq!(harness.count("synthesize"), 0);
    assert_eq!(store.count("c1").unwrap(), 1);
}

#[tokio::test]
async fn test_generation_failure_on_second_turn() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello", "And then?"],
        replies: vec!["Hi there!"],
        continues: vec![true],
        fail_generate_at: Some(1),
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert_eq!(report.termination.kind(), "generation");
    assert_eq!(report.turns_committed, 1);
    assert_eq!(report.last_sequence, Some(2));
    assert_eq!(
        lines(&store, "c1"),
        vec!["System: You are helpful.", "Human: Hello", "AI: Hi there!"]
    );
}

#[tokio::test]
async fn test_synthesis_failure_after_commit() {
    let (store, session) = open_test_session("c1", SYSTEM);
    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec!["Hi there!"],
        fail_synthesize_at: Some(0),
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert!(matches!(
        report.termination,
        Termination::Failed { state: TurnState::Synthesizing, error: Error::Synthesis(_) }
    ));
    assert_eq!(harness.count("play"), 0);
    assert_eq!(store.count("c1").unwrap(), 3);
}

#[tokio::test]
async fn test_resume_across_runs() {
    let store = HistoryStore::new(setup_test_db());

    let first = ConversationSession::open(store.clone(), "c1", SYSTEM).unwrap();
    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec!["Hi there!"],
        ..Script::default()
    });
    let report = Orchestrator::new(first, harness.collaborators())
        .unwrap()
        .run()
        .await;
    assert_eq!(report.last_sequence, Some(2));

    let second = ConversationSession::open(store.clone(), "c1", "Be terse.").unwrap();
    let harness = Harness::new(Script {
        transcripts: vec!["Remember me?"],
        replies: vec!["Yes."],
        ..Script::default()
    });
    let orchestrator = Orchestrator::new(second, harness.collaborators()).unwrap();
    let report = orchestrator.run().await;

    assert_eq!(report.turns_committed, 1);
    assert_eq!(report.last_sequence, Some(4));
    assert_eq!(
        harness.contexts()[0],
        vec!["System: You are helpful.", "Human: Hello", "AI: Hi there!"]
    );
    assert_eq!(
        lines(&store, "c1"),
        vec![
            "System: You are helpful.",
            "Human: Hello",
            "AI: Hi there!",
            "Human: Remember me?",
            "AI: Yes.",
        ]
    );
}

#[tokio::test]
async fn test_failed_reply_write_leaves_unanswered_turn() {
    let pool = setup_test_db();
    let store = HistoryStore::new(pool.clone());
    let session = ConversationSession::open(store.clone(), "c1", SYSTEM).unwrap();

    {
        let conn = pool.get().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_ai BEFORE INSERT ON messages
             WHEN NEW.role = 'ai'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
    }

    let harness = Harness::new(Script {
        transcripts: vec!["Hello"],
        replies: vec!["Hi there!"],
        ..Script::default()
    });

    let report = Orchestrator::new(session, harness.collaborators())
        .unwrap()
        .run()
        .await;

    assert!(matches!(
        report.termination,
        Termination::Failed { state: TurnState::Committing, error: Error::WriteFailed(_) }
    ));
    assert_eq!(report.termination.kind(), "write_failed");
    assert!(report.session_closed);
    assert_eq!(report.turns_committed, 0);
    assert_eq!(report.last_sequence, Some(1));
    assert_eq!(harness.count("synthesize"), 0);

    let reopened = ConversationSession::open(store, "c1", SYSTEM).unwrap();
    assert!(reopened.has_unanswered_turn().unwrap());
    assert_eq!(reopened.snapshot().unwrap().last().unwrap(), "Human: Hello");
}
