//! Turn controller integration tests
//!
//! Exercises the barge-in contract and transcript finalization without
//! audio hardware or provider sockets.

use parley::{TurnAction, TurnController, TurnEvent, TurnState};

fn count_cancels(actions: &[TurnAction]) -> usize {
    actions
        .iter()
        .filter(|a| matches!(a, TurnAction::CancelResponse))
        .count()
}

#[test]
fn test_full_turn_reaches_idle() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    assert_eq!(turn.state(), TurnState::UserSpeaking);

    turn.on_event(TurnEvent::SpeechStopped);
    assert_eq!(turn.state(), TurnState::Idle);
    assert!(turn.pending_finalization());

    let actions = turn.on_event(TurnEvent::FinalTranscript("今天天气怎么样".to_string()));
    assert_eq!(
        actions,
        vec![TurnAction::ForwardUtterance("今天天气怎么样".to_string())]
    );
    assert_eq!(turn.state(), TurnState::Idle);
}

#[test]
fn test_partials_are_advisory_and_final_wins() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    assert!(turn
        .on_event(TurnEvent::PartialTranscript("你".to_string()))
        .is_empty());
    assert!(turn
        .on_event(TurnEvent::PartialTranscript("你好".to_string()))
        .is_empty());
    assert_eq!(turn.state(), TurnState::UserSpeaking);

    let actions = turn.on_event(TurnEvent::FinalTranscript("你好".to_string()));
    assert_eq!(
        actions,
        vec![TurnAction::ForwardUtterance("你好".to_string())]
    );
}

#[test]
fn test_timeout_falls_back_to_last_partial() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    turn.on_event(TurnEvent::PartialTranscript("北京天气".to_string()));
    turn.on_event(TurnEvent::SpeechStopped);

    let actions = turn.on_event(TurnEvent::FinalizeTimeout);
    assert_eq!(
        actions,
        vec![TurnAction::ForwardUtterance("北京天气".to_string())]
    );
    assert_eq!(turn.state(), TurnState::Idle);
}

#[test]
fn test_empty_final_forwards_nothing() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    turn.on_event(TurnEvent::SpeechStopped);

    let actions = turn.on_event(TurnEvent::FinalTranscript(String::new()));
    assert!(actions.is_empty());
    assert_eq!(turn.state(), TurnState::Idle);

    // Whitespace counts as empty too
    turn.on_event(TurnEvent::SpeechStarted);
    let actions = turn.on_event(TurnEvent::FinalTranscript("   ".to_string()));
    assert!(actions.is_empty());
    assert_eq!(turn.state(), TurnState::Idle);
}

#[test]
fn test_timeout_with_nothing_recognized_prompts_retry() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    turn.on_event(TurnEvent::SpeechStopped);

    let actions = turn.on_event(TurnEvent::FinalizeTimeout);
    assert_eq!(actions, vec![TurnAction::PromptRetry]);
    assert_eq!(turn.state(), TurnState::Idle);
}

#[test]
fn test_barge_in_cancels_exactly_once() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });
    assert_eq!(turn.state(), TurnState::AssistantResponding);
    assert!(turn.active_response().is_some());

    // Barge-in: cancel precedes flush so stale audio cannot outlive it
    let actions = turn.on_event(TurnEvent::SpeechStarted);
    assert_eq!(
        actions,
        vec![TurnAction::CancelResponse, TurnAction::FlushPlayback]
    );
    assert_eq!(turn.state(), TurnState::UserSpeaking);
    assert!(turn.active_response().is_none());

    // A second speech-start without an intervening response start must not
    // produce another cancel
    let actions = turn.on_event(TurnEvent::SpeechStarted);
    assert_eq!(count_cancels(&actions), 0);
}

#[test]
fn test_at_most_one_active_response() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });

    // Starting a second response without a cancel-and-clear cancels the
    // stale one; only one session is ever live
    let actions = turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r2".to_string(),
    });
    assert_eq!(count_cancels(&actions), 1);
    assert_eq!(
        turn.active_response().map(|r| r.response_id.as_str()),
        Some("r2")
    );
}

#[test]
fn test_response_under_user_speech_is_cancelled_immediately() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    let actions = turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });

    // The user's turn wins: the response is cancelled before any audio
    assert_eq!(count_cancels(&actions), 1);
    assert!(actions.contains(&TurnAction::FlushPlayback));
    assert!(turn.active_response().is_none());
    assert_eq!(turn.state(), TurnState::UserSpeaking);
}

#[test]
fn test_partial_barge_in_for_split_pipeline() {
    let mut turn = TurnController::new(true);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });

    let actions = turn.on_event(TurnEvent::PartialTranscript("等一下".to_string()));
    assert_eq!(count_cancels(&actions), 1);
    assert!(actions.contains(&TurnAction::FlushPlayback));
    assert_eq!(turn.state(), TurnState::UserSpeaking);

    // The partial that triggered the barge-in seeds the new utterance
    turn.on_event(TurnEvent::SpeechStopped);
    let actions = turn.on_event(TurnEvent::FinalizeTimeout);
    assert_eq!(
        actions,
        vec![TurnAction::ForwardUtterance("等一下".to_string())]
    );
}

#[test]
fn test_partial_without_barge_in_flag_stays_put() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });
    let actions = turn.on_event(TurnEvent::PartialTranscript("嗯".to_string()));
    assert!(actions.is_empty());
    assert_eq!(turn.state(), TurnState::AssistantResponding);
}

#[test]
fn test_response_done_returns_to_idle() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });
    turn.on_event(TurnEvent::ResponseItem {
        item_id: "item_1".to_string(),
    });
    turn.on_event(TurnEvent::ResponseText { chars: 12 });
    turn.on_event(TurnEvent::ResponseAudio { bytes: 3200 });

    let resp = turn.active_response().unwrap();
    assert_eq!(resp.item_id.as_deref(), Some("item_1"));
    assert_eq!(resp.text_chars, 12);
    assert_eq!(resp.audio_bytes, 3200);

    turn.on_event(TurnEvent::ResponseDone);
    assert_eq!(turn.state(), TurnState::Idle);
    assert!(turn.active_response().is_none());
}

#[test]
fn test_provider_lost_abandons_turn() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });
    turn.on_event(TurnEvent::ProviderLost);
    assert_eq!(turn.state(), TurnState::Idle);
    assert!(turn.active_response().is_none());

    // Mid-utterance loss abandons the utterance as well
    turn.on_event(TurnEvent::SpeechStarted);
    turn.on_event(TurnEvent::PartialTranscript("一半".to_string()));
    turn.on_event(TurnEvent::ProviderLost);
    assert_eq!(turn.state(), TurnState::Idle);
    assert!(!turn.pending_finalization());

    // And the next turn works normally
    turn.on_event(TurnEvent::SpeechStarted);
    let actions = turn.on_event(TurnEvent::FinalTranscript("重新来".to_string()));
    assert_eq!(
        actions,
        vec![TurnAction::ForwardUtterance("重新来".to_string())]
    );
}

#[test]
fn test_final_during_response_is_not_forwarded() {
    // Realtime providers deliver the user transcript after the response has
    // already started; forwarding it would race a second response
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::ResponseStarted {
        response_id: "r1".to_string(),
    });
    let actions = turn.on_event(TurnEvent::FinalTranscript("你好".to_string()));
    assert!(actions.is_empty());
    assert_eq!(turn.state(), TurnState::AssistantResponding);
    assert!(turn.active_response().is_some());
}

#[test]
fn test_new_utterance_supersedes_stale_timeout() {
    let mut turn = TurnController::new(false);

    turn.on_event(TurnEvent::SpeechStarted);
    turn.on_event(TurnEvent::PartialTranscript("旧的".to_string()));
    turn.on_event(TurnEvent::SpeechStopped);

    // User starts talking again before the finalize timer fires
    turn.on_event(TurnEvent::SpeechStarted);

    // The stale timer must not forward the superseded utterance
    let actions = turn.on_event(TurnEvent::FinalizeTimeout);
    assert!(actions.is_empty());
    assert_eq!(turn.state(), TurnState::UserSpeaking);
}
