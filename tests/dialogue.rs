//! Dialogue orchestrator tests
//!
//! Scripted chat and synthesis backends; no hardware, no network.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use common::{MockChat, MockTts};
use parley::audio::PlaybackQueue;
use parley::{DialogueOrchestrator, Error, RespondOutcome};

fn orchestrator(
    chat: MockChat,
    tts: MockTts,
    queue: Arc<PlaybackQueue>,
    history_turns: usize,
) -> DialogueOrchestrator {
    DialogueOrchestrator::new(
        Arc::new(chat),
        Arc::new(tts),
        queue,
        "你是车载助手小柚。".to_string(),
        history_turns,
        50,
        240,
    )
}

#[tokio::test]
async fn test_completed_turn_commits_history() {
    let queue = PlaybackQueue::with_capacity(1024);
    let mut orch = orchestrator(
        MockChat::replying("今天晴天哦。"),
        MockTts::speaking(),
        Arc::clone(&queue),
        6,
    );

    let cancel = CancellationToken::new();
    let outcome = orch.respond("今天天气怎么样", &cancel).await.unwrap();

    assert_eq!(outcome, RespondOutcome::Spoken);
    assert_eq!(orch.history().len(), 2);
    assert_eq!(orch.history()[0].role, "user");
    assert_eq!(orch.history()[0].content, "今天天气怎么样");
    assert_eq!(orch.history()[1].role, "assistant");
    assert_eq!(orch.history()[1].content, "今天晴天哦。");
    assert!(!queue.is_empty());
}

#[tokio::test]
async fn test_history_bounded_to_configured_turns() {
    let queue = PlaybackQueue::with_capacity(4096);
    let mut orch = orchestrator(
        MockChat::replying("好的。"),
        MockTts::speaking(),
        queue,
        2,
    );

    let cancel = CancellationToken::new();
    for i in 0..5 {
        orch.respond(&format!("问题{i}"), &cancel).await.unwrap();
    }

    // Two turns = four messages, oldest dropped first
    assert_eq!(orch.history().len(), 4);
    assert_eq!(orch.history()[0].content, "问题3");
    assert_eq!(orch.history()[2].content, "问题4");
}

#[tokio::test]
async fn test_cancelled_before_chat_leaves_history_untouched() {
    let queue = PlaybackQueue::with_capacity(64);
    let mut orch = orchestrator(
        MockChat::replying("不会被说出来。"),
        MockTts::speaking(),
        Arc::clone(&queue),
        6,
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = orch.respond("你好", &cancel).await.unwrap();
    assert_eq!(outcome, RespondOutcome::Cancelled);
    assert!(orch.history().is_empty());
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_cancelled_during_synthesis_commits_nothing() {
    let queue = PlaybackQueue::with_capacity(64);
    let cancel = CancellationToken::new();

    let tts = MockTts {
        cancel_on_call: Some(cancel.clone()),
        ..MockTts::speaking()
    };
    let mut orch = orchestrator(
        MockChat::replying("第一句。第二句。"),
        tts,
        Arc::clone(&queue),
        6,
    );

    let outcome = orch.respond("说点什么", &cancel).await.unwrap();
    assert_eq!(outcome, RespondOutcome::Cancelled);
    assert!(orch.history().is_empty());
}

#[tokio::test]
async fn test_flush_mid_turn_cancels_remaining_audio() {
    let queue = PlaybackQueue::with_capacity(64);

    // The interruption path flushes while synthesis is in flight; the
    // producer's frames are stale on arrival and the turn is not committed
    let tts = MockTts {
        flush_on_call: Some(Arc::clone(&queue)),
        ..MockTts::speaking()
    };
    let mut orch = orchestrator(
        MockChat::replying("很长的回答。"),
        tts,
        Arc::clone(&queue),
        6,
    );

    let cancel = CancellationToken::new();
    let outcome = orch.respond("问个问题", &cancel).await.unwrap();

    assert_eq!(outcome, RespondOutcome::Cancelled);
    assert!(orch.history().is_empty());
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_tts_failure_degrades_to_text_only() {
    let queue = PlaybackQueue::with_capacity(64);
    let mut orch = orchestrator(
        MockChat::replying("回答内容。"),
        MockTts::failing(),
        Arc::clone(&queue),
        6,
    );

    let cancel = CancellationToken::new();
    let outcome = orch.respond("问题", &cancel).await.unwrap();

    // The reply still counts as a completed turn
    assert_eq!(outcome, RespondOutcome::TextOnly);
    assert_eq!(orch.history().len(), 2);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_chat_failure_propagates_without_commit() {
    let queue = PlaybackQueue::with_capacity(64);
    let mut orch = orchestrator(MockChat::failing(), MockTts::speaking(), queue, 6);

    let cancel = CancellationToken::new();
    let err = orch.respond("问题", &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
    assert!(orch.history().is_empty());
}

#[tokio::test]
async fn test_empty_utterance_is_rejected() {
    let queue = PlaybackQueue::with_capacity(64);
    let mut orch = orchestrator(MockChat::replying("x"), MockTts::speaking(), queue, 6);

    let cancel = CancellationToken::new();
    assert!(orch.respond("   ", &cancel).await.is_err());
}

#[tokio::test]
async fn test_reply_synthesized_per_sentence_in_order() {
    let queue = PlaybackQueue::with_capacity(1024);
    let tts = MockTts::speaking();
    let calls = Arc::clone(&tts.calls);

    let mut orch = DialogueOrchestrator::new(
        Arc::new(MockChat::replying("第一句话。第二句话。第三句话。")),
        Arc::new(tts),
        Arc::clone(&queue),
        "prompt".to_string(),
        6,
        8, // force one sentence per chunk
        240,
    );

    let cancel = CancellationToken::new();
    orch.respond("说三句话", &cancel).await.unwrap();

    assert_eq!(
        calls.lock().unwrap().clone(),
        vec!["第一句话。", "第二句话。", "第三句话。"]
    );

    // Frames arrive in strict generation order
    let mut last_seq = None;
    while let Some(frame) = queue.try_pop() {
        if let Some(prev) = last_seq {
            assert!(frame.seq > prev);
        }
        last_seq = Some(frame.seq);
    }
    assert!(last_seq.is_some());
}

#[tokio::test]
async fn test_speak_does_not_touch_history() {
    let queue = PlaybackQueue::with_capacity(64);
    let mut orch = orchestrator(
        MockChat::replying("x"),
        MockTts::speaking(),
        Arc::clone(&queue),
        6,
    );

    orch.speak("抱歉，我没有听清，请再说一遍。").await.unwrap();
    assert!(orch.history().is_empty());
    assert!(!queue.is_empty());
}
