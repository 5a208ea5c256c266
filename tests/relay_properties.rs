//! Property tests for the relay turn: whatever the provider streams is what
//! the client sees and what gets stored.

use futures::StreamExt;
use proptest::prelude::*;
use std::sync::Arc;

use chat_relay::adapters::{InMemoryMessageRepository, MockCompletionProvider};
use chat_relay::application::handlers::relay::{
    ErrorTranslator, RelaySettings, RelayTurnCommand, RelayTurnHandler, ResponseChannel,
    StreamOutcome,
};
use chat_relay::domain::chat::{ChatMessage, Role};
use chat_relay::domain::foundation::ChatId;
use chat_relay::ports::CompletionProvider;

struct Relayed {
    outcome: StreamOutcome,
    frames: Vec<String>,
    stored_reply: Option<String>,
}

fn relay(tokens: Vec<String>) -> Relayed {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let repo = Arc::new(InMemoryMessageRepository::new());
        let provider = MockCompletionProvider::new().with_tokens(tokens);
        let handler = RelayTurnHandler::new(
            Some(Arc::new(provider) as Arc<dyn CompletionProvider>),
            repo.clone(),
            ErrorTranslator::new(),
            RelaySettings::default(),
        );
        let chat_id = ChatId::new();
        let cmd = RelayTurnCommand::new(chat_id, vec![ChatMessage::user("Hi")]).unwrap();

        let settings = handler.settings().channel_config();
        let (mut channel, frames) = ResponseChannel::open(&settings);
        let collector = tokio::spawn(frames.collect::<Vec<_>>());
        let outcome = handler.handle(cmd, &mut channel).await.unwrap();
        drop(channel);
        let frames = collector.await.unwrap();

        let stored_reply = repo
            .messages_for(&chat_id)
            .await
            .into_iter()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content);

        Relayed {
            outcome,
            frames,
            stored_reply,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn persisted_reply_is_concatenation_of_tokens(
        tokens in prop::collection::vec("[a-zA-Z0-9 .,!?]{1,8}", 0..20)
    ) {
        let expected: String = tokens.concat();
        let relayed = relay(tokens.clone());

        let is_completed = matches!(relayed.outcome, StreamOutcome::Completed { .. });
        prop_assert!(is_completed);
        prop_assert_eq!(relayed.outcome.tokens(), tokens.len());
        prop_assert_eq!(relayed.stored_reply, Some(expected));
    }

    #[test]
    fn one_frame_per_token_in_order(
        tokens in prop::collection::vec("[a-zA-Z0-9 ]{1,8}", 1..20)
    ) {
        let relayed = relay(tokens.clone());

        let expected: Vec<String> = tokens.iter().map(|t| format!("data: {}\n\n", t)).collect();
        prop_assert_eq!(relayed.frames, expected);
    }
}
