use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};

use crate::aggregator::{Aggregator, StreamUpdate};
use crate::error::ChatError;
use crate::models::LanguageModel;
use crate::request::GenerationRequest;
use crate::session::{Message, Role, Session};
use crate::trim::{count_tokens, trim_to_max_tokens};

/// What the page sees while an exchange runs.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExchangeEvent {
    Snapshot { content: String },
    Warning { message: String },
    Error { message: String },
    Done { message: Message },
}

impl ExchangeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ExchangeEvent::Snapshot { .. } => "snapshot",
            ExchangeEvent::Warning { .. } => "warning",
            ExchangeEvent::Error { .. } => "error",
            ExchangeEvent::Done { .. } => "done",
        }
    }
}

pub struct ExchangeContext<'a> {
    pub backend: &'a dyn LanguageModel,
    pub session: &'a RwLock<Session>,
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Runs one user turn to completion.
///
/// The user message is appended first. On success the trimmed assistant
/// reply is appended and returned. A malformed frame only produces a warning;
/// a network failure abandons the turn without an assistant message.
/// Events are best effort: a dropped receiver does not stop the exchange.
pub async fn run_exchange(
    ctx: ExchangeContext<'_>,
    req: GenerationRequest,
    events: mpsc::Sender<ExchangeEvent>,
) -> Result<Message, ChatError> {
    ctx.session.write().await.append(Message::new(Role::User, req.user_turn.clone()));
    tracing::info!(model = %req.model, max_tokens = req.max_tokens, "exchange started");

    let source = match ctx.backend.stream_chat(&req).await {
        Ok(source) => source,
        Err(e) => return Err(fail(&events, e).await),
    };

    let mut aggregator = Aggregator::consume(source);
    if let Some(flag) = ctx.cancel {
        aggregator = aggregator.with_cancel(flag);
    }
    while let Some(update) = aggregator.next_update().await {
        let event = match update {
            Ok(StreamUpdate::Snapshot(content)) => ExchangeEvent::Snapshot { content },
            Ok(StreamUpdate::MalformedFrame(reason)) => ExchangeEvent::Warning {
                message: format!("Failed to parse response from the inference server: {reason}"),
            },
            Err(e) => return Err(fail(&events, e).await),
        };
        let _ = events.send(event).await;
    }

    let aggregate = aggregator.finish();
    let reply = trim_to_max_tokens(&aggregate.content, req.max_tokens as usize);
    tracing::info!(
        frames = aggregate.frames,
        end = ?aggregate.end,
        tokens = count_tokens(&aggregate.content),
        kept = count_tokens(&reply),
        "exchange finished"
    );

    let message = Message::new(Role::Assistant, reply);
    ctx.session.write().await.append(message.clone());
    let _ = events.send(ExchangeEvent::Done { message: message.clone() }).await;
    Ok(message)
}

async fn fail(events: &mpsc::Sender<ExchangeEvent>, e: ChatError) -> ChatError {
    tracing::error!(error = %e, "exchange abandoned");
    let message = format!("Error connecting to the inference server: {e}. Ensure the server is running.");
    let _ = events.send(ExchangeEvent::Error { message }).await;
    e
}
