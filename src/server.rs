use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::{Json, Router, routing::{get, post}};
use chrono::Local;
use futures::{Stream, stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::{convert::Infallible, net::SocketAddr};
use tokio::sync::{Mutex, RwLock, mpsc};

use crate::error::ChatError;
use crate::exchange::{ExchangeContext, ExchangeEvent, run_exchange};
use crate::export::{DownloadLink, TranscriptArtifact};
use crate::models::{self, LanguageModel};
use crate::request::GenerationRequest;
use crate::session::{Message, Session};
use crate::settings::{
    EffectiveSettings, GlobalConfigDefaults, RequestOverrides, SessionSettings,
    SessionSettingsPatch, resolve_effective_settings,
};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn LanguageModel>,
    pub defaults: Arc<GlobalConfigDefaults>,
    pub session: Arc<RwLock<Session>>,
    pub settings: Arc<RwLock<SessionSettings>>,
    /// Held for the lifetime of an exchange; only one runs at a time.
    pub exchange: Arc<Mutex<()>>,
    pub cancel: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(backend: Arc<dyn LanguageModel>, defaults: GlobalConfigDefaults) -> Self {
        Self {
            backend,
            defaults: Arc::new(defaults),
            session: Arc::new(RwLock::new(Session::new())),
            settings: Arc::new(RwLock::new(SessionSettings::default())),
            exchange: Arc::new(Mutex::new(())),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn effective(&self, overrides: &RequestOverrides) -> EffectiveSettings {
        let session = self.settings.read().await;
        resolve_effective_settings(&self.defaults, &session, overrides)
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<String>,
}

async fn list_models(State(state): State<AppState>) -> Json<ListModelsResponse> {
    let models = models::list_models(state.backend.as_ref(), &state.defaults.default_model).await;
    Json(ListModelsResponse { models })
}

async fn get_settings(State(state): State<AppState>) -> Json<EffectiveSettings> {
    Json(state.effective(&RequestOverrides::default()).await)
}

async fn patch_settings(
    State(state): State<AppState>,
    Json(patch): Json<SessionSettingsPatch>,
) -> Result<Json<EffectiveSettings>, ChatError> {
    patch.validate()?;
    state.settings.write().await.apply_patch(patch);
    Ok(Json(state.effective(&RequestOverrides::default()).await))
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

async fn list_messages(State(state): State<AppState>) -> Json<MessagesResponse> {
    let session = state.session.read().await;
    Json(MessagesResponse { messages: session.all().to_vec() })
}

async fn clear_messages(State(state): State<AppState>) -> Result<StatusCode, ChatError> {
    // clearing under a running exchange would split its user/assistant pair
    let _guard = state.exchange.try_lock().map_err(|_| ChatError::ExchangeInProgress)?;
    let mut session = state.session.write().await;
    if session.is_empty() {
        tracing::debug!("session already empty");
        return Ok(StatusCode::NO_CONTENT);
    }
    tracing::info!(dropped = session.len(), "session cleared");
    session.clear();
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub overrides: RequestOverrides,
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<impl IntoResponse, ChatError> {
    let guard = state
        .exchange
        .clone()
        .try_lock_owned()
        .map_err(|_| ChatError::ExchangeInProgress)?;
    let effective = state.effective(&body.overrides).await;
    let req = GenerationRequest::from_settings(&effective, &body.message)?;
    state.cancel.store(false, Ordering::Release);

    let (tx, rx) = mpsc::channel::<ExchangeEvent>(32);
    let task_state = state.clone();
    tokio::spawn(async move {
        let ctx = ExchangeContext {
            backend: task_state.backend.as_ref(),
            session: &task_state.session,
            cancel: Some(task_state.cancel.clone()),
        };
        let _ = run_exchange(ctx, req, tx).await;
        drop(guard);
    });

    Ok(Sse::new(event_stream(rx)).keep_alive(KeepAlive::default()))
}

fn event_stream(rx: mpsc::Receiver<ExchangeEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        let ev = rx.recv().await?;
        let event = Event::default()
            .event(ev.name())
            .json_data(&ev)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Some((Ok(event), rx))
    })
}

async fn cancel_chat(State(state): State<AppState>) -> StatusCode {
    state.cancel.store(true, Ordering::Release);
    StatusCode::ACCEPTED
}

async fn transcript(State(state): State<AppState>) -> Json<DownloadLink> {
    let session = state.session.read().await;
    let artifact = TranscriptArtifact::new(session.all(), Local::now().naive_local());
    Json(artifact.download_link())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/models", get(list_models))
        .route("/api/settings", get(get_settings).patch(patch_settings))
        .route("/api/messages", get(list_messages).delete(clear_messages))
        .route("/api/chat", post(chat))
        .route("/api/chat/cancel", post(cancel_chat))
        .route("/api/transcript", get(transcript))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "chat server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
