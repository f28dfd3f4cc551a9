use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    serve, Form, Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::session::{ChatService, Event, SessionError};
use crate::view::SessionView;

/// Messages pushed to WebSocket clients, serialized as JSON.
#[derive(Clone, Debug, serde::Serialize)]
pub struct BroadcastMessage {
    /// `State`, `Info` or `Error`.
    pub message_type: String,
    pub payload: serde_json::Value,
}

impl BroadcastMessage {
    fn state(view: &SessionView) -> Self {
        Self {
            message_type: "State".to_string(),
            payload: serde_json::to_value(view).unwrap_or(serde_json::Value::Null),
        }
    }

    fn info(message: &str) -> Self {
        Self {
            message_type: "Info".to_string(),
            payload: serde_json::json!({ "message": message }),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            message_type: "Error".to_string(),
            payload: serde_json::json!({ "message": message }),
        }
    }
}

// Shared application state
#[derive(Clone)]
struct AppState {
    templates: Arc<AutoReloader>,
    service: Arc<ChatService>,
    // Every connected tab of the session receives the re-rendered state
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
}

#[derive(Deserialize)]
struct ChatForm {
    message: String,
}

#[derive(Deserialize)]
struct SettingsForm {
    model: String,
    temperature: String,
}

fn create_minijinja_env(template_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&template_dir));
        notifier.watch_path(&template_dir, true);
        Ok(env)
    })
}

fn render_page(templates: &AutoReloader, view: &SessionView) -> Result<String, minijinja::Error> {
    let env = templates.acquire_env()?;
    let tmpl = env.get_template("index.html")?;
    tmpl.render(minijinja::context! {
        title => view.title,
        view => view,
    })
}

fn render_response(state: &AppState, status: StatusCode, view: &SessionView) -> Response {
    match render_page(&state.templates, view) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> Response {
    let view = state.service.snapshot().await;
    render_response(&state, StatusCode::OK, &view)
}

async fn state_handler(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.service.snapshot().await)
}

/// Shared tail of every form command: tell open sockets, then re-render via redirect.
async fn after_command(state: &AppState, result: Result<(), SessionError>) -> Response {
    match result {
        Err(SessionError::Halted(message)) => {
            warn!("Command rejected, session halted: {}", message);
            let view = state.service.peek().await;
            render_response(state, StatusCode::SERVICE_UNAVAILABLE, &view)
        }
        other => {
            if let Err(e) = other {
                debug!("Command finished with a notice: {}", e);
            }
            let view = state.service.peek().await;
            // No receivers just means no tab has a socket open
            let _ = state.broadcast_tx.send(BroadcastMessage::state(&view));
            Redirect::to("/").into_response()
        }
    }
}

async fn chat_handler(State(state): State<AppState>, Form(form): Form<ChatForm>) -> Response {
    let result = state.service.submit(&form.message).await.map(|_| ());
    after_command(&state, result).await
}

async fn settings_handler(
    State(state): State<AppState>,
    Form(form): Form<SettingsForm>,
) -> Response {
    let result = state
        .service
        .update_settings(&form.model, &form.temperature)
        .await;
    after_command(&state, result).await
}

async fn reset_handler(State(state): State<AppState>) -> Response {
    let result = state.service.reset().await;
    after_command(&state, result).await
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Applies one client frame. Returns a message for the sender only, if any.
pub(crate) async fn apply_client_frame(
    service: &ChatService,
    broadcast_tx: &broadcast::Sender<BroadcastMessage>,
    text: &str,
) -> Option<BroadcastMessage> {
    let event: Event = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring malformed client event: {}", e);
            return Some(BroadcastMessage::error(&format!("Malformed event: {e}")));
        }
    };

    if let Err(SessionError::Halted(message)) = service.handle(event).await {
        return Some(BroadcastMessage::error(&message));
    }

    let view = service.snapshot().await;
    if broadcast_tx.send(BroadcastMessage::state(&view)).is_err() {
        // Nobody subscribed; hand the render straight back to the sender
        return Some(BroadcastMessage::state(&view));
    }
    None
}

async fn send_json(sender: &mut futures::stream::SplitSink<WebSocket, Message>, msg: &BroadcastMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(json_msg) => sender.send(Message::Text(json_msg)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize broadcast message: {}", e);
            true
        }
    }
}

// Handle individual WebSocket connections
async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let welcome = BroadcastMessage::info("Connected to chat session");
    let initial = BroadcastMessage::state(&state.service.peek().await);
    if !send_json(&mut sender, &welcome).await || !send_json(&mut sender, &initial).await {
        warn!("Failed to send initial state to new WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            Ok(msg) = broadcast_rx.recv() => {
                if !send_json(&mut sender, &msg).await {
                    warn!("WebSocket client disconnected or send error. Closing connection.");
                    break;
                }
            }

            Some(Ok(msg)) = receiver.next() => {
                match msg {
                    Message::Text(text) => {
                        debug!("Received event from client: {}", text);
                        // A submit blocks this socket until the reply lands; only one call is in flight per session
                        if let Some(reply) = apply_client_frame(&state.service, &state.broadcast_tx, &text).await {
                            if !send_json(&mut sender, &reply).await {
                                break;
                            }
                        }
                    }
                    Message::Binary(_) => {
                        warn!("Received unexpected binary message from client");
                    }
                    // Axum answers pings itself
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        info!("Client requested WebSocket close");
                        break;
                    }
                }
            }

            // Client disconnected without sending a Close message
            else => {
                info!("WebSocket client disconnected");
                break;
            }
        }
    }
    info!("WebSocket connection closed");
}

/// Builds the full application router for `service`.
pub fn router(config: &Config, service: Arc<ChatService>) -> Router {
    let templates = create_minijinja_env(config.template_dir.clone());
    let (broadcast_tx, _) = broadcast::channel::<BroadcastMessage>(100);

    let state = AppState {
        templates: Arc::new(templates),
        service,
        broadcast_tx,
    };

    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/settings", post(settings_handler))
        .route("/reset", post(reset_handler))
        .route("/api/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn start_web_server(addr: SocketAddr, config: &Config, service: Arc<ChatService>) -> Result<()> {
    let app = router(config, service);
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
