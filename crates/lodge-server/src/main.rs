use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use lodge_api::auth::{self, AppState, AppStateInner};
use lodge_api::middleware::require_auth;
use lodge_api::{bots, channels, conversations, members, messages, reactions, uploads, workspaces};
use lodge_gateway::connection;
use lodge_gateway::dispatcher::Dispatcher;

#[derive(Clone)]
struct ServerState {
    dispatcher: Dispatcher,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lodge=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("LODGE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("LODGE_DB_PATH").unwrap_or_else(|_| "lodge.db".into());
    let host = std::env::var("LODGE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("LODGE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let files_base_url = std::env::var("LODGE_FILES_BASE_URL")
        .unwrap_or_else(|_| format!("http://localhost:{port}/files"));

    // Init database
    let db = lodge_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
        files_base_url,
    });

    let state = ServerState {
        dispatcher,
        jwt_secret,
    };

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/workspaces", post(workspaces::create_workspace))
        .route("/workspaces", get(workspaces::list_workspaces))
        .route("/workspaces/{workspace_id}", get(workspaces::get_workspace))
        .route("/workspaces/{workspace_id}/join", post(workspaces::join_workspace))
        .route(
            "/workspaces/{workspace_id}/reset-join-code",
            post(workspaces::reset_join_code),
        )
        .route("/workspaces/{workspace_id}/channels", get(channels::list_channels))
        .route("/workspaces/{workspace_id}/channels", post(channels::create_channel))
        .route("/channels/{channel_id}", get(channels::get_channel))
        .route("/workspaces/{workspace_id}/members", get(members::list_members))
        .route("/workspaces/{workspace_id}/members/me", get(members::current_member))
        .route(
            "/workspaces/{workspace_id}/conversations",
            post(conversations::create_or_get_conversation),
        )
        .route("/workspaces/{workspace_id}/bot", get(bots::get_bot))
        .route("/messages", post(messages::create_message))
        .route("/messages", get(messages::get_messages))
        .route("/messages/bot", post(messages::create_bot_message))
        .route("/messages/{message_id}", get(messages::get_message))
        .route("/messages/{message_id}", patch(messages::update_message))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/messages/{message_id}/reactions", post(reactions::toggle_reaction))
        .route("/uploads", post(uploads::upload))
        .route("/files/{upload_id}", get(uploads::download))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Lodge server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<ServerState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher, state.jwt_secret)
    })
}
