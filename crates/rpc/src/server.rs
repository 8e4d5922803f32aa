//! HTTP and WebSocket transports. Both funnel every call through the same
//! [`dispatcher::dispatch`]; the WebSocket path additionally threads a
//! [`Connection`] through [`RequestDetails`] so `eth_subscribe` has
//! somewhere to register its fan-out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc::unbounded_channel;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{AppContext, RequestDetails};
use crate::dispatcher::dispatch;
use crate::errors::{RpcErrorMetadata, RpcErrorResponse};
use crate::rpc_types::{RpcRequest, RpcRequestId, RpcRequestWrapper};
use crate::subscriptions::{AdmissionResult, Connection};

pub fn router(context: AppContext) -> Router {
    Router::new()
        .route("/", post(handle_http))
        .route("/ws", get(handle_ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(context)
}

pub async fn serve(context: AppContext, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("gateway listening on {addr}");
    axum::serve(
        listener,
        router(context).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn handle_http(
    State(context): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: String,
) -> Json<Value> {
    let ip = addr.ip().to_string();
    let response = match serde_json::from_str::<RpcRequestWrapper>(&body) {
        Ok(RpcRequestWrapper::Single(request)) => handle_one(&context, &request, &ip, None).await,
        Ok(RpcRequestWrapper::Batch(requests)) => {
            let mut responses = Vec::with_capacity(requests.len());
            for request in &requests {
                responses.push(handle_one(&context, request, &ip, None).await);
            }
            json!(responses)
        }
        Err(_) => parse_error_frame(),
    };
    Json(response)
}

async fn handle_one(
    context: &AppContext,
    request: &RpcRequest,
    ip: &str,
    connection: Option<Arc<Connection>>,
) -> Value {
    let mut details = RequestDetails::new(Uuid::new_v4().to_string(), ip.to_string());
    if let Some(connection) = connection {
        details = details.with_connection(connection);
    }
    let outcome = dispatch(
        &context.registry,
        &context.cache,
        &context.cache_configs,
        context.rate_limiter.as_ref(),
        &context.rate_limit_config,
        context.config.debug_api_enabled,
        request,
        details,
    )
    .await;
    match outcome {
        Ok(success) => serde_json::to_value(success).unwrap_or(Value::Null),
        Err(error) => serde_json::to_value(error).unwrap_or(Value::Null),
    }
}

fn parse_error_frame() -> Value {
    let response = RpcErrorResponse::new(
        RpcRequestId::None,
        RpcErrorMetadata {
            code: -32700,
            data: None,
            message: "Parse error".to_string(),
        },
    );
    serde_json::to_value(response).unwrap_or(Value::Null)
}

async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(context): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, context, addr.ip().to_string()))
}

async fn handle_ws_connection(socket: WebSocket, context: AppContext, ip: String) {
    let (outbound_tx, mut outbound_rx) = unbounded_channel::<String>();
    let connection = Arc::new(Connection::new(ip, outbound_tx));
    let (mut ws_sink, mut ws_stream) = socket.split();

    if let AdmissionResult::Rejected(frame) = context.connection_limiter.try_admit(&connection) {
        let _ = ws_sink.send(Message::Text(frame.into())).await;
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let inactivity_ttl = context.config.ws_max_inactivity_ttl;
    loop {
        let remaining = inactivity_ttl
            .saturating_sub(connection.idle_for())
            .max(Duration::from_millis(1));
        tokio::select! {
            message = ws_stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_one(
                            &context,
                            &match serde_json::from_str::<RpcRequest>(&text) {
                                Ok(request) => request,
                                Err(_) => {
                                    connection.send(&parse_error_frame().to_string());
                                    continue;
                                }
                            },
                            &connection.ip_address,
                            Some(connection.clone()),
                        ).await;
                        connection.send(&response.to_string());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(error)) => {
                        warn!(%error, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::time::sleep(remaining) => {
                if connection.idle_for() >= inactivity_ttl {
                    break;
                }
            }
        }
    }

    context.subscriptions.forget_connection(&connection).await;
    context.connection_limiter.release(&connection);
    writer.abort();
}
