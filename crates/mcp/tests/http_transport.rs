//! Integration tests for the HTTP transport against an in-test axum server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde_json::json;
use switchboard_core::{ClientConfig, TransportConfig};
use switchboard_mcp::transport::{HttpTransport, Transport};
use switchboard_mcp::{
    notifications, AuthError, AuthManager, CallToolResult, JsonRpcNotification, JsonRpcRequest,
    McpClient, McpError, McpServer,
};
use switchboard_tool_runtime::{CalculatorTool, EchoTool, SleepTool};

async fn spawn_router(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn spawn_server(server: McpServer) -> SocketAddr {
    let server = Arc::new(server);
    server.register_tool(EchoTool).await;
    server.register_tool(CalculatorTool).await;
    server.register_tool(SleepTool).await;
    spawn_router(server.router()).await
}

fn config(addr: SocketAddr) -> TransportConfig {
    TransportConfig::http(format!("http://{addr}"))
}

#[tokio::test]
async fn request_response_over_http() {
    let addr = spawn_server(McpServer::new("http-test")).await;
    let transport = HttpTransport::new(&config(addr)).unwrap();
    transport.connect().await.unwrap();

    let response = transport
        .send(JsonRpcRequest::new(
            1,
            "tools/call",
            Some(json!({"name": "calculator", "arguments": {"operation": "add", "a": 5, "b": 3}})),
        ))
        .await
        .unwrap();
    let result: CallToolResult = serde_json::from_value(response.into_result().unwrap()).unwrap();
    assert_eq!(result.text(), "5 add 3 = 8");
}

#[tokio::test]
async fn concurrent_posts_keep_their_ids() {
    let addr = spawn_server(McpServer::new("http-test")).await;
    let transport = Arc::new(HttpTransport::new(&config(addr)).unwrap());
    transport.connect().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10i64 {
        let t = Arc::clone(&transport);
        handles.push(tokio::spawn(async move {
            let message = format!("hello-{i}");
            let response = t
                .send(JsonRpcRequest::new(
                    i,
                    "tools/call",
                    Some(json!({"name": "echo", "arguments": {"message": message}})),
                ))
                .await
                .unwrap();
            let result: CallToolResult =
                serde_json::from_value(response.into_result().unwrap()).unwrap();
            assert_eq!(result.text(), message);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn notifications_are_accepted() {
    let addr = spawn_server(McpServer::new("http-test")).await;
    let transport = HttpTransport::new(&config(addr)).unwrap();
    transport.connect().await.unwrap();
    transport
        .notify(JsonRpcNotification::new(notifications::INITIALIZED, None))
        .await
        .unwrap();
}

#[tokio::test]
async fn slow_response_times_out() {
    let addr = spawn_server(McpServer::new("http-test")).await;
    let transport =
        HttpTransport::new(&config(addr).with_timeout(Duration::from_millis(200))).unwrap();
    transport.connect().await.unwrap();

    let err = transport
        .send(JsonRpcRequest::new(
            1,
            "tools/call",
            Some(json!({"name": "sleep", "arguments": {"ms": 2000}})),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::Timeout(_)));
}

#[tokio::test]
async fn non_json_error_status_is_a_transport_error() {
    let router = Router::new().route(
        "/mcp",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
    );
    let addr = spawn_router(router).await;
    let transport = HttpTransport::new(&config(addr)).unwrap();
    assert!(matches!(transport.connect().await, Err(McpError::Transport(_))));
}

#[tokio::test]
async fn bearer_token_travels_in_the_header() {
    let auth = AuthManager::new("http-secret").unwrap();
    let token = auth.generate_token("ops", &["tools:list"], Duration::from_secs(60)).unwrap();
    let addr = spawn_server(McpServer::new("secure").with_auth(auth)).await;

    // No credential: the open `ping` probe connects, listing is refused.
    let anonymous = HttpTransport::new(&config(addr)).unwrap();
    anonymous.connect().await.unwrap();
    let response = anonymous
        .send(JsonRpcRequest::new(1, "tools/list", None))
        .await
        .unwrap();
    assert!(matches!(
        response.into_result(),
        Err(McpError::Auth(AuthError::InvalidCredential(_)))
    ));

    let mut with_token = config(addr);
    with_token.auth_token = Some(token);
    let client = McpClient::new(
        Arc::new(HttpTransport::new(&with_token).unwrap()),
        ClientConfig::default(),
    );
    client.connect().await.unwrap();
    assert_eq!(client.list_tools().await.unwrap().len(), 3);

    // The header grants listing only.
    let err = client
        .call_tool("echo", json!({"message": "hi"}))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::Auth(AuthError::PermissionDenied(_))));
}
