// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

#[cfg(test)]
mod tests {
    use crate::domain::models::identity::{Egress, Identity};
    use crate::engines::reqwest_engine::{random_user_agent, ReqwestEngine};
    use crate::engines::traits::{FetchEngine, FetchRequest};
    use crate::utils::errors::NetworkError;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
        Router,
    };
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn start_test_server() -> String {
        let app = Router::new()
            .route(
                "/test",
                get(|| async {
                    Response::builder()
                        .header("content-type", "text/html")
                        .body("<html><body>Test content</body></html>".to_string())
                        .unwrap()
                }),
            )
            .route(
                "/headers",
                get(|headers: HeaderMap| async move {
                    let lang = headers
                        .get("accept-language")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let ua = headers
                        .get("user-agent")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    format!("{}|{}", lang, ua)
                }),
            )
            .route(
                "/error",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn request(url: String) -> FetchRequest {
        FetchRequest::new(url, Identity::direct(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_reqwest_engine_basic_fetch() {
        let server_url = start_test_server().await;

        let response = ReqwestEngine
            .fetch(&request(format!("{}/test", server_url)))
            .await
            .unwrap();

        assert_eq!(response.status_code, 200);
        assert!(response.content.contains("Test content"));
        assert!(response.headers["content-type"].contains("text/html"));
        assert!(response.final_url.ends_with("/test"));
    }

    #[tokio::test]
    async fn test_reqwest_engine_sends_browser_headers() {
        let server_url = start_test_server().await;

        let response = ReqwestEngine
            .fetch(&request(format!("{}/headers", server_url)))
            .await
            .unwrap();

        let (lang, ua) = response.content.split_once('|').unwrap();
        assert_eq!(lang, "en-US,en;q=0.5");
        assert!(ua.starts_with("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_reqwest_engine_error_status() {
        let server_url = start_test_server().await;

        let result = ReqwestEngine
            .fetch(&request(format!("{}/error", server_url)))
            .await;

        match result {
            Err(NetworkError::Status { status, .. }) => assert_eq!(status, 500),
            other => panic!("expected status error, got {:?}", other.map(|r| r.status_code)),
        }
    }

    #[tokio::test]
    async fn test_reqwest_engine_rejects_malformed_proxy() {
        let identity = Identity::new(Egress::proxy("not a host:port"));
        let request = FetchRequest::new("http://example.com", identity, Duration::from_secs(1));

        let result = ReqwestEngine.fetch(&request).await;
        assert!(matches!(result, Err(NetworkError::InvalidProxy(_))));
    }

    #[test]
    fn test_random_user_agent_is_desktop_browser() {
        for _ in 0..10 {
            assert!(random_user_agent().starts_with("Mozilla/5.0"));
        }
    }
}
