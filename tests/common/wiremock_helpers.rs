use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use std::time::Duration;

/// Creates a mock site that answers `GET /` with the given response headers.
///
/// The browser side of a scan is scripted; this server only feeds the
/// header channel and robots.txt.
pub async fn mock_site_headers(headers: &[(&str, &str)]) -> MockServer {
    let server = MockServer::start().await;

    let mut response = ResponseTemplate::new(200)
        .set_body_string("<html></html>")
        .insert_header("content-type", "text/html; charset=utf-8");
    for (name, value) in headers {
        response = response.insert_header(*name, *value);
    }

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(response)
        .mount(&server)
        .await;

    server
}

/// Mounts a robots.txt body on an existing server.
pub async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body.to_string())
                .insert_header("content-type", "text/plain"),
        )
        .mount(server)
        .await;
}

/// Creates a mock HTTP server that delays responses to simulate network timeouts.
pub async fn mock_timeout_server(delay_ms: u64) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("delayed response")
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(&server)
        .await;

    server
}

/// Mounts a place-search answer for searches centred on `latitude`.
pub async fn mount_places_page(server: &MockServer, latitude: f64, ids: &[&str]) {
    let places: Vec<serde_json::Value> = ids.iter().map(|id| serde_json::json!({ "id": id })).collect();

    Mock::given(method("POST"))
        .and(path("/v1/places:searchText"))
        .and(header("X-Goog-Api-Key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "locationBias": { "circle": { "center": { "latitude": latitude } } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "places": places })))
        .mount(server)
        .await;
}

/// Mounts a quota-exhausted error for searches centred on `latitude`.
pub async fn mount_places_quota_error(server: &MockServer, latitude: f64) {
    Mock::given(method("POST"))
        .and(path("/v1/places:searchText"))
        .and(body_partial_json(serde_json::json!({
            "locationBias": { "circle": { "center": { "latitude": latitude } } }
        })))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {
                "code": 429,
                "message": "Quota exceeded for quota metric 'SearchTextRequest'",
                "status": "RESOURCE_EXHAUSTED"
            }
        })))
        .mount(server)
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_site_headers_sets_headers() {
        let server = mock_site_headers(&[("server", "nginx")]).await;

        let response = reqwest::get(format!("{}/", server.uri())).await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("server").unwrap(), "nginx");
    }

    #[tokio::test]
    async fn test_mount_robots() {
        let server = MockServer::start().await;
        mount_robots(&server, "Disallow: /wp-admin/").await;

        let body = reqwest::get(format!("{}/robots.txt", server.uri()))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains("wp-admin"));
    }
}
