//! Real HTTP round trips through the ureq transport against a wiremock cluster.

mod common;

use common::{AUTH, client_for};
use fcr_common::{HarnessError, Method};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test(flavor = "multi_thread")]
async fn test_get_decodes_document_and_sends_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", AUTH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"version":{"number":"6.0.0"},"tagline":"You Know, for Search"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let doc = tokio::task::spawn_blocking(move || client_for(&uri).get("/"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.get_str("version.number").unwrap(), "6.0.0");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_put_sends_body_and_query_params() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/testsingledoc/doc/1"))
        .and(query_param("refresh", "true"))
        .and(header("content-type", "application/json"))
        .and(body_string(r#"{"test":"test"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"result":"created"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let doc = tokio::task::spawn_blocking(move || {
        client_for(&uri).request(
            Method::Put,
            "testsingledoc/doc/1",
            &[("refresh", "true")],
            Some(r#"{"test":"test"}"#),
        )
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(doc.get_str("result").unwrap(), "created");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_status_becomes_http_error_with_body() {
    let server = MockServer::start().await;
    let reason = "Security index is not on the current version - the native realm will not be operational until the upgrade API is run on the security index";
    Mock::given(method("PUT"))
        .and(path("/_xpack/security/user/postupgrade_user"))
        .respond_with(ResponseTemplate::new(400).set_body_string(format!(
            r#"{{"error":{{"type":"illegal_state_exception","reason":"{reason}"}},"status":400}}"#
        )))
        .mount(&server)
        .await;

    let uri = server.uri();
    let err = tokio::task::spawn_blocking(move || {
        client_for(&uri).put_json("/_xpack/security/user/postupgrade_user", "{}")
    })
    .await
    .unwrap()
    .unwrap_err();

    let http = err.as_http().expect("http error");
    assert_eq!(http.status, 400);
    assert_eq!(http.error_type().as_deref(), Some("illegal_state_exception"));
    assert!(http.mentions(reason));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_xpack/watcher/_start"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let doc = tokio::task::spawn_blocking(move || client_for(&uri).post("_xpack/watcher/_start"))
        .await
        .unwrap()
        .unwrap();
    assert!(doc.get_bool("acknowledged").unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_xpack/watcher/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .mount(&server)
        .await;

    let uri = server.uri();
    let err = tokio::task::spawn_blocking(move || client_for(&uri).get("/_xpack/watcher/stats"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, HarnessError::Decode(_)));
}
