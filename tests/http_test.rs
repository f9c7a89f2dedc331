//! Integration tests for the HTTP client against a local canned endpoint.

use std::time::Duration;

use seatwatch::config::secrets::SecretString;
use seatwatch::error::Error;
use seatwatch::model::{RawResult, TaskKey};
use seatwatch::reserve::http::{HttpReserver, Page, SearchFilters};
use seatwatch::reserve::{AttemptContext, Reserve};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Canned endpoint
// ---------------------------------------------------------------------------

/// Answer a single request with `status` and `body`, returning the raw
/// request text once it has been served.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (base, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn client(base: &str) -> HttpReserver {
    HttpReserver::new(base, Duration::from_secs(5)).unwrap()
}

fn cookies() -> SecretString {
    SecretString::from("JSESSIONID=abc; junk".to_string())
}

// ---------------------------------------------------------------------------
// Session check
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_accepts_listing_reply() {
    let (base, server) = serve_once("200 OK", r#"{"total":12,"rows":[]}"#).await;

    assert!(client(&base).validate(&cookies()).await.unwrap());

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /new/student/xsxk/xklx/02/hzkc "));
    assert!(request.contains("page=1&rows=1"));
    assert!(request.to_lowercase().contains("cookie: jsessionid=abc\r\n"));
}

#[tokio::test]
async fn validate_rejects_login_page() {
    let (base, server) = serve_once("200 OK", "<html>login</html>").await;
    assert!(!client(&base).validate(&cookies()).await.unwrap());
    server.await.unwrap();
}

#[tokio::test]
async fn validate_rejects_error_status() {
    let (base, server) = serve_once("401 Unauthorized", "{}").await;
    assert!(!client(&base).validate(&cookies()).await.unwrap());
    server.await.unwrap();
}

#[tokio::test]
async fn validate_reports_unreachable_endpoint() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = client(&base).validate(&cookies()).await.unwrap_err();
    assert!(matches!(err, Error::Http(_)));
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_sends_filters_and_reads_rows() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"total":1,"rows":[{"kcptdm":"P100","kcmc":"Operating Systems"}]}"#,
    )
    .await;

    let filters = SearchFilters {
        keyword: "Operating".to_string(),
        ..SearchFilters::default()
    };
    let listing = client(&base)
        .search(&cookies(), "public_jingyue", &filters, Page::new(1, 60))
        .await
        .unwrap();
    assert_eq!(listing.total, Some(1));
    assert_eq!(listing.rows[0]["kcptdm"], "P100");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /new/student/xsxk/xklx/08/hzkc "));
    assert!(request.contains("kcxx=Operating"));
    assert!(request.contains("page=1&rows=60&sort=kcmc&order=asc"));
}

#[tokio::test]
async fn sections_query_by_course_id() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"total":2,"rows":[{"kcrwdm":"S1"},{"kcrwdm":"S2"}]}"#,
    )
    .await;

    let listing = client(&base)
        .sections(&cookies(), "major_benbu", "P100", Page::new(1, 50))
        .await
        .unwrap();
    assert_eq!(listing.rows.len(), 2);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /new/student/xsxk/xklx/02/kxkc "));
    assert!(request.contains("kcptdm=P100&hasme=0"));
    assert!(request.contains("sort=kcrwdm"));
}

#[tokio::test]
async fn listing_error_status_is_an_error() {
    let (base, server) = serve_once("500 Internal Server Error", "{}").await;

    let err = client(&base)
        .sections(&cookies(), "major_benbu", "P100", Page::new(1, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Status(s) if s.as_u16() == 500));
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Reservation attempt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attempt_posts_section_and_parses_reply() {
    let (base, server) = serve_once("200 OK", r#"{"code":-1,"message":"full"}"#).await;

    let ctx = AttemptContext {
        display_name: "OS".to_string(),
        credentials: cookies(),
    };
    let raw = client(&base)
        .attempt(&TaskKey::new("major_benbu", "C123"), &ctx)
        .await;
    assert_eq!(raw, RawResult::reply(Some(-1), "full"));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /new/student/xsxk/xklx/02/add "));
    assert!(request.contains("kcrwdm=C123&kcmc=OS&qz=-1&hlct=0"));
}

#[tokio::test]
async fn attempt_error_status_is_transport_failure() {
    let (base, server) = serve_once("502 Bad Gateway", "{}").await;

    let ctx = AttemptContext {
        display_name: "OS".to_string(),
        credentials: cookies(),
    };
    let raw = client(&base)
        .attempt(&TaskKey::new("major_benbu", "C123"), &ctx)
        .await;
    assert!(matches!(raw, RawResult::TransportFailure { ref reason } if reason.contains("502")));
    server.await.unwrap();
}
