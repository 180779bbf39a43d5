//! Coverage for the remote activity API adapter against a loopback stub.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{StatusCode, Url};
use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::dto::{ActivityDto, AuthorizationCodeDto, TokenDto};
use super::http_source::{decode, map_status_error};
use super::{StravaCredentials, StravaHttpSource};
use crate::domain::ports::{ActivitySource, ActivitySourceError};
use crate::domain::{AccessToken, ActivityId, ActivitySummary, AthleteId, RefreshToken};

type Routes = Arc<dyn Fn(&str) -> (u16, String) + Send + Sync>;

/// Loopback HTTP/1.1 server answering one request per connection.
struct StubServer {
    base_url: Url,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    async fn start(routes: impl Fn(&str) -> (u16, String) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes: Routes = Arc::new(routes);

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream, Arc::clone(&routes), Arc::clone(&recorded)));
            }
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}/api/v3/")).expect("stub url"),
            requests,
        }
    }

    fn source(&self) -> StravaHttpSource {
        StravaHttpSource::new(
            self.base_url.clone(),
            StravaCredentials {
                client_id: "client-1".to_owned(),
                client_secret: "s3cret".to_owned(),
            },
            Duration::from_secs(5),
        )
        .expect("client builds")
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn answer(mut stream: TcpStream, routes: Routes, recorded: Arc<Mutex<Vec<String>>>) {
    let request = read_request(&mut stream).await;
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_owned();
    recorded.lock().expect("requests lock").push(request);

    let (status, body) = routes(&target);
    let response = format!(
        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\n\
         content-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let body_len = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn activity_json(id: i64) -> String {
    format!(
        r#"{{"id":{id},"athlete":{{"id":5}},"name":"Ride {id}","sport_type":"Ride",
            "start_date":"2024-03-01T07:30:00Z","distance":12500.5}}"#
    )
}

#[tokio::test]
async fn listing_follows_pages_until_an_empty_one() {
    let server = StubServer::start(|target| match target {
        "/api/v3/activities?page=1&per_page=200" => {
            (200, format!("[{},{}]", activity_json(1), activity_json(2)))
        }
        "/api/v3/activities?page=2&per_page=200" => (200, format!("[{}]", activity_json(3))),
        _ => (200, "[]".to_owned()),
    })
    .await;

    let activities = server
        .source()
        .list_all_activities(&AccessToken::new("tok-1"))
        .await
        .expect("listing succeeds");

    let ids: Vec<_> = activities.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![ActivityId::new(1), ActivityId::new(2), ActivityId::new(3)]);
    assert_eq!(activities[0].athlete_id, AthleteId::new(5));
    let requests = server.requests();
    assert_eq!(requests.len(), 3, "two full pages plus the terminating empty page");
    assert!(
        requests[0].to_lowercase().contains("authorization: bearer tok-1"),
        "listing should authenticate with the bearer token"
    );
}

#[tokio::test]
async fn stream_bytes_are_returned_verbatim() {
    let payload = r#"[{"type":"latlng","data":[[51.5,-0.12]]}]"#;
    let server = StubServer::start(move |target| match target {
        "/api/v3/activities/77/streams?keys=latlng" => (200, payload.to_owned()),
        _ => (500, String::new()),
    })
    .await;

    let bytes = server
        .source()
        .fetch_stream_bytes(&AccessToken::new("tok"), ActivityId::new(77))
        .await
        .expect("stream fetch succeeds");

    assert_eq!(bytes, payload.as_bytes());
}

#[tokio::test]
async fn missing_stream_maps_to_not_found() {
    let server = StubServer::start(|_| (404, r#"{"message":"Record Not Found"}"#.to_owned())).await;

    let error = server
        .source()
        .fetch_stream_bytes(&AccessToken::new("tok"), ActivityId::new(1))
        .await
        .expect_err("404 must fail");

    assert!(error.is_not_found());
    assert!(error.to_string().contains("Record Not Found"));
}

#[tokio::test]
async fn expired_token_maps_to_unauthorized() {
    let server = StubServer::start(|_| (401, String::new())).await;

    let error = server
        .source()
        .list_all_activities(&AccessToken::new("stale"))
        .await
        .expect_err("401 must fail");

    assert!(matches!(error, ActivitySourceError::Unauthorized { .. }));
}

#[tokio::test]
async fn malformed_listing_maps_to_decode() {
    let server = StubServer::start(|_| (200, "<html>oops</html>".to_owned())).await;

    let error = server
        .source()
        .list_all_activities(&AccessToken::new("tok"))
        .await
        .expect_err("HTML must not decode");

    assert!(matches!(error, ActivitySourceError::Decode { .. }));
}

#[tokio::test]
async fn code_exchange_posts_the_oauth_form() {
    let server = StubServer::start(|target| match target {
        "/api/v3/oauth/token" => (
            200,
            r#"{"access_token":"a1","refresh_token":"r1","expires_at":1700000000,
                "athlete":{"id":42}}"#
                .to_owned(),
        ),
        _ => (404, String::new()),
    })
    .await;

    let grant = server
        .source()
        .exchange_auth_code("code-xyz")
        .await
        .expect("exchange succeeds");

    assert_eq!(grant.athlete_id, AthleteId::new(42));
    assert_eq!(grant.tokens.access_token.expose(), "a1");
    assert_eq!(grant.tokens.expires_at.timestamp(), 1_700_000_000);
    let request = server.requests().remove(0);
    assert!(request.starts_with("POST /api/v3/oauth/token"));
    for field in [
        "client_id=client-1",
        "client_secret=s3cret",
        "grant_type=authorization_code",
        "code=code-xyz",
    ] {
        assert!(request.contains(field), "form should carry {field}: {request}");
    }
}

#[tokio::test]
async fn refresh_posts_the_refresh_grant() {
    let server = StubServer::start(|_| {
        (
            200,
            r#"{"access_token":"a2","refresh_token":"r2","expires_at":1700003600}"#.to_owned(),
        )
    })
    .await;

    let grant = server
        .source()
        .refresh_token(&RefreshToken::new("r1"))
        .await
        .expect("refresh succeeds");

    assert_eq!(grant.refresh_token.expose(), "r2");
    let request = server.requests().remove(0);
    assert!(request.contains("grant_type=refresh_token"));
    assert!(request.contains("refresh_token=r1"));
}

#[rstest]
#[case::unauthorized(StatusCode::UNAUTHORIZED, "Unauthorized")]
#[case::not_found(StatusCode::NOT_FOUND, "NotFound")]
#[case::rate_limited(StatusCode::TOO_MANY_REQUESTS, "RateLimited")]
#[case::gateway_timeout(StatusCode::GATEWAY_TIMEOUT, "Timeout")]
#[case::forbidden(StatusCode::FORBIDDEN, "Transport")]
#[case::server_error(StatusCode::INTERNAL_SERVER_ERROR, "Transport")]
fn maps_http_statuses_to_expected_domain_errors(
    #[case] status: StatusCode,
    #[case] expected: &str,
) {
    let error = map_status_error(status, b"{\"message\":\"nope\"}");
    let actual = match error {
        ActivitySourceError::Unauthorized { .. } => "Unauthorized",
        ActivitySourceError::NotFound { .. } => "NotFound",
        ActivitySourceError::RateLimited { .. } => "RateLimited",
        ActivitySourceError::Timeout { .. } => "Timeout",
        ActivitySourceError::Transport { .. } => "Transport",
        ActivitySourceError::Decode { .. } => "Decode",
    };
    assert_eq!(actual, expected, "status {status} mapped unexpectedly");
}

#[rstest]
fn long_error_bodies_are_truncated() {
    let body = "x".repeat(500);
    let message = map_status_error(StatusCode::BAD_GATEWAY, body.as_bytes()).to_string();

    assert!(message.ends_with("..."));
    assert!(message.len() < 200);
}

#[rstest]
fn activity_dto_tolerates_missing_optional_fields() {
    let dto: ActivityDto = decode(
        br#"{"id":9,"athlete":{"id":3},"start_date":"2023-01-01T00:00:00Z"}"#,
        "activity",
    )
    .expect("minimal activity decodes");
    let summary = ActivitySummary::from(dto);

    assert_eq!(summary.id, ActivityId::new(9));
    assert!(summary.name.is_empty());
    assert_eq!(summary.distance, 0.0);
}

#[rstest]
fn out_of_range_expiry_is_rejected() {
    let dto: TokenDto = decode(
        br#"{"access_token":"a","refresh_token":"r","expires_at":9223372036854775807}"#,
        "token",
    )
    .expect("token decodes");

    assert!(dto.into_grant().is_err());
}

#[rstest]
fn authorization_dto_requires_the_athlete() {
    let result: Result<AuthorizationCodeDto, _> = decode(
        br#"{"access_token":"a","refresh_token":"r","expires_at":1}"#,
        "authorization",
    );

    assert!(matches!(result, Err(ActivitySourceError::Decode { .. })));
}
