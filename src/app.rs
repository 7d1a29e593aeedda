use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, profile};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(profile::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().path().to_string();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        let latency_ms = latency.as_millis() as u64;
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    use crate::auth::{jwt::SessionKeys, password::hash_password};
    use crate::notifications::gateway::GatewayError;
    use crate::state::fake::{config, Fake};
    use crate::users::{User, UserDirectory};

    async fn call(
        fake: &Fake,
        method: Method,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = build_app(fake.state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, value)
    }

    fn last_token(fake: &Fake) -> String {
        let sent = fake.mail.sent();
        let html = &sent.last().unwrap().html;
        let start = html.find("token=").unwrap() + "token=".len();
        html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect()
    }

    async fn seed(fake: &Fake, confirmed: bool) -> User {
        fake.users
            .insert(User {
                id: 0,
                email: "a@a.com".into(),
                first_name: "a".into(),
                last_name: Some("b".into()),
                password_hash: Some(hash_password("StR0NGP@SS!").unwrap()),
                confirmed,
                admin: false,
                metadata: None,
                created_at: OffsetDateTime::now_utc(),
            })
            .await
    }

    fn signup_body() -> Value {
        json!({
            "email": "a@a.com",
            "first_name": "a",
            "last_name": "b",
            "password": "StR0NGP@SS!",
            "password_confirmation": "StR0NGP@SS!"
        })
    }

    #[tokio::test]
    async fn health() {
        let fake = AppState::fake();
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let res = build_app(fake.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_confirm_login() {
        let fake = AppState::fake();

        let (status, _, body) =
            call(&fake, Method::POST, "/api/v1/signup", Some(signup_body()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item"]["email"], "a@a.com");
        assert_eq!(body["item"]["confirmed"], false);
        assert!(body["item"].get("password_hash").is_none());
        assert!(body["item"].get("hash").is_none());
        assert_eq!(fake.users.count().await.unwrap(), 1);
        assert_eq!(fake.mail.sent().len(), 1);

        let id = body["item"]["id"].as_i64().unwrap();
        let (status, _, _) = call(
            &fake,
            Method::POST,
            "/api/v1/login",
            Some(json!({ "email": "a@a.com", "password": "StR0NGP@SS!" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let uri = format!("/api/v1/signup/{}/confirm?token={}", id, last_token(&fake));
        let (status, headers, _) = call(&fake, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(
            headers.get(header::LOCATION).unwrap(),
            "https://example.com/signup/confirmed"
        );
        assert_eq!(fake.mail.sent().last().unwrap().subject, "Welcome");

        let (status, _, body) = call(&fake, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);

        let (status, _, body) = call(
            &fake,
            Method::POST,
            "/api/v1/login",
            Some(json!({ "email": "a@a.com", "password": "StR0NGP@SS!" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let claims = SessionKeys::from_ref(&fake.state)
            .verify(body["token"].as_str().unwrap())
            .unwrap();
        assert_eq!(claims.id, id);
        assert_eq!(claims.email, "a@a.com");
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let fake = AppState::fake();
        call(&fake, Method::POST, "/api/v1/signup", Some(signup_body()), None).await;
        let (status, _, _) =
            call(&fake, Method::POST, "/api/v1/signup", Some(signup_body()), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(fake.users.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn confirmation_error_redirect() {
        let mut cfg = config();
        cfg.signup.confirmation_error_redirect_url = Some("https://example.com/oops".into());
        let fake = AppState::fake_with(cfg);
        let user = seed(&fake, false).await;

        let uri = format!("/api/v1/signup/{}/confirm?token=garbage", user.id);
        let (status, headers, _) = call(&fake, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::FOUND);
        assert_eq!(
            headers.get(header::LOCATION).unwrap(),
            "https://example.com/oops?error=invalid_token"
        );
    }

    #[tokio::test]
    async fn malformed_confirmation_id_follows_error_redirect() {
        let mut cfg = config();
        cfg.signup.confirmation_error_redirect_url = Some("https://example.com/oops".into());
        let fake = AppState::fake_with(cfg);

        for uri in [
            "/api/v1/signup/abc/confirm?token=x",
            "/api/v1/signup/99999999999999999999/confirm?token=x",
        ] {
            let (status, headers, _) = call(&fake, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::FOUND, "{}", uri);
            assert_eq!(
                headers.get(header::LOCATION).unwrap(),
                "https://example.com/oops?error=invalid_token"
            );
        }

        let fake = AppState::fake();
        let (status, _, body) =
            call(&fake, Method::GET, "/api/v1/signup/abc/confirm?token=x", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);
    }

    #[tokio::test]
    async fn pre_launch_confirm_with_password_via_put() {
        let fake = AppState::fake();
        let (_, _, body) = call(
            &fake,
            Method::POST,
            "/api/v1/signup/pre_launch",
            Some(json!({ "email": "a@a.com", "first_name": "a" })),
            None,
        )
        .await;
        let id = body["item"]["id"].as_i64().unwrap();
        assert_eq!(body["item"]["metadata"]["signup_variant"], "pre_launch");

        let (status, _, body) = call(
            &fake,
            Method::PUT,
            &format!("/api/v1/signup/{}/confirm", id),
            Some(json!({
                "token": last_token(&fake),
                "password": "STRONGPASS@",
                "password_confirmation": "STRONGPASS@"
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item"]["confirmed"], true);

        let (status, _, _) = call(
            &fake,
            Method::POST,
            "/api/v1/signin",
            Some(json!({ "email": "a@a.com", "password": "STRONGPASS@" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn early_access_confirm_returns_session() {
        let fake = AppState::fake();
        let (_, _, body) = call(
            &fake,
            Method::POST,
            "/api/v1/signup/early_access",
            Some(json!({ "email": "a@a.com", "first_name": "a" })),
            None,
        )
        .await;
        let id = body["item"]["id"].as_i64().unwrap();
        let token = last_token(&fake);

        let uri = format!("/api/v1/signup/early_access/{}/confirm", id);
        let (status, _, _) =
            call(&fake, Method::PUT, &uri, Some(json!({ "token": token })), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _, body) = call(
            &fake,
            Method::PUT,
            &uri,
            Some(json!({
                "token": token,
                "password": "STRONGPASS@",
                "password_confirmation": "STRONGPASS@"
            })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item"]["confirmed"], true);

        let (status, _, _) = call(
            &fake,
            Method::GET,
            "/api/v1/profile",
            None,
            body["token"].as_str(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let fake = AppState::fake();
        seed(&fake, true).await;

        let (s1, _, wrong) = call(
            &fake,
            Method::POST,
            "/api/v1/login",
            Some(json!({ "email": "a@a.com", "password": "nope" })),
            None,
        )
        .await;
        let (s2, _, unknown) = call(
            &fake,
            Method::POST,
            "/api/v1/login",
            Some(json!({ "email": "z@z.com", "password": "StR0NGP@SS!" })),
            None,
        )
        .await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s2, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn forgot_and_reset_password() {
        let fake = AppState::fake();
        let user = seed(&fake, true).await;

        let (s1, _, known) = call(
            &fake,
            Method::POST,
            "/api/v1/password/forgot",
            Some(json!({ "email": "a@a.com" })),
            None,
        )
        .await;
        let (s2, _, unknown) = call(
            &fake,
            Method::POST,
            "/api/v1/password/forgot",
            Some(json!({ "email": "nobody@a.com" })),
            None,
        )
        .await;
        assert_eq!(s1, StatusCode::OK);
        assert_eq!(s2, StatusCode::OK);
        assert_eq!(known, unknown);
        assert_eq!(
            known["message"],
            "An email with a password reset link was sent to your inbox"
        );
        assert_eq!(fake.mail.sent().len(), 1);

        let reset = json!({
            "token": last_token(&fake),
            "password": "STRONGPASS@",
            "password_confirmation": "STRONGPASS@"
        });
        let uri = format!("/api/v1/password/{}/reset", user.id);
        let (status, _, body) = call(&fake, Method::PUT, &uri, Some(reset.clone()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["item"].get("password_hash").is_none());

        let (status, _, body) = call(&fake, Method::PUT, &uri, Some(reset), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Token is no longer valid");

        let (status, _, _) = call(
            &fake,
            Method::POST,
            "/api/v1/login",
            Some(json!({ "email": "a@a.com", "password": "STRONGPASS@" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn forgot_password_reports_gateway_failure() {
        let fake = AppState::fake();
        seed(&fake, true).await;
        fake.mail.fail_with(Some(GatewayError {
            code: Some(100),
            message: "some_error".into(),
        }));

        let (status, _, body) = call(
            &fake,
            Method::POST,
            "/api/v1/password/forgot",
            Some(json!({ "email": "a@a.com" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], 100);
        assert_eq!(body["message"], "some_error");
    }

    #[tokio::test]
    async fn empty_bodies() {
        let fake = AppState::fake();
        let cases = [
            (Method::POST, "/api/v1/signup", StatusCode::UNPROCESSABLE_ENTITY),
            (Method::POST, "/api/v1/signup/pre_launch", StatusCode::UNPROCESSABLE_ENTITY),
            (Method::PUT, "/api/v1/signup/1/confirm", StatusCode::UNAUTHORIZED),
            (Method::PUT, "/api/v1/signup/early_access/1/confirm", StatusCode::UNAUTHORIZED),
            (Method::POST, "/api/v1/login", StatusCode::UNAUTHORIZED),
            (Method::POST, "/api/v1/password/forgot", StatusCode::OK),
            (Method::PUT, "/api/v1/password/1/reset", StatusCode::UNAUTHORIZED),
        ];
        for (method, uri, expected) in cases {
            let (status, _, _) = call(&fake, method, uri, None, None).await;
            assert_eq!(status, expected, "{}", uri);
        }
        assert_eq!(fake.users.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn profile_requires_session_and_updates() {
        let fake = AppState::fake();
        let user = seed(&fake, true).await;

        let (status, _, _) = call(&fake, Method::GET, "/api/v1/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _, _) =
            call(&fake, Method::GET, "/api/v1/profile", None, Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = SessionKeys::from_ref(&fake.state).sign(&user).unwrap();
        let (status, _, body) =
            call(&fake, Method::GET, "/api/v1/profile", None, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item"]["id"], user.id);

        let (status, _, body) = call(
            &fake,
            Method::PUT,
            "/api/v1/profile",
            Some(json!({ "user": { "first_name": "Ann", "email": "x@x.com" } })),
            Some(&token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["item"]["first_name"], "Ann");
        assert_eq!(body["item"]["email"], "a@a.com");
    }
}
