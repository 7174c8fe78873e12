use bodega_sync::api::model::{PickLine, PickOrderReq};
use bodega_sync::api::{ApiClient, ApiError};
use bodega_sync::secrets::{Credentials, MemorySecrets};
use httpmock::prelude::*;
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;

fn client_for(server: &MockServer) -> (ApiClient, Arc<Credentials>) {
    let creds = Arc::new(Credentials::new(Box::<MemorySecrets>::default()));
    let url = Url::parse(&server.base_url()).unwrap();
    let client = ApiClient::new(url, creds.clone()).unwrap();
    (client, creds)
}

fn pick_req() -> PickOrderReq {
    PickOrderReq {
        order_id: 7,
        depot: "DEP1".into(),
        items: vec![PickLine {
            location: "P-01-03".into(),
            quantity: 2.0,
            article: "A1".into(),
            depot: "DEP1".into(),
            lot: "L55".into(),
            user: "maria".into(),
        }],
    }
}

#[tokio::test]
async fn reauth_is_attempted_at_most_once() {
    let server = MockServer::start_async().await;
    let business = server
        .mock_async(|when, then| {
            when.method(GET).path("/PP090/Lanzadas");
            then.status(401);
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/Login/Plano");
            then.status(401).body("credenciales invalidas");
        })
        .await;

    let (client, creds) = client_for(&server);
    creds.set_token("stale").await;
    creds.remember("maria", "wrong").await;

    let err = client.lanzadas().await.unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired), "got {err:?}");

    // exactly two outbound calls: the original and one login attempt
    business.assert_hits_async(1).await;
    login.assert_hits_async(1).await;
}

#[tokio::test]
async fn missing_remembered_credentials_surface_the_401() {
    let server = MockServer::start_async().await;
    let business = server
        .mock_async(|when, then| {
            when.method(GET).path("/PP090/Lanzadas");
            then.status(401);
        })
        .await;

    let (client, creds) = client_for(&server);
    creds.set_token("stale").await;

    let err = client.lanzadas().await.unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired));
    business.assert_hits_async(1).await;
}

#[tokio::test]
async fn successful_reauth_replays_the_original_request() {
    let server = MockServer::start_async().await;
    let req = pick_req();
    let body = serde_json::to_value(&req).unwrap();

    let stale = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/UB082/RecolectarPedido")
                .header("authorization", "Bearer stale");
            then.status(401);
        })
        .await;
    let replayed = {
        let body = body.clone();
        server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/UB082/RecolectarPedido")
                    .header("authorization", "Bearer fresh-token")
                    .json_body(body.clone());
                then.status(200);
            })
            .await
    };
    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/Login/Plano")
                .header("usuario", "maria")
                .header("password", "s3cret");
            then.status(200).json_body(json!({ "token": "fresh-token" }));
        })
        .await;

    let (client, creds) = client_for(&server);
    creds.set_token("stale").await;
    creds.remember("maria", "s3cret").await;

    client.recolectar(&req).await.unwrap();

    stale.assert_hits_async(1).await;
    login.assert_hits_async(1).await;
    replayed.assert_hits_async(1).await;
    assert_eq!(creds.token().await.as_deref(), Some("fresh-token"));
}

#[tokio::test]
async fn login_request_is_never_auth_wrapped() {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/Login/Plano").matches(|req| {
                req.headers
                    .as_ref()
                    .map(|hs| {
                        !hs.iter().any(|(k, _)| k.eq_ignore_ascii_case("authorization"))
                    })
                    .unwrap_or(true)
            });
            then.status(200).json_body(json!({ "token": "t2" }));
        })
        .await;

    let (client, creds) = client_for(&server);
    // a stale token exists, but must not leak into the login request
    creds.set_token("stale").await;

    let token = client.login("maria", "s3cret").await.unwrap();
    assert_eq!(token, "t2");
    login.assert_hits_async(1).await;
    assert_eq!(creds.token().await.as_deref(), Some("t2"));
}

#[tokio::test]
async fn rejected_login_is_auth_failed() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/Login/Plano");
            then.status(403).body("usuario bloqueado");
        })
        .await;

    let (client, _creds) = client_for(&server);
    let err = client.login("maria", "bad").await.unwrap_err();
    match err {
        ApiError::AuthFailed { status, body } => {
            assert_eq!(status.as_u16(), 403);
            assert!(body.contains("bloqueado"));
        }
        other => panic!("expected AuthFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn tenant_header_is_attached_to_business_calls() {
    let server = MockServer::start_async().await;
    let business = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/PP090/Lanzadas")
                .header("authorization", "Bearer tok")
                .header("x-empresa", "EMP1");
            then.status(200).json_body(json!([]));
        })
        .await;

    let (client, creds) = client_for(&server);
    creds.set_token("tok").await;
    creds.set_tenant("EMP1").await;

    let orders = client.lanzadas().await.unwrap();
    assert!(orders.is_empty());
    business.assert_hits_async(1).await;
}

#[tokio::test]
async fn non_401_errors_are_server_rejected_and_not_retried() {
    let server = MockServer::start_async().await;
    let business = server
        .mock_async(|when, then| {
            when.method(POST).path("/UB082/RecolectarPedido");
            then.status(422).body("partida vencida");
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/Login/Plano");
            then.status(200).json_body(json!({ "token": "t2" }));
        })
        .await;

    let (client, creds) = client_for(&server);
    creds.set_token("tok").await;
    creds.remember("maria", "s3cret").await;

    let err = client.recolectar(&pick_req()).await.unwrap_err();
    match err {
        ApiError::ServerRejected { status, body } => {
            assert_eq!(status.as_u16(), 422);
            assert!(body.contains("vencida"));
        }
        other => panic!("expected ServerRejected, got {other:?}"),
    }
    business.assert_hits_async(1).await;
    login.assert_hits_async(0).await;
}

#[tokio::test]
async fn connection_failures_are_transport_errors() {
    // nothing listens on this port
    let creds = Arc::new(Credentials::new(Box::<MemorySecrets>::default()));
    let client = ApiClient::new(Url::parse("http://127.0.0.1:9/").unwrap(), creds).unwrap();
    let err = client.lanzadas().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn concurrent_401s_share_one_relogin() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/PP090/Lanzadas")
                .header("authorization", "Bearer stale");
            then.status(401);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/PP090/Lanzadas")
                .header("authorization", "Bearer fresh-token");
            then.status(200).json_body(json!([]));
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/Login/Plano");
            then.status(200).json_body(json!({ "token": "fresh-token" }));
        })
        .await;

    let (client, creds) = client_for(&server);
    creds.set_token("stale").await;
    creds.remember("maria", "s3cret").await;

    let (a, b) = tokio::join!(client.lanzadas(), client.lanzadas());
    a.unwrap();
    b.unwrap();
    // however the two calls interleave, only one login may happen
    login.assert_hits_async(1).await;
}
