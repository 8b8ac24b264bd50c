use anyhow::Result;
use broiler_api::core::SessionInvalidator;
use broiler_api::{ApiClient, ApiError, ClientConfig, Identity, RefreshState, SessionStore};
use httpmock::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counting_client(server: &MockServer) -> Result<(ApiClient, Arc<AtomicUsize>)> {
    let invalidations = Arc::new(AtomicUsize::new(0));
    let hook: SessionInvalidator = {
        let invalidations = invalidations.clone();
        Arc::new(move || {
            invalidations.fetch_add(1, Ordering::SeqCst);
        })
    };
    let client = ApiClient::new(ClientConfig::new(server.base_url()), Some(hook))?;
    Ok((client, invalidations))
}

#[tokio::test]
async fn test_successful_request_returns_body() -> Result<()> {
    let server = MockServer::start();
    let farms_mock = server.mock(|when, then| {
        when.method(GET).path("/farms");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!([
                {"id": 1, "name": "North Farm"},
                {"id": 2, "name": "River Farm"}
            ]));
    });
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200);
    });

    let (client, invalidations) = counting_client(&server)?;
    let body = client.get("/farms").await?;

    farms_mock.assert();
    assert_eq!(refresh_mock.hits(), 0);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
    assert_eq!(body[1]["name"], "River Farm");
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_server_error_never_triggers_refresh() -> Result<()> {
    let server = MockServer::start();
    let flocks_mock = server.mock(|when, then| {
        when.method(GET).path("/flocks");
        then.status(500)
            .json_body(serde_json::json!({"message": "database unavailable"}));
    });
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200);
    });

    let (client, _) = counting_client(&server)?;
    let err = client.get("/flocks").await.unwrap_err();

    flocks_mock.assert();
    assert_eq!(refresh_mock.hits(), 0);
    match err {
        ApiError::Status { status, body, .. } => {
            assert_eq!(status, 500);
            assert!(body.contains("database unavailable"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_after_replay_propagates() -> Result<()> {
    let server = MockServer::start();
    let ledgers_mock = server.mock(|when, then| {
        when.method(GET).path("/ledgers");
        then.status(401);
    });
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).header("Set-Cookie", "session=renewed; Path=/; HttpOnly");
    });

    let (client, invalidations) = counting_client(&server)?;
    let err = client.get("/ledgers").await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(ledgers_mock.hits(), 2);
    assert_eq!(refresh_mock.hits(), 1);
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    assert_eq!(client.refresh_state(), RefreshState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_refresh_endpoint_is_not_intercepted() -> Result<()> {
    let server = MockServer::start();
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(401);
    });

    let (client, invalidations) = counting_client(&server)?;
    let err = client.post("/auth/refresh", None).await.unwrap_err();

    assert!(err.is_unauthorized());
    assert_eq!(refresh_mock.hits(), 1);
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_refresh_clears_session() -> Result<()> {
    let server = MockServer::start();
    let buyers_mock = server.mock(|when, then| {
        when.method(GET).path("/buyers");
        then.status(401);
    });
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(401)
            .json_body(serde_json::json!({"message": "refresh token expired"}));
    });

    let store = SessionStore::new();
    store.set(Identity {
        id: Some(serde_json::json!(7)),
        name: Some("Dispatch Desk".to_string()),
        email: Some("dispatch@example.com".to_string()),
        role: Some("sales".to_string()),
        extra: Default::default(),
    });
    let client = ApiClient::new(ClientConfig::new(server.base_url()), Some(store.invalidator()))?;

    let err = client.get("/buyers").await.unwrap_err();

    buyers_mock.assert();
    refresh_mock.assert();
    match err {
        ApiError::RefreshFailed(failure) => {
            assert_eq!(failure.status, Some(401));
            assert_eq!(failure.message, "refresh token expired");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!store.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() -> Result<()> {
    let server = MockServer::start();
    let paths = ["/farms", "/sheds", "/flocks"];
    let data_mocks: Vec<_> = paths
        .iter()
        .map(|path| {
            server.mock(|when, then| {
                when.method(GET).path(*path);
                then.status(401);
            })
        })
        .collect();
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).delay(Duration::from_millis(400));
    });

    let (client, invalidations) = counting_client(&server)?;
    let (a, b, c) = tokio::join!(
        client.get(paths[0]),
        client.get(paths[1]),
        client.get(paths[2])
    );

    for outcome in [a, b, c] {
        assert!(outcome.unwrap_err().is_unauthorized());
    }
    assert_eq!(refresh_mock.hits(), 1);
    for mock in &data_mocks {
        assert_eq!(mock.hits(), 2);
    }
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_replayed_with_renewed_cookie() -> Result<()> {
    let server = MockServer::start();
    let paths = ["/farms", "/sheds", "/flocks"];
    // 先定義的 mock 優先比對：帶新 cookie 的重送拿到 200
    let renewed_mocks: Vec<_> = paths
        .iter()
        .map(|path| {
            server.mock(|when, then| {
                when.method(GET).path(*path).header("cookie", "session=renewed");
                then.status(200)
                    .json_body(serde_json::json!({"path": path, "session": "renewed"}));
            })
        })
        .collect();
    let expired_mocks: Vec<_> = paths
        .iter()
        .map(|path| {
            server.mock(|when, then| {
                when.method(GET).path(*path);
                then.status(401);
            })
        })
        .collect();
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200)
            .header("Set-Cookie", "session=renewed; Path=/; HttpOnly")
            .delay(Duration::from_millis(400));
    });

    let (client, invalidations) = counting_client(&server)?;
    let (a, b, c) = tokio::join!(
        client.get(paths[0]),
        client.get(paths[1]),
        client.get(paths[2])
    );

    for (path, outcome) in paths.iter().zip([a, b, c]) {
        let body = outcome?;
        assert_eq!(body["path"], *path);
        assert_eq!(body["session"], "renewed");
    }
    assert_eq!(refresh_mock.hits(), 1);
    for (renewed, expired) in renewed_mocks.iter().zip(&expired_mocks) {
        assert_eq!(renewed.hits(), 1);
        assert_eq!(expired.hits(), 1);
    }
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    assert_eq!(client.refresh_state(), RefreshState::Idle);
    Ok(())
}

#[tokio::test]
async fn test_refresh_endpoint_without_leading_slash_is_not_intercepted() -> Result<()> {
    let server = MockServer::start();
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(401);
    });

    let (client, invalidations) = counting_client(&server)?;
    let err = client.post("auth/refresh", None).await.unwrap_err();

    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(refresh_mock.hits(), 1);
    assert_eq!(invalidations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_rejected_when_refresh_fails() -> Result<()> {
    let server = MockServer::start();
    let users_mock = server.mock(|when, then| {
        when.method(GET).path("/users");
        then.status(401);
    });
    let refresh_mock = server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(403).delay(Duration::from_millis(400));
    });

    let (client, invalidations) = counting_client(&server)?;
    let (a, b, c) = tokio::join!(
        client.get("/users"),
        client.get("/users"),
        client.get("/users")
    );

    for outcome in [a, b, c] {
        assert!(matches!(
            outcome,
            Err(ApiError::RefreshFailed(ref failure)) if failure.status == Some(403)
        ));
    }
    assert_eq!(users_mock.hits(), 3);
    assert_eq!(refresh_mock.hits(), 1);
    assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_refresh_timeout_rejects_request() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/sheds");
        then.status(401);
    });
    server.mock(|when, then| {
        when.method(POST).path("/auth/refresh");
        then.status(200).delay(Duration::from_secs(2));
    });

    let invalidations = Arc::new(AtomicUsize::new(0));
    let hook: SessionInvalidator = {
        let invalidations = invalidations.clone();
        Arc::new(move || {
            invalidations.fetch_add(1, Ordering::SeqCst);
        })
    };
    let config = ClientConfig::new(server.base_url())
        .with_refresh_timeout(Some(Duration::from_millis(100)));
    let client = ApiClient::new(config, Some(hook))?;

    let err = client.get("/sheds").await.unwrap_err();

    assert!(matches!(err, ApiError::RefreshFailed(ref failure) if failure.status.is_none()));
    assert_eq!(invalidations.load(Ordering::SeqCst), 1);
    Ok(())
}
