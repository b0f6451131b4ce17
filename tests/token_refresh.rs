//! Refresh single-flight sob concorrência real

mod common;

use std::time::Duration;

use amocrm::{AuthError, Context, Error, TokenStore};
use common::*;
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CALLERS: usize = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_single_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .and(body_partial_json(serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": "refresh-old"
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-new"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&expired_token()).await;
    let manager = manager_with_store(&server, store.clone());

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .get_valid_token(&Context::background(), DOMAIN)
                .await
        }));
    }

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(tokens.len(), CALLERS);
    assert!(tokens.iter().all(|t| *t == tokens[0]));
    assert_eq!(tokens[0].access_token, "access-new");

    // O token novo já está persistido quando os chamadores o recebem
    assert_eq!(store.load(DOMAIN).await.unwrap(), tokens[0]);

    // Com o token renovado em cache, nenhuma nova chamada ao endpoint
    let again = manager
        .get_valid_token(&Context::background(), DOMAIN)
        .await
        .unwrap();
    assert_eq!(again, tokens[0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_the_same_refresh_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({
                    "hint": "Token has been revoked",
                    "title": "Bad Request",
                    "status": 400
                }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&expired_token()).await;
    let manager = manager_with_store(&server, store.clone());

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .get_valid_token(&Context::background(), DOMAIN)
                .await
        }));
    }

    let mut errors = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Err(Error::Auth(e)) => errors.push(e),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    let expected = AuthError::revoked(DOMAIN, "Token has been revoked");
    assert!(errors.iter().all(|e| *e == expected));
    assert!(expected.is_permanent());

    // Falha no refresh não apaga o token salvo
    assert_eq!(store.load(DOMAIN).await.unwrap().access_token, "access-old");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_refresh_failure_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&expired_token()).await;
    let manager = manager_with_store(&server, store);

    let err = manager
        .get_valid_token(&Context::background(), DOMAIN)
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(!err.requires_reauthorization());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_callers_do_not_affect_the_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body("access-new"))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(&expired_token()).await;
    let manager = manager_with_store(&server, store.clone());

    // Quem inicia o refresh é cancelado no meio
    let initiator_ctx = Context::background();
    let initiator = {
        let manager = manager.clone();
        let ctx = initiator_ctx.clone();
        tokio::spawn(async move { manager.get_valid_token(&ctx, DOMAIN).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Um waiter que desiste por timeout
    let impatient = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let ctx = Context::with_timeout(Duration::from_millis(50));
            manager.get_valid_token(&ctx, DOMAIN).await
        })
    };

    // Um waiter que espera até o fim
    let patient = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .get_valid_token(&Context::background(), DOMAIN)
                .await
        })
    };

    initiator_ctx.cancel();

    assert!(matches!(initiator.await.unwrap(), Err(Error::Cancelled)));
    assert!(matches!(impatient.await.unwrap(), Err(Error::Timeout)));

    let token = patient.await.unwrap().unwrap();
    assert_eq!(token.access_token, "access-new");
    assert_eq!(store.load(DOMAIN).await.unwrap(), token);
}

#[tokio::test]
async fn unknown_domain_is_not_authorized() {
    let server = MockServer::start().await;
    let manager = manager_with_store(&server, std::sync::Arc::new(amocrm::MemoryTokenStore::new()));

    let err = manager
        .get_valid_token(&Context::background(), DOMAIN)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Auth(AuthError::NotAuthorized { .. })));
    assert!(server.received_requests().await.unwrap().is_empty());
}
