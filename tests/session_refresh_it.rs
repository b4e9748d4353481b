#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use wealthsimple_session::{
	_preludet::*,
	auth::{Credential, TokenPair},
	session::{InvalidationCause, SessionStatus},
};

fn pair_expiring_in(access: &str, refresh: &str, lifetime: Duration) -> TokenPair {
	let issued = OffsetDateTime::now_utc() - Duration::minutes(30);

	TokenPair::builder()
		.access_token(access)
		.refresh_token(refresh)
		.issued_at(issued)
		.expires_at(OffsetDateTime::now_utc() + lifetime)
		.build()
		.expect("Seed pair should build.")
}

#[tokio::test]
async fn expired_pair_is_refreshed_once_and_then_reused() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("\"grant_type\":\"refresh_token\"")
				.body_includes("\"refresh_token\":\"R1\"");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-1)));

	let session = builder.build().await.expect("Persisted pair should be restored.");

	assert_eq!(session.status(), SessionStatus::ExpiringSoon);

	let first = session.valid_token().await.expect("Expired pair should refresh.");
	let second = session.valid_token().await.expect("Refreshed pair should be reused.");

	assert_eq!(first.expose(), "A2");
	assert_eq!(second.expose(), "A2");

	mock.assert_calls_async(1).await;

	let persisted = store.get(&test_profile()).expect("Refreshed pair should be persisted.");

	assert_eq!(persisted.access_token().expose(), "A2");
	assert_eq!(persisted.refresh_token().expose(), "R2");

	let metrics = session.metrics();

	assert_eq!(metrics.refresh_attempts(), 1);
	assert_eq!(metrics.refresh_successes(), 1);
}

#[tokio::test]
async fn token_inside_safety_margin_is_refreshed() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(30)));

	let session = builder.build().await.expect("Persisted pair should be restored.");
	let token = session.valid_token().await.expect("Pair inside the margin should refresh.");

	assert_eq!(token.expose(), "A2");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_callers_share_a_single_refresh() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(100))
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-5)));

	let session = Arc::new(builder.build().await.expect("Persisted pair should be restored."));
	let handles = (0..50)
		.map(|_| {
			let session = session.clone();

			tokio::spawn(async move { session.valid_token().await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let token = handle
			.await
			.expect("Caller task should not panic.")
			.expect("Every caller should receive a token.");

		assert_eq!(token.expose(), "A2");
	}

	mock.assert_calls_async(1).await;

	assert_eq!(session.metrics().refresh_attempts(), 1);
}

#[tokio::test]
async fn response_without_rotation_keeps_the_refresh_token() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "A2", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-1)));

	let session = builder.build().await.expect("Persisted pair should be restored.");

	session.valid_token().await.expect("Refresh without rotation should succeed.");

	let persisted = store.get(&test_profile()).expect("Refreshed pair should be persisted.");

	assert_eq!(persisted.refresh_token().expose(), "R1");
}

#[tokio::test]
async fn revoked_refresh_token_requires_a_new_sign_in() {
	let server = MockServer::start_async().await;
	let mut refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"grant_type\":\"refresh_token\"");
			then.status(401)
				.header("content-type", "application/json")
				.json_body(json!({ "error": "invalid_grant", "error_description": "Token revoked" }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-1)));

	let session = builder.build().await.expect("Persisted pair should be restored.");
	let err = session.valid_token().await.expect_err("Revoked refresh token must fail.");

	assert!(matches!(err, Error::ReauthenticationRequired { .. }));
	assert_eq!(
		session.status(),
		SessionStatus::Invalidated(InvalidationCause::RefreshRejected)
	);
	assert!(store.is_empty());

	let again = session.valid_token().await.expect_err("Invalidated session must stay invalid.");

	assert!(matches!(again, Error::ReauthenticationRequired { .. }));

	refresh_mock.assert_calls_async(1).await;
	refresh_mock.delete_async().await;

	let _sign_in = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"grant_type\":\"password\"");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "A3", "refresh_token": "R3", "expires_in": 1800 }));
		})
		.await;

	session
		.authenticate(Credential::new("someone@example.com", "hunter2"))
		.await
		.expect("A new sign-in should recover the session.");

	assert_eq!(session.valid_token().await.expect("Recovered token.").expose(), "A3");
	assert_eq!(session.status(), SessionStatus::Valid);
}

#[tokio::test]
async fn refresh_outage_keeps_the_session_alive() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(502).body("bad gateway");
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-1)));

	let session = builder.build().await.expect("Persisted pair should be restored.");
	let err = session.valid_token().await.expect_err("Outage must surface.");

	assert!(matches!(err, Error::Transient(_)));
	assert!(err.is_retryable());
	assert_eq!(session.status(), SessionStatus::ExpiringSoon);
	assert!(store.get(&test_profile()).is_some());
	assert_eq!(session.metrics().refresh_failures(), 1);
}

#[tokio::test]
async fn explicit_tokens_without_expiry_refresh_on_first_use() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"refresh_token\":\"R0\"");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "A1", "refresh_token": "R1", "expires_in": 1800 }));
		})
		.await;
	let (builder, _) = reqwest_test_session_builder(&server.url("/token"));
	let session =
		builder.tokens("A0", "R0").build().await.expect("Explicit tokens should be accepted.");

	assert_eq!(session.valid_token().await.expect("First use should refresh.").expose(), "A1");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn short_lived_refresh_result_is_still_shared() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"refresh_token\":\"R1\"");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(50))
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 30 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-5)));

	let session = Arc::new(builder.build().await.expect("Persisted pair should be restored."));
	let handles = (0..20)
		.map(|_| {
			let session = session.clone();

			tokio::spawn(async move { session.valid_token().await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let token = handle
			.await
			.expect("Caller task should not panic.")
			.expect("Every caller should receive a token.");

		assert_eq!(token.expose(), "A2");
	}

	// A 30 second lifetime sits inside the 60 second margin; waiters still reuse it.
	mock.assert_calls_async(1).await;

	assert_eq!(session.metrics().refresh_attempts(), 1);
}

#[tokio::test]
async fn cancelled_caller_does_not_lose_the_rotated_pair() {
	let server = MockServer::start_async().await;
	let first = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"refresh_token\":\"R1\"");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(300))
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-5)));

	let session = Arc::new(builder.build().await.expect("Persisted pair should be restored."));
	let leader = {
		let session = session.clone();

		tokio::spawn(async move { session.valid_token().await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(100)).await;
	leader.abort();

	assert!(leader.await.expect_err("Leader should have been aborted.").is_cancelled());

	let token = session.valid_token().await.expect("Rotated pair should be installed.");

	assert_eq!(token.expose(), "A2");

	first.assert_calls_async(1).await;

	let persisted = store.get(&test_profile()).expect("Rotated pair should be persisted.");

	assert_eq!(persisted.refresh_token().expose(), "R2");
}

#[tokio::test]
async fn logout_during_refresh_wins() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(300))
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-5)));

	let session = Arc::new(builder.build().await.expect("Persisted pair should be restored."));
	let refreshing = {
		let session = session.clone();

		tokio::spawn(async move { session.valid_token().await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	session.logout().await;

	let err = refreshing
		.await
		.expect("Caller task should not panic.")
		.expect_err("Refresh racing a logout must not hand out a token.");

	assert!(matches!(err, Error::NotAuthenticated));
	assert!(matches!(session.valid_token().await, Err(Error::NotAuthenticated)));
	assert_eq!(session.status(), SessionStatus::Invalidated(InvalidationCause::LoggedOut));
	assert!(store.is_empty());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn sign_in_during_refresh_keeps_the_new_lifecycle() {
	let server = MockServer::start_async().await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"grant_type\":\"refresh_token\"");
			then.status(200)
				.header("content-type", "application/json")
				.delay(std::time::Duration::from_millis(300))
				.json_body(json!({ "access_token": "A2", "refresh_token": "R2", "expires_in": 1800 }));
		})
		.await;
	let sign_in = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"grant_type\":\"password\"");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "access_token": "B1", "refresh_token": "S1", "expires_in": 1800 }));
		})
		.await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));

	store.insert(test_profile(), pair_expiring_in("A1", "R1", Duration::seconds(-5)));

	let session = Arc::new(builder.build().await.expect("Persisted pair should be restored."));
	let refreshing = {
		let session = session.clone();

		tokio::spawn(async move { session.valid_token().await })
	};

	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
	session
		.authenticate(Credential::new("someone@example.com", "hunter2"))
		.await
		.expect("Sign-in should succeed.");

	let raced = refreshing
		.await
		.expect("Caller task should not panic.")
		.expect("Refresh should settle before the sign-in installs its pair.");

	assert_eq!(raced.expose(), "A2");
	assert_eq!(session.valid_token().await.expect("New lifecycle token.").expose(), "B1");
	assert_eq!(
		store.get(&test_profile()).expect("New pair should be persisted.").access_token().expose(),
		"B1"
	);

	refresh.assert_calls_async(1).await;
	sign_in.assert_calls_async(1).await;
}
