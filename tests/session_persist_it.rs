#![cfg(feature = "reqwest")]

// std
use std::{
	path::PathBuf,
	sync::atomic::{AtomicUsize, Ordering},
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use wealthsimple_session::{
	_preludet::*,
	auth::{Credential, ProfileId, TokenPair},
	http::ReqwestHttpClient,
	session::{InvalidationCause, SessionBuilder, SessionStatus},
	store::{EnvStore, FileStore, MemoryStore, SecretStore, StoreError, StoreFuture},
};

struct UnavailableStore {
	calls: AtomicUsize,
}
impl UnavailableStore {
	fn new() -> Self {
		Self { calls: AtomicUsize::new(0) }
	}

	fn fail<'a, T>(&'a self) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
	{
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async { Err(StoreError::Backend { message: "keychain locked".into() }) })
	}
}
impl SecretStore for UnavailableStore {
	fn name(&self) -> &'static str {
		"unavailable"
	}

	fn read<'a>(&'a self, _: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>> {
		self.fail()
	}

	fn write<'a>(&'a self, _: &'a ProfileId, _: &'a TokenPair) -> StoreFuture<'a, ()> {
		self.fail()
	}

	fn delete<'a>(&'a self, _: &'a ProfileId) -> StoreFuture<'a, ()> {
		self.fail()
	}
}

struct StalledStore;
impl SecretStore for StalledStore {
	fn name(&self) -> &'static str {
		"stalled"
	}

	fn read<'a>(&'a self, _: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>> {
		Box::pin(async { Ok(None) })
	}

	fn write<'a>(&'a self, _: &'a ProfileId, _: &'a TokenPair) -> StoreFuture<'a, ()> {
		Box::pin(async {
			tokio::time::sleep(std::time::Duration::from_secs(5)).await;

			Ok(())
		})
	}

	fn delete<'a>(&'a self, _: &'a ProfileId) -> StoreFuture<'a, ()> {
		Box::pin(async { Ok(()) })
	}
}

fn scratch_file(label: &str) -> PathBuf {
	let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();

	std::env::temp_dir()
		.join(format!("wealthsimple-session-{label}-{}-{nanos}", std::process::id()))
		.join("tokens.json")
}

async fn sign_in_mock(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("\"grant_type\":\"password\"");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"access_token": "A1",
				"refresh_token": "R1",
				"expires_in": 1800
			}));
		})
		.await
}

#[tokio::test]
async fn signed_in_pair_survives_a_restart_through_a_file() {
	let server = MockServer::start_async().await;
	let mock = sign_in_mock(&server).await;
	let path = scratch_file("restart");
	let first_store: Arc<dyn SecretStore> =
		Arc::new(FileStore::open(path.clone()).expect("File store should open."));
	let first = SessionBuilder::<ReqwestHttpClient>::with_http_client(
		test_descriptor(&server.url("/token")),
		test_reqwest_http_client(),
	)
	.profile(test_profile())
	.store(first_store)
	.credential(Credential::new("someone@example.com", "hunter2"))
	.build()
	.await
	.expect("First run should sign in.");
	let expires_at = first.expires_at().expect("Signed-in session has an expiry.");

	drop(first);

	let second_store: Arc<dyn SecretStore> =
		Arc::new(FileStore::open(path.clone()).expect("File store should reopen."));
	let second = SessionBuilder::<ReqwestHttpClient>::with_http_client(
		test_descriptor(&server.url("/token")),
		test_reqwest_http_client(),
	)
	.profile(test_profile())
	.store(second_store)
	.credential(Credential::new("someone@example.com", "hunter2"))
	.build()
	.await
	.expect("Second run should restore the persisted pair.");

	assert_eq!(second.valid_token().await.expect("Restored token.").expose(), "A1");
	assert_eq!(second.expires_at(), Some(expires_at));

	mock.assert_calls_async(1).await;

	let _ = std::fs::remove_dir_all(path.parent().expect("Scratch file has a parent."));
}

#[tokio::test]
async fn env_overlay_round_trips_a_pair() {
	let server = MockServer::start_async().await;
	let _mock = sign_in_mock(&server).await;
	let env = EnvStore::isolated();
	let store: Arc<dyn SecretStore> = Arc::new(env.clone());
	let session = SessionBuilder::<ReqwestHttpClient>::with_http_client(
		test_descriptor(&server.url("/token")),
		test_reqwest_http_client(),
	)
	.profile(test_profile())
	.store(store)
	.build_unauthenticated();

	session
		.authenticate(Credential::new("someone@example.com", "hunter2"))
		.await
		.expect("Sign-in should succeed.");

	assert_eq!(env.var("ACCESS_TOKEN").as_deref(), Some("A1"));
	assert_eq!(env.var("REFRESH_TOKEN").as_deref(), Some("R1"));
	assert!(env.var("TOKEN_EXPIRY").is_some());

	session.logout().await;

	assert_eq!(env.var("ACCESS_TOKEN"), None);
}

#[tokio::test]
async fn first_backend_holding_a_pair_wins() {
	let server = MockServer::start_async().await;
	let primary = Arc::new(MemoryStore::default());
	let secondary = Arc::new(MemoryStore::default());
	let later = OffsetDateTime::now_utc() + Duration::hours(1);

	secondary.insert(
		test_profile(),
		TokenPair::builder()
			.access_token("secondary")
			.refresh_token("R-secondary")
			.expires_at(later)
			.build()
			.expect("Secondary pair should build."),
	);

	let stores: Vec<Arc<dyn SecretStore>> = vec![primary.clone(), secondary.clone()];
	let session = SessionBuilder::<ReqwestHttpClient>::with_http_client(
		test_descriptor(&server.url("/token")),
		test_reqwest_http_client(),
	)
	.profile(test_profile())
	.stores(stores)
	.build()
	.await
	.expect("Secondary backend should supply the pair.");

	assert_eq!(session.valid_token().await.expect("Restored token.").expose(), "secondary");
	assert!(primary.is_empty());
}

#[tokio::test]
async fn failing_backend_never_fails_the_session() {
	let server = MockServer::start_async().await;
	let _mock = sign_in_mock(&server).await;
	let broken = Arc::new(UnavailableStore::new());
	let healthy = Arc::new(MemoryStore::default());
	let stores: Vec<Arc<dyn SecretStore>> = vec![broken.clone(), healthy.clone()];
	let session = SessionBuilder::<ReqwestHttpClient>::with_http_client(
		test_descriptor(&server.url("/token")),
		test_reqwest_http_client(),
	)
	.profile(test_profile())
	.stores(stores)
	.credential(Credential::new("someone@example.com", "hunter2"))
	.build()
	.await
	.expect("A broken backend must not block sign-in.");

	assert_eq!(session.valid_token().await.expect("Token despite broken backend.").expose(), "A1");
	assert!(healthy.get(&test_profile()).is_some());
	// One failed read during restore, one failed write after sign-in.
	assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
	assert_eq!(session.metrics().persist_failures(), 1);

	session.logout().await;

	assert!(healthy.is_empty());
	assert_eq!(session.metrics().persist_failures(), 2);
}

#[tokio::test]
async fn logout_is_idempotent_and_blocks_tokens() {
	let server = MockServer::start_async().await;
	let _mock = sign_in_mock(&server).await;
	let (builder, store) = reqwest_test_session_builder(&server.url("/token"));
	let session = builder
		.credential(Credential::new("someone@example.com", "hunter2"))
		.build()
		.await
		.expect("Sign-in should succeed.");

	assert_eq!(store.len(), 1);

	session.logout().await;
	session.logout().await;

	assert!(store.is_empty());
	assert_eq!(session.status(), SessionStatus::Invalidated(InvalidationCause::LoggedOut));

	let err = session.valid_token().await.expect_err("Logged-out session must not hand out tokens.");

	assert!(matches!(err, Error::NotAuthenticated));
}

#[tokio::test]
async fn slow_backend_is_cut_off_by_the_persist_timeout() {
	let server = MockServer::start_async().await;
	let _mock = sign_in_mock(&server).await;
	let healthy = Arc::new(MemoryStore::default());
	let stores: Vec<Arc<dyn SecretStore>> = vec![Arc::new(StalledStore), healthy.clone()];
	let session = SessionBuilder::<ReqwestHttpClient>::with_http_client(
		test_descriptor(&server.url("/token")),
		test_reqwest_http_client(),
	)
	.profile(test_profile())
	.stores(stores)
	.persist_timeout(Duration::milliseconds(100))
	.build_unauthenticated();
	let started = std::time::Instant::now();

	session
		.authenticate(Credential::new("someone@example.com", "hunter2"))
		.await
		.expect("A stalled backend must not fail sign-in.");

	assert!(
		started.elapsed() < std::time::Duration::from_secs(2),
		"Sign-in took {:?} despite the persist timeout.",
		started.elapsed()
	);
	assert!(healthy.get(&test_profile()).is_some());
	assert_eq!(session.metrics().persist_failures(), 1);
	assert_eq!(session.valid_token().await.expect("Token after sign-in.").expose(), "A1");
}
