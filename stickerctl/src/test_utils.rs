//! Builders for test state, servers, users and a stub generation provider.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use axum_test::TestServer;

use crate::{
    AppState,
    auth::accounts::Accounts,
    config::{Config, PasswordConfig, SessionConfig},
    db::{
        handlers::{InMemoryStore, Store},
        models::users::UserDBResponse,
    },
    generation::{GenerationError, GenerationOutput, GenerationProvider, GenerationRequest},
    types::UserId,
};

pub const TEST_PASSWORD: &str = "secret1";
pub const TEST_ADMIN_EMAIL: &str = "admin@test.com";

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        auth: crate::config::AuthConfig {
            // Cheap hashing keeps the suite fast
            password: PasswordConfig {
                argon2_memory_kib: 1024,
                argon2_iterations: 1,
                argon2_parallelism: 1,
                ..Default::default()
            },
            session: SessionConfig {
                cookie_secure: false,
                ..Default::default()
            },
            ..Default::default()
        },
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

/// State over a fresh in-memory store and a generator that always succeeds.
pub fn create_test_state(config: Config) -> AppState {
    create_test_state_with(config, Arc::new(StubGenerator::succeeding("https://cdn.example.com/sticker.webp")))
}

pub fn create_test_state_with(config: Config, generator: Arc<dyn GenerationProvider>) -> AppState {
    AppState::builder()
        .store(Arc::new(InMemoryStore::new()))
        .config(config)
        .generator(generator)
        .build()
}

pub fn create_test_server(state: AppState) -> TestServer {
    let router = crate::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Register a member and return it with a session token.
pub async fn create_test_user(state: &AppState, email: &str) -> (UserDBResponse, String) {
    let accounts = Accounts::new(state.store.as_ref(), &state.config);
    let name = email.split('@').next().unwrap_or("user");
    accounts.register(name, email, TEST_PASSWORD).await.expect("Failed to create test user");
    accounts
        .authenticate(email, TEST_PASSWORD)
        .await
        .expect("Failed to log in test user")
}

/// Create the administrator and return it with a session token.
pub async fn create_test_admin(state: &AppState) -> (UserDBResponse, String) {
    let accounts = Accounts::new(state.store.as_ref(), &state.config);
    accounts
        .ensure_admin(TEST_ADMIN_EMAIL, TEST_PASSWORD)
        .await
        .expect("Failed to create test admin");
    accounts
        .authenticate(TEST_ADMIN_EMAIL, TEST_PASSWORD)
        .await
        .expect("Failed to log in test admin")
}

enum StubOutcome {
    Succeed(String),
    Fail(fn() -> GenerationError),
}

/// In-process generation provider with a fixed outcome that counts its calls.
pub struct StubGenerator {
    outcome: StubOutcome,
    calls: AtomicUsize,
    drain: Mutex<Option<(Arc<dyn Store>, UserId)>>,
}

impl StubGenerator {
    pub fn succeeding(url: &str) -> Self {
        Self::new(StubOutcome::Succeed(url.to_string()))
    }

    pub fn failing(error: fn() -> GenerationError) -> Self {
        Self::new(StubOutcome::Fail(error))
    }

    fn new(outcome: StubOutcome) -> Self {
        Self {
            outcome,
            calls: AtomicUsize::new(0),
            drain: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// On the next call, spend the user's entire balance before answering.
    pub fn drain_balance_on_call(&self, store: Arc<dyn Store>, user_id: UserId) {
        *self.drain.lock().expect("stub lock poisoned") = Some((store, user_id));
    }
}

#[async_trait::async_trait]
impl GenerationProvider for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let drain = self.drain.lock().expect("stub lock poisoned").take();
        if let Some((store, user_id)) = drain {
            let user = store.get_user(user_id).await.expect("store error").expect("user exists");
            if user.balance > 0 {
                store.debit(user_id, user.balance, "concurrent spend").await.expect("store error");
            }
        }

        match &self.outcome {
            StubOutcome::Succeed(url) => Ok(GenerationOutput {
                prompt: request.prompt.clone(),
                image_urls: vec![url.clone()],
            }),
            StubOutcome::Fail(error) => Err(error()),
        }
    }
}
