use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use unioncase::auth::jwt::JwtService;
use unioncase::auth::password::hash_password;
use unioncase::config::AppConfig;
use unioncase::db::{self, PgPool};
use unioncase::models::NewUser;
use unioncase::notify::{EmailMessage, NotificationDispatch};
use unioncase::routes;
use unioncase::state::AppState;
use unioncase::subscription::{trial_window, SubscriptionStatus};
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct SentEmail {
    pub kind: String,
    pub recipient: String,
    pub subject: String,
}

/// In-memory stand-in for the SMTP transport. Can be switched into a failing
/// mode to exercise the sweep retry path.
#[derive(Default)]
pub struct FakeDispatch {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

#[async_trait]
impl NotificationDispatch for FakeDispatch {
    async fn send(&self, kind: &str, recipient: &str, message: &EmailMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("simulated dispatch failure");
        }
        let mut guard = self.sent.lock().await;
        guard.push(SentEmail {
            kind: kind.to_string(),
            recipient: recipient.to_string(),
            subject: message.subject.clone(),
        });
        Ok(())
    }
}

#[allow(dead_code)]
impl FakeDispatch {
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn count_of_kind(&self, kind: &str) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|email| email.kind == kind)
            .count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    dispatch: Arc<FakeDispatch>,
    _uploads: tempfile::TempDir,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Result<Self> {
        Self::with_trial_facilities(&["*"]).await
    }

    pub async fn with_trial_facilities(facilities: &[&str]) -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let uploads = tempfile::tempdir().context("failed to create uploads tempdir")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            uploads_dir: uploads.path().to_string_lossy().into_owned(),
            max_upload_bytes: 1024 * 1024,
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            smtp_from: "noreply@unioncase.test".to_string(),
            support_email: "support@unioncase.test".to_string(),
            support_phone: "555-0100".to_string(),
            client_url: None,
            trial_facilities: facilities.iter().map(|f| f.to_string()).collect(),
            sweep_times: Vec::new(),
            sweep_interval_secs: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let dispatch = Arc::new(FakeDispatch::default());
        let dispatch_for_state: Arc<dyn NotificationDispatch> = dispatch.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool.clone(), config, dispatch_for_state, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            dispatch,
            _uploads: uploads,
        })
    }

    pub fn dispatch(&self) -> Arc<FakeDispatch> {
        self.dispatch.clone()
    }

    /// Direct insert bypassing registration, for tests that need precise
    /// control over the subscription columns.
    pub async fn insert_user_with_subscription(
        &self,
        email: &str,
        password: &str,
        role: &str,
        status: SubscriptionStatus,
        trial_days_from_now: Option<i64>,
    ) -> Result<Uuid> {
        let email = email.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let now = Utc::now().naive_utc();
            let (trial_starts_at, trial_ends_at) = match trial_days_from_now {
                Some(days) => {
                    let (starts, _) = trial_window(now);
                    (Some(starts), Some(now + Duration::days(days)))
                }
                None => (None, None),
            };
            let user = NewUser {
                id: Uuid::new_v4(),
                email: email.clone(),
                password_hash: hash_password(&password)?,
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                employee_id: format!("E{:.15}", Uuid::new_v4().simple().to_string()),
                role,
                facility: "Main Post Office".to_string(),
                craft: "city_carrier".to_string(),
                phone: None,
                subscription_status: status.as_str().to_string(),
                trial_starts_at,
                trial_ends_at,
            };
            diesel::insert_into(unioncase::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn insert_user(&self, email: &str, password: &str, role: &str) -> Result<Uuid> {
        self.insert_user_with_subscription(email, password, role, SubscriptionStatus::Active, None)
            .await
    }

    pub async fn login_token(&self, email: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json("/api/auth/login", &LoginPayload { email, password }, None)
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.token)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn upload_document(
        &self,
        grievance_id: Uuid,
        filename: &str,
        content_type: &str,
        data: &[u8],
        label: Option<&str>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        if let Some(label) = label {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"label\"\r\n\r\n");
            body.extend(label.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/documents/{grievance_id}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"));

        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE sent_notifications, notifications, documents, notes, deadlines, \
         grievance_timeline, grievances, grievance_counters, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
