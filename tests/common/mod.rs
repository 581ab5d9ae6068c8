#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Request, Response},
    Router,
};
use pairgate::{
    embed::{ActivePath, AuthMethods, ComponentKind, Destinations, EmbedConfig, RoutingRule},
    identity::{password::hash_password, Identity},
    store::InMemoryStore,
    Backends, Engine, EngineConfig, Providers,
};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const PUBLIC_URL: &str = "https://pair.example.com";
pub const SERVER_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const SHOP_ORIGIN: &str = "https://shop.example.com";

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let config = EngineConfig::new(
            PUBLIC_URL.to_string(),
            SecretString::from(SERVER_SECRET.to_string()),
        )
        .with_heartbeat_seconds(10);
        let engine = Arc::new(Engine::new(
            config,
            Backends::in_memory(store.clone()),
            Providers::default(),
        ));
        Self {
            router: pairgate::api::router(engine),
            store,
        }
    }

    /// Register an auth embed with every method enabled.
    pub fn embed(&self, signing_secret: Option<&str>) -> EmbedConfig {
        let embed = EmbedConfig {
            id: Uuid::new_v4(),
            template_token: format!("tpl-{}", Uuid::new_v4()),
            component: ComponentKind::QrAuth,
            methods: AuthMethods {
                qr: true,
                phone_otp: true,
                email_otp: true,
                password: true,
                google: true,
                github: true,
            },
            destinations: Destinations {
                success_url_a: Some("/dashboard".to_string()),
                success_url_b: Some("/welcome".to_string()),
                active_path: ActivePath::A,
                routing_rule: RoutingRule::None,
            },
            signing_secret: signing_secret.map(|secret| SecretString::from(secret.to_string())),
            role: None,
            active: true,
        };
        self.store.insert_embed(embed.clone());
        embed
    }

    pub fn identity(&self, email: &str, password: &str, role: Option<&str>) -> Result<Identity> {
        let identity = Identity {
            id: Uuid::new_v4(),
            external_id: email.to_string(),
            email: Some(email.to_string()),
            name: None,
            password_hash: Some(hash_password(password)?),
            role: role.map(str::to_string),
            created_at: chrono::Utc::now(),
        };
        self.store.insert_identity(identity.clone());
        Ok(identity)
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn get(&self, uri: &str) -> Result<(u16, Value)> {
        let response = self
            .send(Request::builder().method("GET").uri(uri).body(Body::empty())?)
            .await?;
        json_of(response).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> Result<(u16, Value)> {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(body)?))?,
            )
            .await?;
        json_of(response).await
    }
}

pub async fn json_of(response: Response<Body>) -> Result<(u16, Value)> {
    let status = response.status().as_u16();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}
