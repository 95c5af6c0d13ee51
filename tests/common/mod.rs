//! Shared fixtures for the integration tests: a recording HTTP stub and a
//! fully wired engine over an in-memory catalog and credential store.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;

use toolrunner::catalog::{CatalogFile, MemoryCatalog, PrefixObjectStorage};
use toolrunner::config::EngineConfig;
use toolrunner::contract::{
    AuthorizationCodeConfig, OAuthAuth, Operation, ParameterSpec, PluginAuth, PluginInfo, Schema,
    ToolContract,
};
use toolrunner::oauth::{OAuthService, TokenCipher, TokenClient};
use toolrunner::state::{Database, SqliteCredentialStore};
use toolrunner::types::ParamLocation;
use toolrunner::ToolEngine;

pub const STATE_SECRET: &str = "state-secret-0123456789abcdefghi";
pub const TOKEN_SECRET: &str = "token-secret-0123456789abcdefghi";

// ---------------------------------------------------------------------------
// Stub server
// ---------------------------------------------------------------------------

/// One request seen by a [`StubServer`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone)]
struct StubState {
    hits: Arc<Mutex<Vec<Recorded>>>,
    reply: Arc<Mutex<(u16, String)>>,
}

/// Answers every request with one configurable JSON reply and records it.
#[derive(Clone)]
pub struct StubServer {
    pub base_url: String,
    state: StubState,
}

impl StubServer {
    pub async fn start(status: u16, body: &str) -> Self {
        let state = StubState {
            hits: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(Mutex::new((status, body.to_string()))),
        };
        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn set_reply(&self, status: u16, body: &str) {
        *self.state.reply.lock().unwrap() = (status, body.to_string());
    }

    pub fn hits(&self) -> Vec<Recorded> {
        self.state.hits.lock().unwrap().clone()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn record(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.hits.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: body.to_vec(),
    });
    let (status, body) = state.reply.lock().unwrap().clone();
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

pub fn plugin(id: i64, server_url: &str, auth: PluginAuth) -> PluginInfo {
    PluginInfo {
        id,
        name: "weather".into(),
        version: None,
        server_url: server_url.to_string(),
        auth,
        common_params: Default::default(),
    }
}

pub fn oauth_config(idp: &StubServer) -> AuthorizationCodeConfig {
    AuthorizationCodeConfig {
        client_id: "client-1".into(),
        client_secret: "secret-1".into(),
        authorization_url: idp.url("/authorize"),
        token_url: idp.url("/token"),
        scope: "weather.read".into(),
        content_type: "application/json".into(),
    }
}

pub fn oauth_auth(idp: &StubServer) -> PluginAuth {
    PluginAuth::OAuth(OAuthAuth::AuthorizationCode(oauth_config(idp)))
}

/// `GET /weather?city={city}` with `city` required and a
/// `{temp: number, city: string}` response.
pub fn weather_tool(id: i64, plugin_id: i64) -> ToolContract {
    let mut operation = Operation {
        parameters: vec![
            ParameterSpec::new("city", ParamLocation::Query, Schema::string()).required(),
            ParameterSpec::new("units", ParamLocation::Query, Schema::string()),
        ],
        ..Default::default()
    };
    operation.set_response_schema(Schema::object([
        ("temp", Schema::number()),
        ("city", Schema::string()),
    ]));
    ToolContract {
        id,
        plugin_id,
        name: "get_weather".into(),
        version: None,
        method: "get".into(),
        sub_url: "/weather".into(),
        activated: true,
        operation,
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub fn config() -> EngineConfig {
    let mut config = EngineConfig {
        server_host: "tools.test".into(),
        state_secret: STATE_SECRET.into(),
        token_secret: TOKEN_SECRET.into(),
        ..EngineConfig::default()
    };
    config.oauth.retry_delay_ms = 10;
    config
}

pub fn credential_store() -> Arc<SqliteCredentialStore> {
    let db = Database::open_memory().unwrap();
    let cipher = TokenCipher::new(TOKEN_SECRET).unwrap();
    Arc::new(SqliteCredentialStore::new(
        Arc::new(tokio::sync::Mutex::new(db)),
        cipher,
    ))
}

pub struct Harness {
    pub catalog: Arc<MemoryCatalog>,
    pub store: Arc<SqliteCredentialStore>,
    pub oauth: Arc<OAuthService>,
    pub engine: ToolEngine,
}

pub fn harness(file: CatalogFile) -> Harness {
    let catalog = Arc::new(MemoryCatalog::new(file));
    let store = credential_store();
    let http = reqwest::Client::new();
    let oauth = Arc::new(
        OAuthService::new(
            &config(),
            catalog.clone(),
            store.clone(),
            TokenClient::new(http.clone()),
        )
        .unwrap(),
    );
    let engine = ToolEngine::new(
        catalog.clone(),
        catalog.clone(),
        Arc::new(PrefixObjectStorage::new("https://cdn.test/objects")),
        oauth.clone(),
        http,
    );
    Harness {
        catalog,
        store,
        oauth,
        engine,
    }
}
