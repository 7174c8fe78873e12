//! Authenticated transport for the inventory backend.
//!
//! Every business request runs through an ordered pair of passes: attach the
//! session headers, then a one-shot re-login-and-replay on 401. The login
//! endpoint never goes through the pipeline — that structural exclusion is
//! the recursion guard that bounds the replay to at most once per request.
//!
//! Callers may drop an in-flight future to cancel a request; nothing is
//! rolled back server-side, so the sync driver re-reads pending state after
//! a cancelled attempt instead of assuming the submission failed.

use crate::secrets::Credentials;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub mod model;

use model::{Empresa, LocationHint, LoginResp, PickOrderReq, RelocateLine, RemoteOrder, StowLine};

const LOGIN_PATH: &str = "Login/Plano";
const EMPRESAS_PATH: &str = "Empresa/Get";
const ESTIBAR_PATH: &str = "UB090/EstibarPartidas";
const UBICACIONES_ESTIBAR_PATH: &str = "UB090/UbicacionesParaEstibar";
const REUBICAR_PATH: &str = "UB091/ReubicarPartidas";
const UBICACIONES_RECOLECTAR_PATH: &str = "UB082/UbicacionesParaRecolectar";
const RECOLECTAR_PATH: &str = "UB082/RecolectarPedido";
const LANZADAS_PATH: &str = "PP090/Lanzadas";

const TENANT_HEADER: &str = "x-empresa";
const USER_HEADER: &str = "usuario";
const PASS_HEADER: &str = "password";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The login endpoint itself rejected the credentials.
    #[error("login rejected ({status}): {body}")]
    AuthFailed { status: StatusCode, body: String },
    /// A business endpoint returned 401 and the one-shot re-login could not
    /// recover (no remembered credentials, or the re-login failed too).
    #[error("session expired and re-login did not recover")]
    AuthExpired,
    /// Non-401 error status from a business endpoint. Not retried; the
    /// server's payload is carried for the operator.
    #[error("server rejected request ({status}): {body}")]
    ServerRejected { status: StatusCode, body: String },
    /// Connectivity or timeout. Distinct from a 401; not retried here.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    #[error("invalid response payload: {0}")]
    InvalidResponse(String),
}

/// Backend operations the sync driver depends on, kept behind a trait so
/// tests can script responses.
#[async_trait]
pub trait BackendService: Send + Sync {
    async fn recolectar(&self, req: &PickOrderReq) -> Result<(), ApiError>;
    async fn estibar(&self, lines: &[StowLine]) -> Result<(), ApiError>;
    async fn reubicar(&self, lines: &[RelocateLine]) -> Result<(), ApiError>;
    async fn lanzadas(&self) -> Result<Vec<RemoteOrder>, ApiError>;
}

/// HTTP client for the inventory backend.
///
/// A constructed value holding its dependencies explicitly — credentials,
/// base URL, timeouts — shared by cloning the `Arc`s it contains, never
/// through global state.
pub struct ApiClient {
    http: Client,
    base_url: Url,
    creds: Arc<Credentials>,
    /// Single-flight latch for re-login: concurrent 401s queue here and the
    /// token generation check lets late arrivals reuse the fresh token.
    relogin: tokio::sync::Mutex<()>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: Url, creds: Arc<Credentials>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, creds, Duration::from_secs(60))
    }

    pub fn with_timeout(
        base_url: Url,
        creds: Arc<Credentials>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent("bodega-sync/0.1")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url,
            creds,
            relogin: tokio::sync::Mutex::new(()),
        })
    }

    pub fn from_config(cfg: &Config, creds: Arc<Credentials>) -> Result<Self, ApiError> {
        let base_url = Url::parse(&cfg.api.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", cfg.api.base_url)))?;
        Self::with_timeout(
            base_url,
            creds,
            Duration::from_secs(cfg.api.timeout_seconds),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Attach passes, applied in order to every business request. A pass
    /// with nothing to attach is a no-op; a missing token or tenant is not
    /// an error at this layer.
    async fn run_attach_pipeline(&self, req: &mut Request) {
        self.attach_bearer(req).await;
        self.attach_tenant(req).await;
    }

    async fn attach_bearer(&self, req: &mut Request) {
        if let Some(token) = self.creds.token().await {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    req.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(err) => warn!(?err, "session token is not a valid header value"),
            }
        }
    }

    async fn attach_tenant(&self, req: &mut Request) {
        if let Some(tenant) = self.creds.tenant().await {
            match HeaderValue::from_str(&tenant) {
                Ok(value) => {
                    req.headers_mut().insert(TENANT_HEADER, value);
                }
                Err(err) => warn!(?err, "tenant id is not a valid header value"),
            }
        }
    }

    /// Send a business request through the pipeline.
    ///
    /// On 401 the original response is dropped, one silent re-login is
    /// attempted behind the single-flight latch, and the original request is
    /// rebuilt (same method, path and body; only the session headers differ)
    /// and sent exactly once more.
    async fn execute(&self, req: Request) -> Result<Response, ApiError> {
        let generation = self.creds.token_generation();
        let replay = req.try_clone();
        let mut req = req;
        self.run_attach_pipeline(&mut req).await;

        let resp = self.http.execute(req).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }
        drop(resp);

        let Some(mut retry) = replay else {
            // Streaming bodies cannot be replayed; surface the 401.
            return Err(ApiError::AuthExpired);
        };
        self.relogin_once(generation).await?;
        self.run_attach_pipeline(&mut retry).await;
        let resp = self.http.execute(retry).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::AuthExpired);
        }
        Ok(resp)
    }

    /// Re-login with remembered credentials, at most one attempt in flight.
    ///
    /// A caller whose token generation already advanced while it waited on
    /// the latch skips the login: someone else refreshed the session.
    async fn relogin_once(&self, seen_generation: u64) -> Result<(), ApiError> {
        let _latch = self.relogin.lock().await;
        if self.creds.token_generation() != seen_generation {
            debug!("token already refreshed by a concurrent request");
            return Ok(());
        }
        let Some((user, pass)) = self.creds.remembered_login().await else {
            return Err(ApiError::AuthExpired);
        };
        match self.login(&user, &pass).await {
            Ok(_) => {
                info!("silent re-login succeeded");
                Ok(())
            }
            Err(ApiError::Transport(err)) => Err(ApiError::Transport(err)),
            Err(err) => {
                warn!(?err, "silent re-login failed");
                Err(ApiError::AuthExpired)
            }
        }
    }

    /// `POST /Login/Plano` with credentials in headers. Deliberately bypasses
    /// the pipeline: no session headers are attached and a 401 here is
    /// terminal, never re-entered.
    pub async fn login(&self, user: &str, pass: &str) -> Result<String, ApiError> {
        let url = self.endpoint(LOGIN_PATH)?;
        let resp = self
            .http
            .post(url)
            .header(USER_HEADER, user)
            .header(PASS_HEADER, pass)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::AuthFailed { status, body });
        }
        let payload: LoginResp = resp
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.creds.set_token(&payload.token).await;
        Ok(payload.token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let req = self.http.get(url).query(query).build()?;
        let resp = self.execute(req).await?;
        Self::decode(resp).await
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<Response, ApiError> {
        let url = self.endpoint(path)?;
        let req = self.http.post(url).json(body).build()?;
        let resp = self.execute(req).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::ServerRejected { status, body });
        }
        Ok(resp)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::ServerRejected { status, body });
        }
        resp.json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// Tenants the logged-in operator may select.
    pub async fn empresas(&self) -> Result<Vec<Empresa>, ApiError> {
        self.get_json(EMPRESAS_PATH, &[]).await
    }

    /// Open orders from the backend.
    pub async fn lanzadas(&self) -> Result<Vec<RemoteOrder>, ApiError> {
        self.get_json(LANZADAS_PATH, &[]).await
    }

    pub async fn ubicaciones_para_estibar(
        &self,
        lot: &str,
    ) -> Result<Vec<LocationHint>, ApiError> {
        self.get_json(UBICACIONES_ESTIBAR_PATH, &[("partida", lot.to_string())])
            .await
    }

    pub async fn ubicaciones_para_recolectar(
        &self,
        order_id: i64,
    ) -> Result<Vec<LocationHint>, ApiError> {
        self.get_json(
            UBICACIONES_RECOLECTAR_PATH,
            &[("pedido", order_id.to_string())],
        )
        .await
    }

    pub async fn recolectar(&self, req: &PickOrderReq) -> Result<(), ApiError> {
        self.post_json(RECOLECTAR_PATH, req).await?;
        Ok(())
    }

    pub async fn estibar(&self, lines: &[StowLine]) -> Result<(), ApiError> {
        self.post_json(ESTIBAR_PATH, &lines).await?;
        Ok(())
    }

    pub async fn reubicar(&self, lines: &[RelocateLine]) -> Result<(), ApiError> {
        self.post_json(REUBICAR_PATH, &lines).await?;
        Ok(())
    }
}

#[async_trait]
impl BackendService for ApiClient {
    async fn recolectar(&self, req: &PickOrderReq) -> Result<(), ApiError> {
        ApiClient::recolectar(self, req).await
    }

    async fn estibar(&self, lines: &[StowLine]) -> Result<(), ApiError> {
        ApiClient::estibar(self, lines).await
    }

    async fn reubicar(&self, lines: &[RelocateLine]) -> Result<(), ApiError> {
        ApiClient::reubicar(self, lines).await
    }

    async fn lanzadas(&self) -> Result<Vec<RemoteOrder>, ApiError> {
        ApiClient::lanzadas(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemorySecrets;

    fn client_with_creds() -> (ApiClient, Arc<Credentials>) {
        let creds = Arc::new(Credentials::new(Box::<MemorySecrets>::default()));
        let client = ApiClient::new(
            Url::parse("https://inventario.example.com/api/").unwrap(),
            creds.clone(),
        )
        .unwrap();
        (client, creds)
    }

    #[tokio::test]
    async fn attach_pipeline_sets_session_headers() {
        let (client, creds) = client_with_creds();
        creds.set_token("tok-1").await;
        creds.set_tenant("EMP1").await;

        let mut req = client
            .http
            .get(client.endpoint(LANZADAS_PATH).unwrap())
            .build()
            .unwrap();
        client.run_attach_pipeline(&mut req).await;

        assert_eq!(
            req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer tok-1"
        );
        assert_eq!(
            req.headers().get(TENANT_HEADER).unwrap().to_str().unwrap(),
            "EMP1"
        );
    }

    #[tokio::test]
    async fn attach_pipeline_is_noop_without_session() {
        let (client, _creds) = client_with_creds();
        let mut req = client
            .http
            .get(client.endpoint(EMPRESAS_PATH).unwrap())
            .build()
            .unwrap();
        client.run_attach_pipeline(&mut req).await;
        assert!(req.headers().get(AUTHORIZATION).is_none());
        assert!(req.headers().get(TENANT_HEADER).is_none());
    }

    #[test]
    fn endpoints_join_base_url() {
        let (client, _creds) = client_with_creds();
        assert_eq!(
            client.endpoint(RECOLECTAR_PATH).unwrap().as_str(),
            "https://inventario.example.com/api/UB082/RecolectarPedido"
        );
        assert_eq!(
            client.endpoint(LOGIN_PATH).unwrap().as_str(),
            "https://inventario.example.com/api/Login/Plano"
        );
    }
}
