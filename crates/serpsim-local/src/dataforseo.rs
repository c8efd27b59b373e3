use crate::extract::parse_document;
use std::collections::BTreeMap;
use std::time::Instant;
use serpsim_core::{Credentials, Error, Query, RawResponse, RequestShape, Result, SerpProvider};

pub const DEFAULT_ENDPOINT: &str = "https://api.dataforseo.com/v3/serp/google/organic/live/advanced";

fn env_nonempty(k: &str) -> Option<String> {
    std::env::var(k)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn login_from_env() -> Option<String> {
    env_nonempty("SERPSIM_DATAFORSEO_LOGIN").or_else(|| env_nonempty("DATAFORSEO_LOGIN"))
}

pub fn password_from_env() -> Option<String> {
    env_nonempty("SERPSIM_DATAFORSEO_PASSWORD").or_else(|| env_nonempty("DATAFORSEO_PASSWORD"))
}

pub fn endpoint_from_env() -> Option<String> {
    env_nonempty("SERPSIM_DATAFORSEO_ENDPOINT")
}

pub fn credentials_configured() -> bool {
    login_from_env().is_some() && password_from_env().is_some()
}

pub fn credentials_from_env() -> Result<Credentials> {
    let login = login_from_env().ok_or_else(|| {
        Error::NotConfigured(
            "missing SERPSIM_DATAFORSEO_LOGIN (or DATAFORSEO_LOGIN)".to_string(),
        )
    })?;
    let password = password_from_env().ok_or_else(|| {
        Error::NotConfigured(
            "missing SERPSIM_DATAFORSEO_PASSWORD (or DATAFORSEO_PASSWORD)".to_string(),
        )
    })?;
    Ok(Credentials::new(login, password))
}

#[derive(Debug, Clone)]
pub struct DataForSeoProvider {
    client: reqwest::Client,
    credentials: Credentials,
    endpoint: String,
    timeout_ms: u64,
}

impl DataForSeoProvider {
    pub fn new(client: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
            endpoint: endpoint_from_env().unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout_ms: 60_000,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        Ok(Self::new(client, credentials_from_env()?))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        // Live SERP calls can take tens of seconds; keep a floor so tiny values don't break runs.
        self.timeout_ms = timeout_ms.clamp(1_000, 600_000);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body for one POST.
///
/// Single-task requests carry one bare task object; multi-task requests carry a list.
pub fn request_body(queries: &[Query], shape: RequestShape) -> Result<serde_json::Value> {
    match shape {
        RequestShape::SingleTask => match queries {
            [q] => Ok(q.to_task()),
            _ => Err(Error::InvalidConfig(format!(
                "single-task request needs exactly one query, got {}",
                queries.len()
            ))),
        },
        RequestShape::MultiTask => Ok(serde_json::Value::Array(
            queries.iter().map(Query::to_task).collect(),
        )),
    }
}

#[async_trait::async_trait]
impl SerpProvider for DataForSeoProvider {
    fn name(&self) -> &'static str {
        "dataforseo"
    }

    async fn post(&self, queries: &[Query], shape: RequestShape) -> Result<RawResponse> {
        let t0 = Instant::now();
        let body = request_body(queries, shape)?;
        let bytes = serde_json::to_vec(&body).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let resp = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                self.credentials.authorization_header(),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(bytes)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| Error::NetworkFailure(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkFailure(format!("dataforseo HTTP {status}")));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::NetworkFailure(e.to_string()))?;
        let document = parse_document(&body)?;

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("post".to_string(), t0.elapsed().as_millis());

        Ok(RawResponse {
            document,
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::HeaderMap, http::StatusCode, routing::post, Router};
    use serpsim_core::{Location, SearchTarget};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn query(kw: &str) -> Query {
        Query::new(kw, Location::Code(2840), &SearchTarget::default())
    }

    fn provider(addr: SocketAddr) -> DataForSeoProvider {
        DataForSeoProvider::new(reqwest::Client::new(), Credentials::new("me@example.com", "pw"))
            .with_endpoint(format!("http://{addr}/v3/serp"))
    }

    #[test]
    fn empty_credentials_are_treated_as_missing() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::set("SERPSIM_DATAFORSEO_LOGIN", "");
        let _g2 = EnvGuard::set("DATAFORSEO_LOGIN", "   ");
        let _g3 = EnvGuard::set("SERPSIM_DATAFORSEO_PASSWORD", "pw");
        assert!(!credentials_configured());
        let err = credentials_from_env().unwrap_err();
        assert_eq!(err.code(), "not_configured");
    }

    #[test]
    fn fallback_env_names_are_accepted() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _g1 = EnvGuard::set("SERPSIM_DATAFORSEO_LOGIN", "");
        let _g2 = EnvGuard::set("DATAFORSEO_LOGIN", "me@example.com");
        let _g3 = EnvGuard::set("SERPSIM_DATAFORSEO_PASSWORD", "");
        let _g4 = EnvGuard::set("DATAFORSEO_PASSWORD", "pw");
        let c = credentials_from_env().unwrap();
        assert_eq!(c.login, "me@example.com");
        assert_eq!(c.password, "pw");
    }

    #[test]
    fn request_body_shapes() {
        let single = request_body(&[query("bora bora")], RequestShape::SingleTask).unwrap();
        assert_eq!(single["keyword"].as_str(), Some("bora bora"));

        let multi =
            request_body(&[query("a"), query("a")], RequestShape::MultiTask).unwrap();
        assert_eq!(multi.as_array().map(|a| a.len()), Some(2));

        assert!(request_body(&[query("a"), query("b")], RequestShape::SingleTask).is_err());
    }

    #[tokio::test]
    async fn posts_with_basic_auth_and_json_body() {
        let seen: Arc<Mutex<Vec<(String, String, serde_json::Value)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().route(
            "/v3/serp",
            post({
                let seen = seen.clone();
                move |headers: HeaderMap, body: String| {
                    let seen = seen.clone();
                    async move {
                        let auth = headers
                            .get(header::AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let ct = headers
                            .get(header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let v: serde_json::Value =
                            serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
                        seen.lock().unwrap().push((auth, ct, v));
                        (
                            [(header::CONTENT_TYPE, "application/json")],
                            r#"{"tasks":[{"result":[{"answer_box":"hi"}]}]}"#,
                        )
                    }
                }
            }),
        );
        let addr = serve(app).await;

        let r = provider(addr)
            .post(&[query("bora bora")], RequestShape::SingleTask)
            .await
            .unwrap();
        assert!(r.document["tasks"].is_array());
        assert!(r.timings_ms.contains_key("post"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (auth, ct, body) = &seen[0];
        assert_eq!(auth, &Credentials::new("me@example.com", "pw").authorization_header());
        assert_eq!(ct, "application/json");
        assert_eq!(body["keyword"].as_str(), Some("bora bora"));
        assert_eq!(body["location_code"].as_u64(), Some(2840));
    }

    #[tokio::test]
    async fn non_2xx_is_network_failure() {
        let app = Router::new().route(
            "/v3/serp",
            post(|| async { (StatusCode::PAYMENT_REQUIRED, "out of credits") }),
        );
        let addr = serve(app).await;
        let err = provider(addr)
            .post(&[query("x")], RequestShape::SingleTask)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "network_failure");
        assert!(err.to_string().contains("402"), "err={err}");
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let app = Router::new().route("/v3/serp", post(|| async { "<html>oops</html>" }));
        let addr = serve(app).await;
        let err = provider(addr)
            .post(&[query("x")], RequestShape::SingleTask)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "malformed_response");
    }

    #[tokio::test]
    async fn connection_refused_is_network_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = provider(addr)
            .post(&[query("x")], RequestShape::SingleTask)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "network_failure");
    }
}
