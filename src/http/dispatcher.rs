use super::{ApiClientOptions, ApiResponse, RequestOptions};
use crate::auth::{CredentialPair, CredentialStore};
use crate::infrastructure::BackoffPolicy;
use crate::types::{LOGIN_PATH, LOGOUT_PATH, LinkError, RENEWAL_PATH, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// HTTP client for the Genesis API.
///
/// Every call gets the current access token as a bearer header, is renewed and re-issued
/// once if the server answers `401`, and is retried with exponential backoff when the
/// request never got a response (connect failure, timeout). Anything else, including
/// `5xx`, comes back to the caller as [`LinkError::Http`].
///
/// Clones share the connection pool and the credential store.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    max_retries: u32,
    retry: BackoffPolicy,
    credentials: CredentialStore,
}

/// Per-call bookkeeping, dropped when the call returns
#[derive(Debug, Default)]
struct CallContext {
    renewal_attempted: bool,
    retries: u32,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] or [`LinkError::UrlParse`] for invalid options, and
    /// [`LinkError::Request`] if the HTTP client cannot be built.
    pub fn new(options: ApiClientOptions, credentials: CredentialStore) -> Result<Self> {
        options.validate()?;
        let http = reqwest::Client::builder()
            .timeout(options.timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: options.base_url()?,
            max_retries: options.max_retries(),
            retry: options.retry_policy(),
            credentials,
        })
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::GET, path, None, options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::POST, path, body, options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::PUT, path, body, options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::PATCH, path, body, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        self.request(Method::DELETE, path, None, options).await
    }

    /// Issues one logical call, renewing and retrying as needed.
    ///
    /// # Errors
    ///
    /// - [`LinkError::RenewalExhausted`] if the call is rejected again after a renewal
    /// - [`LinkError::NoRenewalCredential`] / [`LinkError::Authentication`] if renewal
    ///   itself fails; the credential store is cleared first
    /// - [`LinkError::TransientRequest`] once `max_retries` retries have failed
    /// - [`LinkError::Http`] for any other non-success status
    /// - [`LinkError::Cancelled`] if the caller's token fires first
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>> {
        let url = self.url_for(path)?;
        let cancel = options.cancel.clone().unwrap_or_default();
        let mut ctx = CallContext::default();

        loop {
            if cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }

            // Token read and header attach happen together, with no await between them.
            let request = self.build_request(&method, &url, body.as_ref(), &options);
            let started = Instant::now();

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                sent = request.send() => sent,
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) if is_transient(&e) => {
                    self.wait_before_retry(&mut ctx, &method, &url, e, &cancel)
                        .await?;
                    continue;
                }
                Err(e) => {
                    tracing::error!(method = %method, path, "Request failed: {}", e);
                    return Err(e.into());
                }
            };

            let status = response.status();
            tracing::debug!(
                method = %method,
                path,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request completed"
            );

            if status == StatusCode::UNAUTHORIZED {
                if ctx.renewal_attempted {
                    tracing::warn!(method = %method, path, "Rejected again after renewal");
                    return Err(LinkError::RenewalExhausted);
                }
                ctx.renewal_attempted = true;

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                    renewed = self.renew() => { renewed?; }
                }
                tracing::info!(method = %method, path, "Credentials renewed, re-issuing request");
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(method = %method, path, status = status.as_u16(), "Request rejected");
                return Err(LinkError::Http {
                    status: status.as_u16(),
                    body,
                });
            }

            let text = response.text().await?;
            return match serde_json::from_str(&text) {
                Ok(body) => Ok(body),
                Err(e) => {
                    tracing::warn!(
                        method = %method,
                        path,
                        status = status.as_u16(),
                        "Malformed response body: {}",
                        e
                    );
                    Err(e.into())
                }
            };
        }
    }

    /// Exchanges the renewal token for a fresh pair and stores it.
    ///
    /// Any failure clears the store before it is returned.
    pub async fn renew(&self) -> Result<CredentialPair> {
        match self.exchange_renewal_token().await {
            Ok(pair) => {
                self.credentials.store(pair.clone())?;
                tracing::info!("Access token renewed");
                Ok(pair)
            }
            Err(e) => {
                tracing::error!("Credential renewal failed: {}", e);
                if let Err(clear_err) = self.credentials.clear() {
                    tracing::error!("Failed to clear credentials: {}", clear_err);
                }
                Err(e)
            }
        }
    }

    /// Signs in and stores the returned pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<ApiResponse<CredentialPair>> {
        let body = json!({ "email": email, "password": password });
        let response: ApiResponse<CredentialPair> = self
            .post(LOGIN_PATH, Some(body), RequestOptions::default())
            .await?;

        match response.data.as_ref() {
            Some(pair) if response.success && pair.access_token.is_some() => {
                self.credentials.store(pair.clone())?;
                tracing::info!("Signed in");
            }
            _ => tracing::warn!("Login response carried no credentials"),
        }
        Ok(response)
    }

    /// Signs out remotely, then forgets the local pair.
    pub async fn logout(&self) -> Result<ApiResponse<Value>> {
        let response = self.post(LOGOUT_PATH, None, RequestOptions::default()).await?;
        self.credentials.clear()?;
        Ok(response)
    }

    async fn exchange_renewal_token(&self) -> Result<CredentialPair> {
        let Some(renewal_token) = self.credentials.renewal_token() else {
            return Err(LinkError::NoRenewalCredential);
        };

        let url = self.url_for(RENEWAL_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "refresh_token": renewal_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::authentication(format!(
                "renewal rejected with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let mut pair: CredentialPair = response.json().await?;
        if pair.access_token.is_none() {
            return Err(LinkError::authentication(
                "renewal response carried no access token",
            ));
        }
        // Servers that do not rotate the renewal token omit it.
        if pair.renewal_token.is_none() {
            pair.renewal_token = Some(renewal_token);
        }
        Ok(pair)
    }

    async fn wait_before_retry(
        &self,
        ctx: &mut CallContext,
        method: &Method,
        url: &Url,
        error: reqwest::Error,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if ctx.retries >= self.max_retries {
            tracing::error!(
                method = %method,
                path = url.path(),
                attempts = ctx.retries + 1,
                "Request failed, retries exhausted: {}",
                error
            );
            return Err(LinkError::TransientRequest {
                attempts: ctx.retries + 1,
                source: error,
            });
        }

        ctx.retries += 1;
        let delay = self.retry.delay_for_attempt(ctx.retries);
        tracing::warn!(
            method = %method,
            path = url.path(),
            attempt = ctx.retries,
            max = self.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after transient error"
        );

        tokio::select! {
            _ = cancel.cancelled() => Err(LinkError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn build_request(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> RequestBuilder {
        let mut request = self.http.request(method.clone(), url.clone());

        if let Some(token) = self.credentials.access_token() {
            request = request.bearer_auth(token);
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
    }

    /// Absolute URLs pass through; anything else is appended to the base address.
    fn url_for(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }
}

/// The request never produced a response: worth trying again.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
}
