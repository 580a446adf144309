use crate::{
    client::{ImageStreamProvisioner, MetadataClient},
    errors::{StatusError, TransportError},
    image::ContentDigest,
    metadata::{
        Image, ImageStream, ImageStreamLayers, ImageStreamMapping, LimitRangeList, SecretList,
    },
};
use async_trait::async_trait;
use http::header::HeaderValue;
use reqwest::{header::HeaderMap, Certificate};
use serde::{de::DeserializeOwned, Serialize};
use std::{convert::TryInto, env, fs, path::Path, time::Duration};
use url::Url;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Builder for configuring custom [RestClient] instances
#[derive(Debug)]
pub struct RestClientBuilder {
    req: reqwest::ClientBuilder,
    base_url: Option<Url>,
    bearer_token: Option<String>,
}

impl RestClientBuilder {
    /// Start constructing a custom metadata service client
    pub fn new() -> Self {
        let req = reqwest::Client::builder().user_agent(RestClient::default_user_agent());
        RestClientBuilder {
            req,
            base_url: None,
            bearer_token: None,
        }
    }

    /// Address of the metadata service API server, e.g. `https://api.example:6443`
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Authenticate every request with this bearer token
    ///
    /// The token decides which identity the client acts as. Build one client
    /// with the registry's own token and, per request, another with the
    /// requesting user's token for provisioning.
    pub fn bearer_token(mut self, token: String) -> Self {
        self.bearer_token = Some(token);
        self
    }

    /// Set a timeout for each network request
    ///
    /// By default there is no timeout; cancellation of the
    /// [crate::client::RequestContext] is the usual way to give up.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.timeout(timeout);
        self
    }

    /// Set a timeout for only the initial connect phase of each network request
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.req = self.req.connect_timeout(timeout);
        self
    }

    /// Sets the `User-Agent` header used by this client
    pub fn user_agent<V>(mut self, value: V) -> Self
    where
        V: TryInto<HeaderValue>,
        V::Error: Into<http::Error>,
    {
        self.req = self.req.user_agent(value);
        self
    }

    /// Set the default headers for every HTTP request
    pub fn default_request_headers(mut self, headers: HeaderMap) -> Self {
        self.req = self.req.default_headers(headers);
        self
    }

    /// Trust an additional root certificate
    pub fn add_root_certificate(mut self, certificate: Certificate) -> Self {
        self.req = self.req.add_root_certificate(certificate);
        self
    }

    /// Skip verification of the API server's certificate
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.req = self.req.danger_accept_invalid_certs(accept);
        self
    }

    /// Construct a RestClient using the parameters from this Builder
    pub fn build(self) -> Result<RestClient, TransportError> {
        let base_url = self
            .base_url
            .ok_or_else(|| TransportError::Config("no API server address".to_owned()))?;
        log::info!("using metadata service at {}", base_url);
        Ok(RestClient {
            req: self.req.build()?,
            base_url,
            bearer_token: self.bearer_token,
        })
    }
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        RestClientBuilder::new()
    }
}

/// Metadata service client speaking the service's REST API
#[derive(Clone)]
pub struct RestClient {
    req: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl RestClient {
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::new()
    }

    /// Return the default `User-Agent` that we use if no other is set
    pub fn default_user_agent() -> HeaderValue {
        static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        HeaderValue::from_static(USER_AGENT)
    }

    /// Configure a builder from the service account mounted into a pod
    ///
    /// Uses `$KUBERNETES_SERVICE_HOST` and `$KUBERNETES_SERVICE_PORT` for the
    /// address, and the mounted token and CA bundle.
    pub fn in_cluster() -> Result<RestClientBuilder, TransportError> {
        let host = env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| TransportError::Config("KUBERNETES_SERVICE_HOST is not set".to_owned()))?;
        let port = env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_owned());
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };
        let base_url = Url::parse(&format!("https://{}:{}", host, port))?;

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = fs::read_to_string(dir.join("token"))
            .map_err(|e| TransportError::Config(format!("reading service account token: {}", e)))?;
        let ca = fs::read(dir.join("ca.crt"))
            .map_err(|e| TransportError::Config(format!("reading service account CA: {}", e)))?;

        Ok(RestClient::builder()
            .base_url(base_url)
            .bearer_token(token.trim().to_owned())
            .add_root_certificate(Certificate::from_pem(&ca)?))
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, path))?)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = self.url(path)?;
        log::debug!("GET {}", url);
        let response = self.authorize(self.req.get(url)).send().await?;
        let body = checked_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<u8>, TransportError> {
        let url = self.url(path)?;
        log::debug!("POST {}", url);
        let response = self.authorize(self.req.post(url)).json(body).send().await?;
        checked_body(response).await
    }
}

async fn checked_body(response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
    let code = response.status();
    let body = response.bytes().await?.to_vec();
    if code.is_success() {
        Ok(body)
    } else {
        let status = status_from_body(code.as_u16(), &body);
        log::debug!("request failed with {}: {}", code, status);
        Err(status.into())
    }
}

/// Decode the `Status` body of a failed response
///
/// Bodies that are not a status object still produce a status carrying the
/// HTTP code, so reason predicates keep working.
pub(crate) fn status_from_body(code: u16, body: &[u8]) -> StatusError {
    match serde_json::from_slice::<StatusError>(body) {
        Ok(mut status) if !status.message.is_empty() || status.details.is_some() => {
            if status.code == 0 {
                status.code = code;
            }
            status
        }
        _ => StatusError::from_code(code, String::from_utf8_lossy(body).into_owned()),
    }
}

pub(crate) mod paths {
    use crate::image::ContentDigest;

    const IMAGE_API: &str = "/apis/image.openshift.io/v1";

    pub fn image_streams(namespace: &str) -> String {
        format!("{}/namespaces/{}/imagestreams", IMAGE_API, namespace)
    }

    pub fn image_stream(namespace: &str, name: &str) -> String {
        format!("{}/{}", image_streams(namespace), name)
    }

    pub fn image_stream_layers(namespace: &str, name: &str) -> String {
        format!("{}/layers", image_stream(namespace, name))
    }

    pub fn image_stream_secrets(namespace: &str, name: &str) -> String {
        format!("{}/secrets", image_stream(namespace, name))
    }

    pub fn image_stream_mappings(namespace: &str) -> String {
        format!("{}/namespaces/{}/imagestreammappings", IMAGE_API, namespace)
    }

    pub fn image(digest: &ContentDigest) -> String {
        format!("{}/images/{}", IMAGE_API, digest)
    }

    pub fn limit_ranges(namespace: &str) -> String {
        format!("/api/v1/namespaces/{}/limitranges", namespace)
    }
}

#[async_trait]
impl MetadataClient for RestClient {
    async fn get_image_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStream, TransportError> {
        self.get(&paths::image_stream(namespace, name)).await
    }

    async fn get_image_stream_layers(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ImageStreamLayers, TransportError> {
        self.get(&paths::image_stream_layers(namespace, name)).await
    }

    async fn get_image(&self, digest: &ContentDigest) -> Result<Image, TransportError> {
        self.get(&paths::image(digest)).await
    }

    async fn create_image_stream_mapping(
        &self,
        namespace: &str,
        mapping: &ImageStreamMapping,
    ) -> Result<(), TransportError> {
        self.post(&paths::image_stream_mappings(namespace), mapping)
            .await
            .map(|_| ())
    }

    async fn list_image_stream_secrets(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<SecretList, TransportError> {
        self.get(&paths::image_stream_secrets(namespace, name)).await
    }

    async fn list_limit_ranges(&self, namespace: &str) -> Result<LimitRangeList, TransportError> {
        self.get(&paths::limit_ranges(namespace)).await
    }
}

#[async_trait]
impl ImageStreamProvisioner for RestClient {
    async fn create_image_stream(
        &self,
        namespace: &str,
        stream: &ImageStream,
    ) -> Result<ImageStream, TransportError> {
        let body = self.post(&paths::image_streams(namespace), stream).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
