use crate::config::Config;
use crate::error::ClientError;
use reqwest::{Method, Response};
use std::time::Duration;

/// Retry sleep by backoff level: the entry with the largest key not above
/// the level wins.
const WAIT_DELAY_SECS: &[(u32, f64)] = &[(0, 0.3), (1, 0.5), (5, 1.0), (60, 2.0), (300, 5.0)];

pub(crate) fn wait_delay(level: u32) -> Duration {
    let secs = WAIT_DELAY_SECS
        .iter()
        .rev()
        .find(|(at, _)| *at <= level)
        .map(|(_, secs)| *secs)
        .unwrap_or(0.3);
    Duration::from_secs_f64(secs)
}

/// The client's HTTP side: one shared connection pool, the base URL, and
/// the channel path.
pub(crate) struct Http {
    client: reqwest::Client,
    base: url::Url,
    channel: String,
}

impl Http {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        let base = url::Url::parse(&config.url)
            .map_err(|e| ClientError::usage(format!("Invalid URL {}: {e}", config.url)))?;
        Ok(Self {
            client,
            base,
            channel: config.channel.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<url::Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::usage("URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Issue a request against `/c/<channel>`.
    pub async fn channel(
        &self,
        method: Method,
        query: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Response, ClientError> {
        let url = self.url(&["c", &self.channel])?;
        if !body.is_empty() {
            crate::debug!("Making {method} request with {} bytes of data", body.len());
        }
        Ok(self
            .client
            .request(method, url)
            .query(query)
            .body(body)
            .send()
            .await?)
    }

    /// Issue a GET against an arbitrary server path such as `/version`.
    pub async fn get(&self, segments: &[&str]) -> Result<Response, ClientError> {
        Ok(self.client.get(self.url(segments)?).send().await?)
    }

    pub fn channel_name(&self) -> &str {
        &self.channel
    }
}

/// Adapter from a reqwest header map to the wire-type decoder.
pub(crate) fn header_lookup(resp: &Response) -> impl Fn(&str) -> Option<String> + '_ {
    let headers = resp.headers();
    move |name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }
}
