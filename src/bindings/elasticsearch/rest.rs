//! Purpose: Minimal blocking HTTP/JSON client for the Elasticsearch REST API.
//! Exports: `RestClient`, `parse_hosts`.
//! Role: Transport for the elasticsearch binding; knows URLs, auth, and error envelopes only.
//! Invariants: Hosts are used round-robin per request; a failed request is never retried.
//! Invariants: Only a 404 naming a missing document maps to `NotFound`; a missing index or any
//! other HTTP status is `Backend`, transport failures are `Io`.
//! Invariants: Empty, `.` and `..` path segments are rejected before a request is built.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

type RestResult<T> = Result<T, Error>;

pub(crate) const DEFAULT_PORT: u16 = 9200;

pub(crate) struct RestClient {
    hosts: Vec<Url>,
    next_host: AtomicUsize,
    authorization: Option<String>,
    agent: ureq::Agent,
}

impl RestClient {
    pub(crate) fn new(hosts: Vec<Url>, timeout: Duration) -> RestResult<Self> {
        if hosts.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("no elasticsearch hosts configured"));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Ok(Self {
            hosts,
            next_host: AtomicUsize::new(0),
            authorization: None,
            agent,
        })
    }

    pub(crate) fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        let token = BASE64.encode(format!("{user}:{password}"));
        self.authorization = Some(format!("Basic {token}"));
        self
    }

    /// Returns whether `HEAD` on the path answers 200; 404 is `false`.
    pub(crate) fn exists(&self, segments: &[&str]) -> RestResult<bool> {
        let url = self.url(segments, &[])?;
        match self.request("HEAD", &url).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(transport_error(err)),
        }
    }

    pub(crate) fn get_json<R>(&self, segments: &[&str], query: &[(&str, &str)]) -> RestResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.url(segments, query)?;
        let response = self
            .request("GET", &url)
            .set("Accept", "application/json")
            .call();
        finish(response)
    }

    pub(crate) fn delete_json<R>(&self, segments: &[&str], query: &[(&str, &str)]) -> RestResult<R>
    where
        R: DeserializeOwned,
    {
        let url = self.url(segments, query)?;
        let response = self
            .request("DELETE", &url)
            .set("Accept", "application/json")
            .call();
        finish(response)
    }

    pub(crate) fn send_json<T, R>(
        &self,
        method: &str,
        segments: &[&str],
        query: &[(&str, &str)],
        body: &T,
    ) -> RestResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = self.url(segments, query)?;
        let payload = serde_json::to_string(body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        tracing::debug!(method, url = %url, "elasticsearch request");
        let response = self
            .request(method, &url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .send_string(&payload);
        finish(response)
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let mut request = self.agent.request(method, url.as_str());
        if let Some(authorization) = &self.authorization {
            request = request.set("Authorization", authorization);
        }
        request
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> RestResult<Url> {
        let index = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        let mut url = self.hosts[index].clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("elasticsearch host url cannot be a base")
            })?;
            path.clear();
            for segment in segments {
                if matches!(*segment, "" | "." | "..") {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("`{segment}` cannot be used as a document id or index name")));
                }
                path.push(segment);
            }
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

fn finish<R>(response: Result<ureq::Response, ureq::Error>) -> RestResult<R>
where
    R: DeserializeOwned,
{
    match response {
        Ok(resp) => read_json_response(resp),
        Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
        Err(ureq::Error::Transport(err)) => Err(transport_error(err)),
    }
}

fn transport_error(err: ureq::Transport) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("elasticsearch request failed")
        .with_source(err)
}

fn read_json_response<R>(response: ureq::Response) -> RestResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Backend)
            .with_message("invalid elasticsearch response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    let value = serde_json::from_str::<Value>(&body).ok();
    let kind = match &value {
        Some(value) if status == 404 && is_document_miss(value) => ErrorKind::NotFound,
        _ => ErrorKind::Backend,
    };
    let message = value
        .as_ref()
        .and_then(error_reason)
        .unwrap_or_else(|| format!("elasticsearch returned status {status}"));
    Error::new(kind).with_message(message)
}

/// A 404 body that reports an absent document, as opposed to an absent index or endpoint.
fn is_document_miss(value: &Value) -> bool {
    if value.get("found").and_then(Value::as_bool) == Some(false) {
        return true;
    }
    if value.get("result").and_then(Value::as_str) == Some("not_found") {
        return true;
    }
    value.pointer("/error/type").and_then(Value::as_str) == Some("document_missing_exception")
}

/// Extracts `type: reason` from an Elasticsearch error envelope.
fn error_reason(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if let Some(text) = error.as_str() {
        return Some(text.to_string());
    }
    let kind = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);
    match (kind, reason) {
        (Some(kind), Some(reason)) => Some(format!("{kind}: {reason}")),
        (Some(kind), None) => Some(kind.to_string()),
        (None, Some(reason)) => Some(reason.to_string()),
        (None, None) => None,
    }
}

/// Parses `es.hosts.list`: comma-separated `host[:port]` or `scheme://host[:port]` entries.
pub(crate) fn parse_hosts(list: &str, default_scheme: &str) -> RestResult<Vec<Url>> {
    if default_scheme != "http" && default_scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unsupported elasticsearch scheme `{default_scheme}`"))
            .with_hint("Use http or https."));
    }
    let mut hosts = Vec::new();
    for entry in list.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        hosts.push(parse_host(entry, default_scheme)?);
    }
    if hosts.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("es.hosts.list does not name any host")
            .with_hint("Use a value like `localhost:9200,10.0.0.2:9200`."));
    }
    Ok(hosts)
}

fn parse_host(entry: &str, default_scheme: &str) -> RestResult<Url> {
    let raw = if entry.contains("://") {
        entry.to_string()
    } else {
        if let Some((_, port)) = entry.rsplit_once(':') {
            port.parse::<u16>().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("unable to parse port number in `{entry}`"))
                    .with_source(err)
            })?;
        }
        format!("{default_scheme}://{entry}")
    };
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("unable to identify host `{entry}`"))
            .with_source(err)
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("host `{entry}` must use http or https")));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::new(ErrorKind::Usage).with_message(format!("unable to identify host `{entry}`")));
    }
    if url.port().is_none() && url.scheme() == "http" {
        url.set_port(Some(DEFAULT_PORT)).map_err(|_| {
            Error::new(ErrorKind::Usage).with_message(format!("unable to set port for `{entry}`"))
        })?;
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
