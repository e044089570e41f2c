//! Request and response types passed through the cache proxy.
//!
//! Responses are immutable snapshots: the body is a [`Bytes`] buffer, so
//! handing one copy to the caller and another to the store is a refcount bump
//! rather than a second read of the payload.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Error;

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
        }
    }

    /// Only read-only methods may be answered from or written to the store.
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "OPTIONS" => Ok(Method::Options),
            other => Err(Error::InvalidInput(format!("unsupported method: {other}"))),
        }
    }
}

/// What the client intends to do with the response (the fetch destination).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    #[default]
    Empty,
    Document,
    Font,
    Image,
    Script,
    Style,
    Manifest,
    Audio,
    Video,
    Worker,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Empty => "",
            Destination::Document => "document",
            Destination::Font => "font",
            Destination::Image => "image",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Manifest => "manifest",
            Destination::Audio => "audio",
            Destination::Video => "video",
            Destination::Worker => "worker",
        }
    }
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "empty" => Ok(Destination::Empty),
            "document" => Ok(Destination::Document),
            "font" => Ok(Destination::Font),
            "image" => Ok(Destination::Image),
            "script" => Ok(Destination::Script),
            "style" => Ok(Destination::Style),
            "manifest" => Ok(Destination::Manifest),
            "audio" => Ok(Destination::Audio),
            "video" => Ok(Destination::Video),
            "worker" => Ok(Destination::Worker),
            other => Err(Error::InvalidInput(format!("unsupported destination: {other}"))),
        }
    }
}

/// An outbound request intercepted by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    /// Set for top-level page loads.
    pub navigate: bool,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
}

impl ProxyRequest {
    /// A plain GET with no destination.
    pub fn get(url: Url) -> Self {
        Self { method: Method::Get, url, navigate: false, destination: Destination::Empty, headers: Vec::new() }
    }

    /// A top-level document load.
    pub fn navigation(url: Url) -> Self {
        Self { navigate: true, destination: Destination::Document, ..Self::get(url) }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Lowercased host, if the URL has one.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }
}

/// Immutable snapshot of an origin response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    /// Header list in the order the origin sent it.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub captured_at: DateTime<Utc>,
}

const OFFLINE_PAGE: &str = "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Offline</title></head>\
<body><h1>You are offline</h1><p>This page is not available without a network connection.</p></body></html>\n";

impl ResponseSnapshot {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into(), captured_at: Utc::now() }
    }

    /// Generic response for a navigation that neither the network nor the
    /// store could answer.
    pub fn offline() -> Self {
        Self::new(
            503,
            vec![
                ("content-type".to_string(), "text/html; charset=utf-8".to_string()),
                ("cache-control".to_string(), "no-store".to_string()),
            ],
            Bytes::from_static(OFFLINE_PAGE.as_bytes()),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
