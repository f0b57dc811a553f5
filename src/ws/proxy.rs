//! Proxy selection and HTTP `CONNECT` tunnelling.

use std::env;
use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::Result;
use crate::error::Error;

/// Largest proxy response head accepted before giving up.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Chooses the proxy for a target address. `Ok(None)` connects directly.
///
/// Implemented for any `Fn(&Url) -> Result<Option<Url>>`.
pub trait ProxyResolver: Send + Sync + 'static {
    fn resolve(&self, target: &Url) -> Result<Option<Url>>;
}

impl<F> ProxyResolver for F
where
    F: Fn(&Url) -> Result<Option<Url>> + Send + Sync + 'static,
{
    fn resolve(&self, target: &Url) -> Result<Option<Url>> {
        self(target)
    }
}

/// Resolves the proxy from the process environment.
///
/// `wss://` targets use `HTTPS_PROXY`, `ws://` targets use `HTTP_PROXY`, both fall
/// back to `ALL_PROXY`. Lowercase names are accepted too. Hosts matched by
/// `NO_PROXY` connect directly.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyFromEnv;

impl ProxyResolver for ProxyFromEnv {
    fn resolve(&self, target: &Url) -> Result<Option<Url>> {
        resolve_with(target, |key| env::var(key).ok())
    }
}

fn resolve_with<F>(target: &Url, lookup: F) -> Result<Option<Url>>
where
    F: Fn(&str) -> Option<String>,
{
    let first = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| lookup(key))
            .find(|value| !value.trim().is_empty())
    };

    let host = target.host_str().unwrap_or_default();
    if let Some(no_proxy) = first(&["NO_PROXY", "no_proxy"])
        && bypasses(&no_proxy, host)
    {
        return Ok(None);
    }

    let keys: &[&str] = if target.scheme() == "wss" {
        &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]
    } else {
        &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
    };

    match first(keys) {
        Some(raw) => Ok(Some(Url::parse(raw.trim())?)),
        None => Ok(None),
    }
}

/// `NO_PROXY` matching: `*`, exact hosts, and domain suffixes (`.example.com` or
/// `example.com` both cover `api.example.com`).
fn bypasses(no_proxy: &str, host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');

    no_proxy
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| {
            if entry == "*" {
                return true;
            }
            let domain = entry.trim_start_matches('.');
            host.eq_ignore_ascii_case(domain)
                || host
                    .to_ascii_lowercase()
                    .ends_with(&format!(".{}", domain.to_ascii_lowercase()))
        })
}

/// Opens a TCP connection to `proxy` and asks it to tunnel to `target`.
///
/// Only `http://` proxies are supported. Credentials in the proxy URL are sent as
/// `Proxy-Authorization: Basic`.
pub(crate) async fn tunnel(proxy: &Url, target: &Url) -> Result<TcpStream> {
    if proxy.scheme() != "http" {
        return Err(Error::proxy(format!(
            "unsupported proxy scheme `{}`",
            proxy.scheme()
        )));
    }

    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| Error::validation(format!("proxy address `{proxy}` has no host")))?;
    let proxy_port = proxy.port_or_known_default().unwrap_or(80);
    let target_host = target
        .host_str()
        .ok_or_else(|| Error::validation(format!("address `{target}` has no host")))?;
    let target_port = target
        .port_or_known_default()
        .ok_or_else(|| Error::validation(format!("address `{target}` has no port")))?;

    let authority = format!("{target_host}:{target_port}");
    let mut stream = TcpStream::connect(format!("{proxy_host}:{proxy_port}")).await?;

    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(credentials) = basic_credentials(proxy) {
        _ = write!(request, "Proxy-Authorization: Basic {credentials}\r\n");
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    let head = read_response_head(&mut stream).await?;
    let status_line = head.lines().next().unwrap_or_default();
    let accepted = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code.len() == 3 && code.starts_with('2'));

    if !accepted {
        return Err(Error::proxy(status_line));
    }

    debug!(proxy = %proxy, %authority, "proxy tunnel established");
    Ok(stream)
}

fn basic_credentials(proxy: &Url) -> Option<String> {
    if proxy.username().is_empty() {
        return None;
    }
    let pair = format!("{}:{}", proxy.username(), proxy.password().unwrap_or_default());
    Some(STANDARD.encode(pair))
}

/// Reads up to and including the blank line, one byte at a time, so nothing that
/// belongs to the tunnelled stream is consumed.
async fn read_response_head(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(Error::proxy("response head too large"));
        }
        let byte = stream
            .read_u8()
            .await
            .map_err(|e| Error::proxy(format!("reading CONNECT response: {e}")))?;
        head.push(byte);
    }

    Ok(String::from_utf8_lossy(&head).into_owned())
}
