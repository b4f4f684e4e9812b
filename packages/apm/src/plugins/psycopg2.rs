// packages/apm/src/plugins/psycopg2.rs
//! psycopg2 plugin
//!
//! Wraps `psycopg2.connect` with a span recording the database system, host
//! and database name. The password in the DSN is never recorded.

use crate::agent::plugin::{PatchContext, PluginInfo, PluginModule};
use crate::interception::hook::LibraryModule;
use crate::interception::interceptor::{Interception, Interceptor};
use crate::interception::wrapper::{PluginWrapper, TracePlugin};
use crate::recording::span::SpanRecord;
use crate::utils::errors::Result;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

pub const LIBRARY: &str = "psycopg2";
pub const VERSION: &str = "0.0.1";
pub const AUTHOR: &str = "liu.mingyi@navercorp.com";

/// Arguments of `psycopg2.connect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectArgs {
    pub dsn: String,
}

impl ConnectArgs {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

/// Connection parameters worth recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsnInfo {
    pub host: Option<String>,
    pub port: Option<String>,
    pub dbname: Option<String>,
    pub user: Option<String>,
}

/// Parse a libpq connection string, either `key=value` pairs or a
/// `postgres://` / `postgresql://` URI
pub fn parse_dsn(dsn: &str) -> DsnInfo {
    let dsn = dsn.trim();
    for scheme in ["postgresql://", "postgres://"] {
        if let Some(rest) = dsn.strip_prefix(scheme) {
            return parse_uri(rest);
        }
    }
    parse_keywords(dsn)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_uri(rest: &str) -> DsnInfo {
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };

    let (userinfo, hostport) = match authority.rfind('@') {
        Some(i) => (Some(&authority[..i]), &authority[i + 1..]),
        None => (None, authority),
    };

    // Multi-host URIs list failover hosts; the first one is recorded
    let hostport = hostport.split(',').next().unwrap_or_default();

    let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
        // [::1]:5432
        match bracketed.find(']') {
            Some(i) => (&bracketed[..i], bracketed[i + 1..].strip_prefix(':').unwrap_or_default()),
            None => (bracketed, ""),
        }
    } else {
        match hostport.rfind(':') {
            Some(i) => (&hostport[..i], &hostport[i + 1..]),
            None => (hostport, ""),
        }
    };

    DsnInfo {
        host: non_empty(&percent_decode(host)),
        port: non_empty(port),
        dbname: non_empty(&percent_decode(path)),
        user: userinfo.and_then(|u| non_empty(&percent_decode(u.split(':').next().unwrap_or_default()))),
    }
}

/// Decode `%XX` escapes; malformed escapes are kept as written
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| s.get(i + 1..i + 3))
            .flatten()
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());
        match escaped {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn parse_keywords(dsn: &str) -> DsnInfo {
    let mut info = DsnInfo::default();
    let mut chars = dsn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let key: String = std::iter::from_fn(|| chars.next_if(|c| *c != '=' && !c.is_whitespace())).collect();
        if key.is_empty() {
            break;
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next_if_eq(&'=').is_none() {
            break;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '\'' => break,
                    c => value.push(c),
                }
            }
        } else {
            value.extend(std::iter::from_fn(|| chars.next_if(|c| !c.is_whitespace())));
        }

        match key.as_str() {
            "host" | "hostaddr" if info.host.is_none() => info.host = non_empty(&value),
            "port" => info.port = non_empty(&value),
            "dbname" => info.dbname = non_empty(&value),
            "user" => info.user = non_empty(&value),
            _ => {}
        }
    }

    info
}

/// Trace plugin for `psycopg2.connect`
#[derive(Debug, Clone, Default)]
pub struct ConnectionPlugin;

impl<C, E: Display> TracePlugin<ConnectArgs, std::result::Result<C, E>> for ConnectionPlugin {
    fn on_before(&self, span: &mut SpanRecord, args: &ConnectArgs) {
        span.set_attribute("db.system", "postgresql");

        let dsn = parse_dsn(&args.dsn);
        if let Some(host) = dsn.host {
            let host = match dsn.port {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            };
            span.set_attribute("db.host", host);
        }
        if let Some(dbname) = dsn.dbname {
            span.set_attribute("db.name", dbname);
        }
        if let Some(user) = dsn.user {
            span.set_attribute("db.user", user);
        }
    }

    fn on_end(&self, span: &mut SpanRecord, ret: &std::result::Result<C, E>) {
        if let Err(e) = ret {
            span.set_error(e.to_string());
        }
    }
}

/// Plugin module for `psycopg2`, generic over the connection and error types
/// the binding's `connect` returns
pub struct Psycopg2Plugin<C, E> {
    _types: PhantomData<fn() -> (C, E)>,
}

impl<C, E> Psycopg2Plugin<C, E> {
    pub fn new() -> Self {
        Self { _types: PhantomData }
    }
}

impl<C, E> Default for Psycopg2Plugin<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> PluginModule for Psycopg2Plugin<C, E>
where
    C: 'static,
    E: Display + 'static,
{
    fn info(&self) -> PluginInfo {
        PluginInfo::new(LIBRARY, LIBRARY, VERSION).with_author(AUTHOR)
    }

    fn interceptors(&self, module: &Arc<LibraryModule>, ctx: &PatchContext) -> Result<Vec<Box<dyn Interception>>> {
        let connect = Interceptor::<ConnectArgs, std::result::Result<C, E>>::new(
            module,
            "connect",
            PluginWrapper::new(LIBRARY, "connect", ConnectionPlugin, ctx.sink()),
        )?;

        Ok(vec![Box::new(connect) as Box<dyn Interception>])
    }
}
