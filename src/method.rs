//! HTTP method and REST operation kind.
//!
//! [`Method`] is the wire verb. [`Operation`] is what the request means to a
//! resource server: `POST /Patient` creates, `PUT /Patient/1` updates,
//! `GET /Patient` searches. Gates key off either, depending on what they care
//! about.
//!
//! Unknown method strings are rejected at the server level with
//! `405 Method Not Allowed` before any gate or handler sees them.

use std::fmt;
use std::str::FromStr;

/// A known HTTP method (RFC 9110).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }
}

/// Parses an uppercase method string. Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Operation ─────────────────────────────────────────────────────────────────

/// The REST operation a request performs against a resource server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    Capabilities, // GET  /metadata
    Create,       // POST /{type}
    Delete,       // DELETE /{type}/{id}
    History,      // GET  [/{type}[/{id}]]/_history
    Patch,        // PATCH /{type}/{id}
    Read,         // GET  /{type}/{id}
    Search,       // GET  /{type}, POST /{type}/_search
    Transaction,  // POST /
    Update,       // PUT  /{type}/{id}
    Vread,        // GET  /{type}/{id}/_history/{vid}
    Other,
}

impl Operation {
    /// Derives the operation from method and path.
    pub fn classify(method: Method, path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (method, segments.as_slice()) {
            (Method::Post, [])                           => Self::Transaction,
            (Method::Get, ["metadata"])                  => Self::Capabilities,
            (Method::Get, [.., "_history"])              => Self::History,
            (Method::Get, [_, _, "_history", _])         => Self::Vread,
            (Method::Post, [_, "_search"])               => Self::Search,
            (_, [.., last]) if last.starts_with('$')     => Self::Other,
            (Method::Get, [_])                           => Self::Search,
            (Method::Get, [_, _])                        => Self::Read,
            (Method::Post, [_])                          => Self::Create,
            (Method::Put, [_] | [_, _])                  => Self::Update,
            (Method::Patch, [_] | [_, _])                => Self::Patch,
            (Method::Delete, [_] | [_, _])               => Self::Delete,
            _                                            => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capabilities => "capabilities",
            Self::Create       => "create",
            Self::Delete       => "delete",
            Self::History      => "history",
            Self::Patch        => "patch",
            Self::Read         => "read",
            Self::Search       => "search",
            Self::Transaction  => "transaction",
            Self::Update       => "update",
            Self::Vread        => "vread",
            Self::Other        => "other",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
