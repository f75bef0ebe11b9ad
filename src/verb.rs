//! HTTP verb as declared on a controller method.
//!
//! The set is open. The six verbs the router registers directly get their
//! own variant; `All` accepts every verb; anything else (`PURGE`, `LOCK`,
//! `MKCOL`, …) is carried as a [`Verb::Custom`] token and mounted behind a
//! verb filter.
//!
//! Tokens are case-sensitive per RFC 9110 §9.1.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A declared HTTP verb.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    /// Matches any verb, no filter.
    All,
    /// Any other token, compared verbatim against the request method.
    Custom(String),
}

impl Verb {
    /// Builds a verb from a token. Known tokens map to their variant, so
    /// `Verb::custom("GET")` is `Verb::Get`.
    pub fn custom(token: impl Into<String>) -> Self {
        let token = token.into();
        match Self::known(&token) {
            Some(verb) => verb,
            None => Self::Custom(token),
        }
    }

    /// Returns the wire representation (e.g. `"GET"`).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get       => "GET",
            Self::Post      => "POST",
            Self::Put       => "PUT",
            Self::Patch     => "PATCH",
            Self::Delete    => "DELETE",
            Self::Head      => "HEAD",
            Self::All       => "ALL",
            Self::Custom(t) => t,
        }
    }

    /// True for verbs the router can register without a filter.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Whether an incoming request method satisfies this verb.
    pub fn accepts(&self, method: &http::Method) -> bool {
        match self {
            Self::All => true,
            other => other.as_str() == method.as_str(),
        }
    }

    fn known(token: &str) -> Option<Self> {
        match token {
            "GET"    => Some(Self::Get),
            "POST"   => Some(Self::Post),
            "PUT"    => Some(Self::Put),
            "PATCH"  => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "HEAD"   => Some(Self::Head),
            "ALL"    => Some(Self::All),
            _        => None,
        }
    }
}

impl FromStr for Verb {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::custom(s))
    }
}

impl From<&http::Method> for Verb {
    fn from(method: &http::Method) -> Self {
        Self::custom(method.as_str())
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
