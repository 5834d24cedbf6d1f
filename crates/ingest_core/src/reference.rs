use std::fmt;

use url::Url;

/// Stable identity of one discoverable item, normally its detail-page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateReference(String);

impl CandidateReference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CandidateReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CandidateReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CandidateReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CandidateReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("empty reference")]
    Empty,
    #[error("cannot resolve {href:?}: {message}")]
    Unresolvable { href: String, message: String },
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
}

/// Resolve a listing href against the listing base into a canonical reference.
///
/// Relative and absolute hrefs are both accepted. The fragment is dropped so
/// that `#apply` style anchors on the same offer collapse to one identity.
pub fn canonicalize_reference(base: &Url, href: &str) -> Result<CandidateReference, ReferenceError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(ReferenceError::Empty);
    }
    let mut resolved = base.join(href).map_err(|err| ReferenceError::Unresolvable {
        href: href.to_string(),
        message: err.to_string(),
    })?;
    match resolved.scheme() {
        "http" | "https" => {}
        other => return Err(ReferenceError::UnsupportedScheme(other.to_string())),
    }
    resolved.set_fragment(None);
    Ok(CandidateReference(resolved.into()))
}
