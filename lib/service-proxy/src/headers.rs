//! Header replay for outbound calls
//!
//! Configured headers are sent in document order, followed by per-call
//! headers. A header named `Content-Type` (any case) is not passed through: it
//! sets the request's content type, last value wins. Any other name may appear
//! only once, ignoring case, so the order on the wire is the order given.

use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};

#[derive(Clone, Debug, Default)]
pub struct RequestHeaders {
    content_type: Option<HeaderValue>,
    passthrough: Vec<(HeaderName, HeaderValue)>,
}

impl RequestHeaders {
    /// Build from configured headers then per-call headers
    pub fn new<'a>(headers: impl IntoIterator<Item = &'a (String, String)>) -> Result<Self, String> {
        let mut prepared = Self::default();
        for (name, value) in headers {
            let value = HeaderValue::from_str(value)
                .map_err(|_| format!("invalid value for header {}", name))?;

            if name.eq_ignore_ascii_case("content-type") {
                prepared.content_type = Some(value);
                continue;
            }

            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name {}", name))?;
            if prepared.passthrough.iter().any(|(seen, _)| *seen == name) {
                return Err(format!("duplicate header {}", name));
            }
            prepared.passthrough.push((name, value));
        }
        Ok(prepared)
    }

    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    /// Headers passed through verbatim, in order
    pub fn passthrough(&self) -> &[(HeaderName, HeaderValue)] {
        &self.passthrough
    }

    /// Header map in passthrough order, content type last
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.passthrough.len() + 1);
        for (name, value) in &self.passthrough {
            map.append(name.clone(), value.clone());
        }
        if let Some(content_type) = &self.content_type {
            map.insert(CONTENT_TYPE, content_type.clone());
        }
        map
    }
}
