use crate::base::error::{HcError, HcResult};
use http::header::{HeaderName, HeaderValue};

/// A header map that preserves insertion order and original name casing.
///
/// Keys match case-insensitively with replace-on-set semantics: setting an
/// existing name overwrites its value in place, so the count never grows on
/// replace. Used for both request and response headers on call and
/// WebSocket handles.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    headers: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    /// Sets a header, replacing in place on a case-insensitive name match.
    ///
    /// Names and values are validated against HTTP token rules; invalid
    /// input fails with [`HcError::InvalidArg`].
    pub fn set(&mut self, name: &str, value: &str) -> HcResult<()> {
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| HcError::InvalidArg)?;
        HeaderValue::from_str(value).map_err(|_| HcError::InvalidArg)?;

        if let Some((_, v)) = self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            *v = value.to_owned();
        } else {
            self.headers.push((name.to_owned(), value.to_owned()));
        }
        Ok(())
    }

    /// Case-insensitive lookup. Absent names are `None`, not an error.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header at a zero-based index, with its original casing.
    pub fn get_at(&self, index: usize) -> Option<(&str, &str)> {
        self.headers
            .get(index)
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }
}
