//! Header multimap.
//!
//! Fields keep their insertion order and duplicates are allowed. Lookups are
//! case-insensitive; names are stored exactly as received so they are written
//! back unchanged.

use crate::error::ProxyError;

pub const CONNECTION: &str = "Connection";
pub const PROXY_CONNECTION: &str = "Proxy-Connection";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const HOST: &str = "Host";
pub const EXPECT: &str = "Expect";
pub const LOCATION: &str = "Location";
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: Vec<HeaderField>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a field, keeping any existing ones.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(HeaderField {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Replace every `name` field by a single one at the position of the first.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)) {
            Some(first) => {
                self.fields[first].value = value;
                let mut index = 0;
                self.fields.retain(|f| {
                    let keep = index <= first || !f.name.eq_ignore_ascii_case(name);
                    index += 1;
                    keep
                });
            }
            None => self.add(name, value),
        }
    }

    /// Remove every `name` field. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        before != self.fields.len()
    }

    /// Whether a comma separated header such as `Connection` lists `token`.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name)
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn content_length(&self) -> Result<Option<u64>, ProxyError> {
        match self.get(CONTENT_LENGTH) {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| ProxyError::MalformedMessage(format!("invalid Content-Length {v:?}"))),
            None => Ok(None),
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.has_token(TRANSFER_ENCODING, "chunked")
    }

    pub fn is_100_continue_expected(&self) -> bool {
        self.get(EXPECT)
            .map(|v| v.trim().eq_ignore_ascii_case("100-continue"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_and_duplicates() {
        let mut header = Header::new();
        header.add("X-A", "1");
        header.add("Host", "example.com");
        header.add("x-a", "2");

        let values: Vec<_> = header.get_all("X-A").collect();
        assert_eq!(values, vec!["1", "2"]);
        assert_eq!(header.get("HOST"), Some("example.com"));

        let names: Vec<_> = header.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["X-A", "Host", "x-a"]);
    }

    #[test]
    fn set_replaces_all_occurrences_in_place() {
        let mut header = Header::new();
        header.add("A", "1");
        header.add("B", "2");
        header.add("a", "3");
        header.set("A", "9");

        let fields: Vec<_> = header.iter().map(|f| (f.name.as_str(), f.value.as_str())).collect();
        assert_eq!(fields, vec![("A", "9"), ("B", "2")]);
    }

    #[test]
    fn connection_tokens() {
        let mut header = Header::new();
        header.add("Connection", "keep-alive, Upgrade");
        assert!(header.has_token(CONNECTION, "upgrade"));
        assert!(!header.has_token(CONNECTION, "close"));
    }

    #[test]
    fn invalid_content_length_is_malformed() {
        let mut header = Header::new();
        header.add("Content-Length", "abc");
        assert!(matches!(header.content_length(), Err(ProxyError::MalformedMessage(_))));
    }
}
