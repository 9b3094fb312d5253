//! Cookie normalisation.
//!
//! The remote tool correlates the start call, the streaming channel, and
//! the cleanup call through session cookies. Cookies seen on several
//! responses are merged into one `Cookie` header, last value wins per name.

use reqwest::header::{HeaderMap, SET_COOKIE};

/// Ordered `name -> value` cookie set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    entries: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a cookie, keeping the original position.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absorb one `Set-Cookie` value; attributes after the first `;` are
    /// dropped. Values without a `name=` pair are ignored.
    pub fn absorb_set_cookie(&mut self, header_value: &str) {
        let pair = header_value.split(';').next().unwrap_or_default();
        if let Some((name, value)) = pair.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                self.set(name, value.trim());
            }
        }
    }

    /// Absorb every `Set-Cookie` header of a response.
    pub fn absorb_headers(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(text) = value.to_str() {
                self.absorb_set_cookie(text);
            }
        }
    }

    /// Render as a `Cookie` header value, or `None` if empty.
    pub fn header_value(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        Some(
            self.entries
                .iter()
                .map(|(n, v)| format!("{n}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    #[test]
    fn last_value_wins_per_name() {
        let mut jar = CookieJar::new();
        jar.absorb_set_cookie("session=abc; Path=/; HttpOnly");
        jar.absorb_set_cookie("_xsrf=1|x; Path=/");
        jar.absorb_set_cookie("session=def; Path=/");
        assert_eq!(jar.get("session"), Some("def"));
        assert_eq!(jar.header_value().as_deref(), Some("session=def; _xsrf=1|x"));
    }

    #[test]
    fn malformed_values_are_ignored() {
        let mut jar = CookieJar::new();
        jar.absorb_set_cookie("garbage");
        jar.absorb_set_cookie("=novalue");
        assert!(jar.is_empty());
        assert_eq!(jar.header_value(), None);
    }

    #[test]
    fn absorbs_all_set_cookie_headers() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        let mut jar = CookieJar::new();
        jar.absorb_headers(&headers);
        assert_eq!(jar.header_value().as_deref(), Some("a=1; b=2"));
    }
}
