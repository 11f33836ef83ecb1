use std::sync::{Arc, Mutex, PoisonError};

use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

/// Cookie the control plane sets at the end of an SSO login.
pub const HANDOFF_COOKIE: &str = "servertoken";

/// Where the SSO handoff token is read from.
pub trait HandoffCookieSource: Send + Sync {
    fn handoff_token(&self) -> Option<String>;
}

/// Reads the handoff cookie out of the HTTP client's cookie jar.
pub struct JarCookieSource {
    jar: Arc<Jar>,
    url: Url,
    name: String,
}

impl JarCookieSource {
    pub fn new(jar: Arc<Jar>, url: Url) -> Self {
        Self {
            jar,
            url,
            name: HANDOFF_COOKIE.to_string(),
        }
    }
}

impl HandoffCookieSource for JarCookieSource {
    fn handoff_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        find_cookie(header.to_str().ok()?, &self.name)
    }
}

/// A handoff value held in memory; tests and `--handoff` use it.
#[derive(Default)]
pub struct StaticCookieSource {
    value: Mutex<Option<String>>,
}

impl StaticCookieSource {
    pub fn new(value: Option<String>) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.into());
    }

    pub fn remove(&self) {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl HandoffCookieSource for StaticCookieSource {
    fn handoff_token(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T: HandoffCookieSource + ?Sized> HandoffCookieSource for Arc<T> {
    fn handoff_token(&self) -> Option<String> {
        (**self).handoff_token()
    }
}

/// Pick one cookie's value out of a `Cookie` header. Empty values count as absent.
fn find_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}
