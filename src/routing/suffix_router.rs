//! Suffix router (§4.3.3): dispatches by a suffix pattern matched against the
//! final path component (or the component preceding a trailing slash, when
//! `handleDirectories` is set).

use crate::application::Application;
use crate::component::BoxFuture;
use crate::error::{ConfigError, CoreError, CoreResult};
use crate::managers::ApplicationManager;
use crate::request::{DispatchInfo, Request};
use crate::response::Response;
use std::sync::{Arc, RwLock};

/// Validates a suffix pattern: `*` alone (fallthrough), or `*` followed by an
/// optional separator character and a dot-separated sequence of
/// alphanumeric/`-_` tokens (§4.3.3).
pub fn validate_suffix_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern == "*" {
        return Ok(());
    }
    let Some(rest) = pattern.strip_prefix('*') else {
        return Err(ConfigError::InvalidSuffixPattern(pattern.to_string()));
    };
    if rest.is_empty() {
        return Err(ConfigError::InvalidSuffixPattern(pattern.to_string()));
    }
    let mut chars = rest.chars();
    let first = chars.next().unwrap();
    let after_sep = if "./-_+".contains(first) { chars.as_str() } else { rest };
    if after_sep.is_empty() {
        return Err(ConfigError::InvalidSuffixPattern(pattern.to_string()));
    }
    let valid_tokens = after_sep
        .split('.')
        .all(|tok| !tok.is_empty() && tok.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    if !valid_tokens {
        return Err(ConfigError::InvalidSuffixPattern(pattern.to_string()));
    }
    Ok(())
}

struct Entry {
    pattern: String,
    literal_suffix: String, // pattern with the leading '*' stripped; empty only for the fallthrough
    application: String,
}

pub struct SuffixRouter {
    apps: Arc<ApplicationManager>,
    handle_directories: bool,
    entries: RwLock<Vec<Entry>>,
    fallthrough: RwLock<Option<String>>,
}

impl SuffixRouter {
    pub fn new(apps: Arc<ApplicationManager>, handle_directories: bool) -> Self {
        Self {
            apps,
            handle_directories,
            entries: RwLock::new(Vec::new()),
            fallthrough: RwLock::new(None),
        }
    }

    pub fn bind(&self, pattern: &str, application: impl Into<String>) -> Result<(), ConfigError> {
        validate_suffix_pattern(pattern)?;
        let application = application.into();
        if pattern == "*" {
            *self.fallthrough.write().unwrap() = Some(application);
            return Ok(());
        }
        let literal_suffix = pattern.trim_start_matches('*').to_string();
        self.entries.write().unwrap().push(Entry { pattern: pattern.to_string(), literal_suffix, application });
        Ok(())
    }

    fn target_component<'a>(&self, dispatch: &'a DispatchInfo) -> Option<&'a str> {
        let comps = dispatch.extra.components();
        if comps.is_empty() {
            return None;
        }
        let last_is_empty = comps.last().map(|s| s.is_empty()).unwrap_or(false);
        if self.handle_directories && last_is_empty && comps.len() >= 2 {
            Some(comps[comps.len() - 2].as_str())
        } else {
            Some(comps[comps.len() - 1].as_str())
        }
    }

    /// Resolves the application name for a component, per the longest-suffix
    /// / pattern-length / lexical tie-break rule (§4.3.3).
    fn resolve(&self, component: &str) -> Option<String> {
        let entries = self.entries.read().unwrap();
        let best = entries
            .iter()
            .filter(|e| component.ends_with(e.literal_suffix.as_str()))
            .max_by(|a, b| {
                a.literal_suffix
                    .len()
                    .cmp(&b.literal_suffix.len())
                    .then_with(|| a.pattern.len().cmp(&b.pattern.len()))
                    .then_with(|| b.pattern.cmp(&a.pattern)) // lexical order: smaller wins ties
            });
        best.map(|e| e.application.clone()).or_else(|| self.fallthrough.read().unwrap().clone())
    }
}

impl Application for SuffixRouter {
    fn handle<'a>(&'a self, request: &'a Request, dispatch: &'a DispatchInfo) -> BoxFuture<'a, CoreResult<Option<Response>>> {
        Box::pin(async move {
            let Some(component) = self.target_component(dispatch) else {
                return Ok(None);
            };
            let Some(name) = self.resolve(component) else {
                return Ok(None);
            };
            let app = self
                .apps
                .get(&name)
                .map_err(|_| CoreError::Config(ConfigError::UnknownApplication(name.clone())))?;
            app.handle(request, dispatch).await
        })
    }
}
