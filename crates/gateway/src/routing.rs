//! Service name → base URL lookup.

use std::collections::BTreeMap;

/// Outcome of resolving `/api/{service}/{action}[/{path}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Found(String),
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingTable {
    services: BTreeMap<String, String>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, service: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.insert(service, base_url);
        self
    }

    pub fn insert(&mut self, service: impl Into<String>, base_url: impl Into<String>) {
        self.services.insert(service.into(), base_url.into());
    }

    /// Parse `name=url,name=url`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut table = Self::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, url) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected name=url, got '{entry}'"))?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return Err(format!("expected name=url, got '{entry}'"));
            }
            table.insert(name, url);
        }
        Ok(table)
    }

    pub fn base(&self, service: &str) -> Option<&str> {
        self.services.get(service).map(String::as_str)
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn resolve(&self, service: &str, action: &str, extra_path: Option<&str>) -> Route {
        let Some(base) = self.base(service) else {
            return Route::NotFound;
        };

        let mut url = base.trim_end_matches('/').to_string();
        let segments = std::iter::once(action)
            .chain(extra_path)
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty());
        for segment in segments {
            url.push('/');
            url.push_str(segment);
        }
        Route::Found(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> RoutingTable {
        RoutingTable::new()
            .with("user", "http://iam:8081/")
            .with("billing", "http://billing:9000")
    }

    #[test]
    fn resolves_action_and_extra_path() {
        let t = table();
        assert_eq!(
            t.resolve("user", "get", None),
            Route::Found("http://iam:8081/get".to_string())
        );
        assert_eq!(
            t.resolve("billing", "invoices", Some("2024/03/")),
            Route::Found("http://billing:9000/invoices/2024/03".to_string())
        );
    }

    #[test]
    fn unknown_service_is_not_found() {
        assert_eq!(table().resolve("nope", "get", None), Route::NotFound);
    }

    #[test]
    fn parse_rejects_entries_without_url() {
        assert!(RoutingTable::parse("billing").is_err());
        assert!(RoutingTable::parse("billing=").is_err());
        assert_eq!(RoutingTable::parse(" , ").unwrap(), RoutingTable::new());
    }

    proptest! {
        #[test]
        fn resolved_urls_never_contain_empty_segments(
            action in "[a-z_]{1,12}",
            extra in proptest::option::of("/?[a-z0-9]{1,6}(/[a-z0-9]{1,6}){0,3}/?"),
        ) {
            let Route::Found(url) = table().resolve("user", &action, extra.as_deref()) else {
                panic!("user route must resolve");
            };
            let path = url.trim_start_matches("http://");
            prop_assert!(!path.contains("//"));
            prop_assert!(!url.ends_with('/'));
            let expected_prefix = format!("http://iam:8081/{}", action);
            prop_assert!(url.starts_with(&expected_prefix));
        }
    }
}
