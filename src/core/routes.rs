use std::collections::HashMap;

/// Maps inbound request paths to logical service names.
///
/// Explicit prefixes win by longest match. When no explicit prefix matches and
/// a `service_prefix` is set (e.g. `/api/v1/`), the first path segment after
/// it is taken as the service name.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<(String, String)>,
    service_prefix: Option<String>,
}

impl RouteTable {
    pub fn new(routes: &HashMap<String, String>, service_prefix: Option<&str>) -> Self {
        let mut routes: Vec<(String, String)> = routes
            .iter()
            .map(|(prefix, service)| (prefix.clone(), service.clone()))
            .collect();
        // longest prefix first
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        let service_prefix = service_prefix
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| {
                if prefix.ends_with('/') {
                    prefix.to_string()
                } else {
                    format!("{prefix}/")
                }
            });

        Self {
            routes,
            service_prefix,
        }
    }

    pub fn resolve<'a>(&'a self, path: &'a str) -> Option<&'a str> {
        if let Some((_, service)) = self
            .routes
            .iter()
            .find(|(prefix, _)| Self::prefix_matches(prefix, path))
        {
            return Some(service);
        }

        let rest = path.strip_prefix(self.service_prefix.as_deref()?)?;
        rest.split('/').next().filter(|segment| !segment.is_empty())
    }

    /// `/api/users` matches `/api/users` and `/api/users/1` but not `/api/usersx`
    fn prefix_matches(prefix: &str, path: &str) -> bool {
        match path.strip_prefix(prefix) {
            Some(rest) => prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.service_prefix.is_none()
    }
}
