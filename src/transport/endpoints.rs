use crate::sync::{FetchScope, SyncKind};

/// Page size requested from list endpoints.
pub const PAGE_SIZE: u32 = 2000;

/// URL builder for every service endpoint, rooted at the API base.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// First page of a list for `kind` restricted to `scope`, changed after `revision`.
    pub fn list(&self, kind: SyncKind, scope: &FetchScope, revision: f64) -> String {
        let (path, count_param) = match kind {
            SyncKind::Secrets => ("secrets", "count_secrets"),
            SyncKind::Environments => ("environments", "count_environment"),
            SyncKind::Profile => return self.profile(),
        };
        let mut url = format!(
            "{}/v1/{}?{}=1&page=1&paging=1&revision_date={:.6}&size={}",
            self.base, path, count_param, revision, PAGE_SIZE
        );
        match scope {
            FetchScope::All => url.push_str("&hash="),
            FetchScope::Hash(hash) => {
                url.push_str("&hash=");
                url.push_str(hash);
            }
            FetchScope::EnvironmentId(id) => {
                url.push_str("&environment_id=");
                url.push_str(id);
            }
        }
        url
    }

    /// Resolve a server-relative `next` cursor.
    pub fn next_page(&self, cursor: &str) -> String {
        if cursor.starts_with("http://") || cursor.starts_with("https://") {
            cursor.to_string()
        } else {
            format!("{}{}", self.base, cursor)
        }
    }

    pub fn profile(&self) -> String {
        format!("{}/v1/profile", self.base)
    }

    pub fn revision_date(&self) -> String {
        format!("{}/v1/sync/revision_date", self.base)
    }

    pub fn deleted_item_date(&self) -> String {
        format!("{}/v1/sync/deleted_item_date", self.base)
    }

    /// Remote row count for `kind`. Profiles have no count endpoint.
    pub fn count(&self, kind: SyncKind) -> Option<String> {
        match kind {
            SyncKind::Secrets => Some(format!("{}/v1/sync/secrets/count", self.base)),
            SyncKind::Environments => Some(format!("{}/v1/sync/environments/count", self.base)),
            SyncKind::Profile => None,
        }
    }

    pub fn secrets(&self) -> String {
        format!("{}/v1/secrets", self.base)
    }

    pub fn secret(&self, id: &str) -> String {
        format!("{}/v1/secrets/{}", self.base, id)
    }

    pub fn environments(&self) -> String {
        format!("{}/v1/environments", self.base)
    }

    pub fn environment(&self, id: &str) -> String {
        format!("{}/v1/environments/{}", self.base, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Endpoints {
        Endpoints::new("https://api.example.com/locker_secrets/")
    }

    #[test]
    fn secrets_list_by_hash() {
        let url = endpoints().list(SyncKind::Secrets, &FetchScope::Hash("abc".into()), 12.5);
        assert_eq!(
            url,
            "https://api.example.com/locker_secrets/v1/secrets?count_secrets=1&page=1&paging=1\
             &revision_date=12.500000&size=2000&hash=abc"
        );
    }

    #[test]
    fn environments_list_all() {
        let url = endpoints().list(SyncKind::Environments, &FetchScope::All, 0.0);
        assert_eq!(
            url,
            "https://api.example.com/locker_secrets/v1/environments?count_environment=1&page=1\
             &paging=1&revision_date=0.000000&size=2000&hash="
        );
    }

    #[test]
    fn secrets_by_environment() {
        let url = endpoints().list(
            SyncKind::Secrets,
            &FetchScope::EnvironmentId("env-1".into()),
            0.0,
        );
        assert!(url.ends_with("&environment_id=env-1"));
    }

    #[test]
    fn profile_list_is_profile() {
        assert_eq!(
            endpoints().list(SyncKind::Profile, &FetchScope::All, 0.0),
            "https://api.example.com/locker_secrets/v1/profile"
        );
    }

    #[test]
    fn next_cursor_is_relative() {
        assert_eq!(
            endpoints().next_page("/v1/secrets?page=2"),
            "https://api.example.com/locker_secrets/v1/secrets?page=2"
        );
        assert_eq!(
            endpoints().next_page("https://other.example.com/v1/secrets?page=2"),
            "https://other.example.com/v1/secrets?page=2"
        );
    }

    #[test]
    fn write_urls() {
        let e = endpoints();
        assert_eq!(e.secret("s1"), "https://api.example.com/locker_secrets/v1/secrets/s1");
        assert_eq!(
            e.environment("e1"),
            "https://api.example.com/locker_secrets/v1/environments/e1"
        );
        assert!(e.count(SyncKind::Profile).is_none());
    }
}
