//! Authentication token lifecycle for the UCS management API.
//!
//! One token is live at a time. It is acquired by login, reused while
//! young, refreshed past the threshold, and discarded whenever the API
//! rejects it. The persisted copy survives process restarts so a still
//! valid session is reused instead of re-authenticating on startup.

use crate::error::UcsError;
use crate::transport::UcsTransport;
use crate::xml;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Reuse window for a cached token. UCS sessions live two hours server
/// side; refreshing after one leaves margin.
pub const REFRESH_THRESHOLD_SECS: u64 = 3600;

/// Storage for the single shared token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> io::Result<Option<String>>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn delete(&self) -> io::Result<()>;
}

/// Token persisted as one file at a fixed path.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim().to_string();
                Ok(if token.is_empty() { None } else { Some(token) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        // The default path lives under /var/lib; the directory may not
        // exist yet on a fresh host.
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token)
    }

    fn delete(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-memory store for tests and deployments that must not share a
/// token file across instances.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.slot.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn delete(&self) -> io::Result<()> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}

/// Login identity. The password lives in a file and is read fresh on
/// every login/refresh, never cached in memory beyond one exchange.
pub struct Credentials {
    pub domain: Option<String>,
    pub username: String,
    pub password_file: PathBuf,
}

impl Credentials {
    /// `domain\username`, or the bare username when no domain is
    /// configured.
    pub fn qualified_name(&self) -> String {
        match &self.domain {
            Some(domain) if !domain.is_empty() => format!("{}\\{}", domain, self.username),
            _ => self.username.clone(),
        }
    }

    fn read_password(&self) -> io::Result<String> {
        Ok(fs::read_to_string(&self.password_file)?.trim().to_string())
    }
}

/// Owns the token slot: acquire, refresh, invalidate.
pub struct TokenManager {
    store: Box<dyn TokenStore>,
    transport: Arc<dyn UcsTransport>,
    credentials: Credentials,
}

/// Seconds since the epoch embedded in a `<epoch>/<opaque>` token.
fn embedded_epoch(token: &str) -> Option<u64> {
    token.split('/').next()?.parse().ok()
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TokenManager {
    pub fn new(
        store: Box<dyn TokenStore>,
        transport: Arc<dyn UcsTransport>,
        credentials: Credentials,
    ) -> Self {
        Self {
            store,
            transport,
            credentials,
        }
    }

    /// Return a usable token, logging in or refreshing as needed.
    ///
    /// A token whose age is within the threshold is reused as is; exactly
    /// at the threshold still counts as fresh. Older (or unparsable)
    /// tokens go through a refresh exchange, falling back to a clean
    /// login when the refresh is rejected.
    pub fn acquire(&self, host: &str) -> Result<String, UcsError> {
        if let Some(token) = self.store.load()? {
            let age = embedded_epoch(&token).map(|epoch| now_epoch().saturating_sub(epoch));
            match age {
                Some(age) if age <= REFRESH_THRESHOLD_SECS => {
                    debug!(age, "reusing cached UCS token");
                    return Ok(token);
                }
                _ => match self.refresh(host, &token) {
                    Ok(refreshed) => return Ok(refreshed),
                    Err(e) => {
                        warn!(host, "UCS token refresh failed, logging in again: {e}");
                        self.store.delete()?;
                    }
                },
            }
        }
        self.login(host)
    }

    /// Drop the current token after the API rejected it. The logout is
    /// fire-and-forget; a failed logout is only logged.
    pub fn invalidate(&self, host: &str) {
        if let Ok(Some(token)) = self.store.load() {
            if let Err(e) = self.transport.call(host, &xml::aaa_logout(&token)) {
                warn!(host, "UCS logout failed: {e}");
            }
        }
        if let Err(e) = self.store.delete() {
            warn!("failed to delete persisted UCS token: {e}");
        }
    }

    fn login(&self, host: &str) -> Result<String, UcsError> {
        let password = self.credentials.read_password()?;
        let body = xml::aaa_login(&self.credentials.qualified_name(), &password);
        let response = self.transport.call(host, &body)?;
        let token = self.store_session(&response)?;
        info!(host, "logged in to UCS");
        Ok(token)
    }

    fn refresh(&self, host: &str, old_token: &str) -> Result<String, UcsError> {
        let password = self.credentials.read_password()?;
        let body = xml::aaa_refresh(&self.credentials.qualified_name(), &password, old_token);
        let response = self.transport.call(host, &body)?;
        let token = self.store_session(&response)?;
        info!(host, "refreshed UCS token");
        Ok(token)
    }

    /// Validate a login/refresh response and persist its cookie.
    fn store_session(&self, response: &str) -> Result<String, UcsError> {
        if let Some(code) = xml::error_code(response) {
            return Err(UcsError::LoginRejected(code));
        }
        let token = xml::out_cookie(response).ok_or(UcsError::MissingCookie)?;
        self.store.save(&token)?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Transport that records request bodies and answers from a closure.
    struct FakeTransport {
        calls: Mutex<Vec<String>>,
        respond: Box<dyn Fn(&str) -> String + Send + Sync>,
    }

    impl FakeTransport {
        fn new(respond: impl Fn(&str) -> String + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl UcsTransport for FakeTransport {
        fn call(&self, _host: &str, body: &str) -> Result<String, UcsError> {
            self.calls.lock().unwrap().push(body.to_string());
            Ok((self.respond)(body))
        }
    }

    fn password_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "testPassword").unwrap();
        file
    }

    fn manager(transport: Arc<FakeTransport>, password: &tempfile::NamedTempFile) -> TokenManager {
        TokenManager::new(
            Box::new(MemoryTokenStore::default()),
            transport,
            Credentials {
                domain: Some("testDomain".to_string()),
                username: "testUsername".to_string(),
                password_file: password.path().to_path_buf(),
            },
        )
    }

    fn manager_with_store(
        store: MemoryTokenStore,
        transport: Arc<FakeTransport>,
        password: &tempfile::NamedTempFile,
    ) -> TokenManager {
        TokenManager::new(
            Box::new(store),
            transport,
            Credentials {
                domain: Some("testDomain".to_string()),
                username: "testUsername".to_string(),
                password_file: password.path().to_path_buf(),
            },
        )
    }

    fn preloaded_store(token: &str) -> MemoryTokenStore {
        let store = MemoryTokenStore::default();
        store.save(token).unwrap();
        store
    }

    fn cookie_response(cookie: &str) -> String {
        format!(r#"<aaaLogin response="yes" outCookie="{cookie}"> </aaaLogin>"#)
    }

    #[test]
    fn test_acquire_logs_in_when_absent() {
        let now = now_epoch();
        let fresh = format!("{now}/fresh-cookie");
        let response = cookie_response(&fresh);
        let transport = FakeTransport::new(move |_| response.clone());
        let password = password_file();
        let mgr = manager(transport.clone(), &password);

        let token = mgr.acquire("1.1.1.1").unwrap();
        assert_eq!(token, fresh);
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(r#"inName="testDomain\testUsername""#));
        assert!(calls[0].contains(r#"inPassword="testPassword""#));
    }

    #[test]
    fn test_acquire_reuses_token_at_exact_threshold() {
        let epoch = now_epoch() - REFRESH_THRESHOLD_SECS;
        let token = format!("{epoch}/still-good");
        let transport = FakeTransport::new(|_| panic!("no API call expected"));
        let password = password_file();
        let mgr = manager_with_store(preloaded_store(&token), transport.clone(), &password);

        assert_eq!(mgr.acquire("1.1.1.1").unwrap(), token);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_acquire_refreshes_one_second_past_threshold() {
        let epoch = now_epoch() - REFRESH_THRESHOLD_SECS - 1;
        let stale = format!("{epoch}/stale-cookie");
        let now = now_epoch();
        let renewed = format!("{now}/renewed-cookie");
        let response = cookie_response(&renewed);
        let transport = FakeTransport::new(move |_| response.clone());
        let password = password_file();
        let mgr = manager_with_store(preloaded_store(&stale), transport.clone(), &password);

        assert_eq!(mgr.acquire("1.1.1.1").unwrap(), renewed);
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("<aaaRefresh"));
        assert!(calls[0].contains(&format!(r#"inCookie="{stale}""#)));
    }

    #[test]
    fn test_refresh_rejection_falls_back_to_login() {
        let epoch = now_epoch() - REFRESH_THRESHOLD_SECS - 100;
        let stale = format!("{epoch}/stale-cookie");
        let now = now_epoch();
        let renewed = format!("{now}/login-cookie");
        let login_response = cookie_response(&renewed);
        let transport = FakeTransport::new(move |body| {
            if body.starts_with("<aaaRefresh") {
                r#"<aaaRefresh errorCode="552" errorDescr="Authorization required"> </aaaRefresh>"#
                    .to_string()
            } else {
                login_response.clone()
            }
        });
        let password = password_file();
        let mgr = manager_with_store(preloaded_store(&stale), transport.clone(), &password);

        assert_eq!(mgr.acquire("1.1.1.1").unwrap(), renewed);
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("<aaaRefresh"));
        assert!(calls[1].starts_with("<aaaLogin"));
    }

    #[test]
    fn test_unparsable_epoch_counts_as_stale() {
        let now = now_epoch();
        let renewed = format!("{now}/renewed-cookie");
        let response = cookie_response(&renewed);
        let transport = FakeTransport::new(move |_| response.clone());
        let password = password_file();
        let mgr = manager_with_store(preloaded_store("not-a-token"), transport.clone(), &password);

        assert_eq!(mgr.acquire("1.1.1.1").unwrap(), renewed);
        assert!(transport.calls()[0].starts_with("<aaaRefresh"));
    }

    #[test]
    fn test_invalidate_logs_out_and_deletes() {
        let token = format!("{}/doomed-cookie", now_epoch());
        let transport =
            FakeTransport::new(|_| r#"<aaaLogout response="yes"> </aaaLogout>"#.to_string());
        let password = password_file();
        let store = preloaded_store(&token);
        let mgr = manager_with_store(store, transport.clone(), &password);

        mgr.invalidate("1.1.1.1");
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("<aaaLogout"));
        assert!(calls[0].contains(&format!(r#"inCookie="{token}""#)));

        // Next acquire starts from absent and goes through login. The fake
        // answers with a logout body, which carries no cookie, so the login
        // is rejected rather than silently reusing the dropped token.
        assert!(matches!(
            mgr.acquire("1.1.1.1"),
            Err(UcsError::MissingCookie)
        ));
        assert!(transport.calls()[1].starts_with("<aaaLogin"));
    }

    #[test]
    fn test_bare_username_without_domain() {
        let credentials = Credentials {
            domain: None,
            username: "svc".to_string(),
            password_file: PathBuf::from("/dev/null"),
        };
        assert_eq!(credentials.qualified_name(), "svc");
    }

    #[test]
    fn test_file_store_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("ucsfilterd/token"));
        store.save("1111/abcd").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("1111/abcd"));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token"));
        assert_eq!(store.load().unwrap(), None);
        store.save("1111/abcd").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("1111/abcd"));
        store.delete().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Deleting a missing token is not an error.
        store.delete().unwrap();
    }
}
