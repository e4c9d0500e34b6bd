mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use common::{parse_response, populated_root, site, site_with_handles};
use halfsync::auth::{CredentialForm, CredentialStore, MemoryStore, StoreError};
use halfsync::http::request::Method;
use halfsync::http::resolve::{
    LOGIN_ERROR_PAGE, LOGIN_PAGE, REGISTER_ERROR_PAGE, REGISTER_PAGE, Route, WELCOME_PAGE,
};

#[test]
fn test_form_requires_both_fields() {
    assert!(CredentialForm::parse(b"user=jin").is_none());
    assert!(CredentialForm::parse(b"password=x").is_none());
    assert!(CredentialForm::parse(b"user=&password=x").is_none());

    let form = CredentialForm::parse(b"password=p%20w&user=a+b").unwrap();
    assert_eq!(form.user, "a b");
    assert_eq!(form.password, "p w");
}

#[test]
fn test_register_conflict() {
    let store = MemoryStore::new();
    assert!(store.insert("jin", "first").unwrap());
    assert!(!store.insert("jin", "second").unwrap());

    assert_eq!(store.lookup("jin").unwrap().as_deref(), Some("first"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_concurrent_identical_registrations_create_one_entry() {
    const THREADS: usize = 16;

    let store = Arc::new(MemoryStore::new());
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.insert("racer", &format!("pw{i}")).unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_from_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.yaml");
    std::fs::write(&path, "users:\n  jin: \"123456\"\n  mia: hunter2\n").unwrap();

    let store = MemoryStore::from_yaml_file(&path).unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.lookup("jin").unwrap().as_deref(), Some("123456"));
    assert_eq!(store.lookup("nobody").unwrap(), None);
}

#[test]
fn test_store_from_missing_file() {
    let result = MemoryStore::from_yaml_file("/nonexistent/users.yaml");
    assert!(matches!(result, Err(StoreError::Read { .. })));
}

#[test]
fn test_route_selection() {
    assert_eq!(Route::select(Method::POST, "/2CGISQL.cgi"), Route::Login);
    assert_eq!(Route::select(Method::POST, "/3CGISQL.cgi"), Route::Register);
    assert_eq!(Route::select(Method::GET, "/2CGISQL.cgi"), Route::File);
    assert_eq!(Route::select(Method::GET, "/0"), Route::Page(REGISTER_PAGE));
    assert_eq!(Route::select(Method::GET, "/1"), Route::Page(LOGIN_PAGE));
    assert_eq!(Route::select(Method::GET, "/judge.html"), Route::File);
}

#[test]
fn test_login_pages() {
    let root = populated_root();
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_users([("jin", "1234")]));
    let site = site(root.path(), store);

    let ok = site
        .resolve(Method::POST, "/2CGISQL.cgi", b"user=jin&password=1234")
        .unwrap();
    assert!(ok.path.ends_with(WELCOME_PAGE.trim_start_matches('/')));

    let wrong = site
        .resolve(Method::POST, "/2CGISQL.cgi", b"user=jin&password=nope")
        .unwrap();
    assert!(wrong.path.ends_with(LOGIN_ERROR_PAGE.trim_start_matches('/')));

    let unknown = site
        .resolve(Method::POST, "/2CGISQL.cgi", b"user=ghost&password=1234")
        .unwrap();
    assert!(unknown.path.ends_with(LOGIN_ERROR_PAGE.trim_start_matches('/')));
}

#[test]
fn test_registration_pages() {
    let root = populated_root();
    let store = Arc::new(MemoryStore::new());
    let site = site(root.path(), store.clone());

    let first = site
        .resolve(Method::POST, "/3CGISQL.cgi", b"user=new&password=pw")
        .unwrap();
    assert!(first.path.ends_with(LOGIN_PAGE.trim_start_matches('/')));
    assert_eq!(store.lookup("new").unwrap().as_deref(), Some("pw"));

    let again = site
        .resolve(Method::POST, "/3CGISQL.cgi", b"user=new&password=other")
        .unwrap();
    assert!(again.path.ends_with(REGISTER_ERROR_PAGE.trim_start_matches('/')));
    assert_eq!(store.lookup("new").unwrap().as_deref(), Some("pw"));
}

struct BrokenStore;

impl CredentialStore for BrokenStore {
    fn lookup(&self, _: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("offline".to_string()))
    }

    fn insert(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("offline".to_string()))
    }
}

#[test]
fn test_store_failure_is_failed_login() {
    let root = populated_root();
    let site = site(root.path(), Arc::new(BrokenStore));

    let login = site
        .resolve(Method::POST, "/2", b"user=jin&password=1234")
        .unwrap();
    assert!(login.path.ends_with(LOGIN_ERROR_PAGE.trim_start_matches('/')));

    let register = site
        .resolve(Method::POST, "/3", b"user=jin&password=1234")
        .unwrap();
    assert!(register.path.ends_with(REGISTER_ERROR_PAGE.trim_start_matches('/')));
}

#[test]
fn test_credential_handle_returned_after_store_failure() {
    let root = populated_root();
    let site = site_with_handles(root.path(), Arc::new(BrokenStore), 1);
    assert_eq!(site.root(), root.path());

    for _ in 0..3 {
        let login = site
            .resolve(Method::POST, "/2CGISQL.cgi", b"user=jin&password=1234")
            .unwrap();
        assert!(login.path.ends_with(LOGIN_ERROR_PAGE.trim_start_matches('/')));
        assert_eq!(site.credentials().available(), site.credentials().capacity());
    }

    let register = site
        .resolve(Method::POST, "/3CGISQL.cgi", b"user=jin&password=1234")
        .unwrap();
    assert!(register.path.ends_with(REGISTER_ERROR_PAGE.trim_start_matches('/')));
    assert_eq!(site.credentials().available(), 1);
}

#[test]
fn test_exhausted_credential_handles_fail_the_form() {
    let root = populated_root();
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_users([("jin", "1234")]));
    let site = site_with_handles(root.path(), store, 1);

    let held = site.credentials().try_acquire().unwrap();
    assert_eq!(site.credentials().available(), 0);

    let started = Instant::now();
    let login = site
        .resolve(Method::POST, "/2CGISQL.cgi", b"user=jin&password=1234")
        .unwrap();
    assert!(login.path.ends_with(LOGIN_ERROR_PAGE.trim_start_matches('/')));

    let register = site
        .resolve(Method::POST, "/3CGISQL.cgi", b"user=new&password=pw")
        .unwrap();
    assert!(register.path.ends_with(REGISTER_ERROR_PAGE.trim_start_matches('/')));
    assert!(started.elapsed() < Duration::from_secs(5));

    // With the handle back the same login succeeds.
    drop(held);
    let login = site
        .resolve(Method::POST, "/2CGISQL.cgi", b"user=jin&password=1234")
        .unwrap();
    assert!(login.path.ends_with(WELCOME_PAGE.trim_start_matches('/')));
}

#[test]
fn test_waiting_login_gets_released_handle() {
    let root = populated_root();
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_users([("jin", "1234")]));
    let credentials = halfsync::auth::CredentialPool::for_store(store, 1, Duration::from_secs(5));
    let site = Arc::new(halfsync::http::resolve::DocRoot::new(root.path(), credentials));

    let held = site.credentials().try_acquire().unwrap();
    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            site.resolve(Method::POST, "/2CGISQL.cgi", b"user=jin&password=1234")
                .unwrap()
        });
        thread::sleep(Duration::from_millis(50));
        drop(held);

        let login = waiter.join().unwrap();
        assert!(login.path.ends_with(WELCOME_PAGE.trim_start_matches('/')));
    });
}

#[test]
fn test_login_page_over_connection() {
    use halfsync::http::connection::{HttpConnection, Readiness};

    let root = populated_root();
    let mut conn = HttpConnection::new(
        common::MockStream::new(),
        "127.0.0.1:1".parse().unwrap(),
        site(root.path(), common::empty_store()),
    );
    conn.stream_mut().push(b"GET /1 HTTP/1.1\r\n\r\n");
    conn.run(Readiness::Read);

    assert_eq!(
        parse_response(&conn.stream().output).body,
        b"<html>login</html>"
    );
}
