//! Request resolution against the document root.
//!
//! A handful of targets are routed by the first byte of their last path
//! segment before any file lookup happens:
//!
//! | selector | method | effect                                         |
//! |----------|--------|------------------------------------------------|
//! | `2`      | POST   | login check, then welcome or login error page  |
//! | `3`      | POST   | registration, then login or register error page|
//! | `0`      | any    | register page                                  |
//! | `1`      | any    | login page                                     |
//! | `5`      | any    | picture page                                   |
//! | `6`      | any    | video page                                     |
//! | `7`      | any    | fans page                                      |
//!
//! Everything else is a file path under the root.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{CredentialForm, CredentialPool};
use crate::http::mapped::MappedFile;
use crate::http::mime;
use crate::http::request::Method;
use crate::http::response::StatusCode;

pub const REGISTER_PAGE: &str = "/register.html";
pub const LOGIN_PAGE: &str = "/login.html";
pub const WELCOME_PAGE: &str = "/welcome.html";
pub const LOGIN_ERROR_PAGE: &str = "/loginError.html";
pub const REGISTER_ERROR_PAGE: &str = "/registerError.html";
pub const PICTURE_PAGE: &str = "/picture.html";
pub const VIDEO_PAGE: &str = "/video.html";
pub const FANS_PAGE: &str = "/fans.html";

/// World-readable permission bit.
const S_IROTH: u32 = 0o004;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no such resource")]
    NotFound,
    #[error("resource is not readable")]
    Forbidden,
    #[error("resource is a directory")]
    IsDirectory,
    #[error("path escapes the document root")]
    Traversal,
    #[error("failed to open resource: {0}")]
    Internal(#[from] io::Error),
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::NotFound => StatusCode::NotFound,
            ResolveError::Forbidden => StatusCode::Forbidden,
            ResolveError::IsDirectory | ResolveError::Traversal => StatusCode::BadRequest,
            ResolveError::Internal(_) => StatusCode::InternalServerError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Page(&'static str),
    File,
}

impl Route {
    pub fn select(method: Method, path: &str) -> Self {
        let selector = path.rsplit('/').next().and_then(|segment| segment.bytes().next());
        match (method, selector) {
            (Method::POST, Some(b'2')) => Route::Login,
            (Method::POST, Some(b'3')) => Route::Register,
            (_, Some(b'0')) => Route::Page(REGISTER_PAGE),
            (_, Some(b'1')) => Route::Page(LOGIN_PAGE),
            (_, Some(b'5')) => Route::Page(PICTURE_PAGE),
            (_, Some(b'6')) => Route::Page(VIDEO_PAGE),
            (_, Some(b'7')) => Route::Page(FANS_PAGE),
            _ => Route::File,
        }
    }
}

/// A file ready to be served.
#[derive(Debug)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// `None` for an empty file.
    pub map: Option<MappedFile>,
    pub content_type: &'static str,
}

/// Document root plus the pooled credential handles behind the form pages.
pub struct DocRoot {
    root: PathBuf,
    credentials: CredentialPool,
}

impl DocRoot {
    pub fn new(root: impl Into<PathBuf>, credentials: CredentialPool) -> Self {
        Self {
            root: root.into(),
            credentials,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    /// Routes the request, runs any credential action, and opens the
    /// resulting file.
    pub fn resolve(
        &self,
        method: Method,
        path: &str,
        body: &[u8],
    ) -> Result<ResolvedFile, ResolveError> {
        let effective = match Route::select(method, path) {
            Route::Login => self.login(body),
            Route::Register => self.register(body),
            Route::Page(page) => page,
            Route::File => path,
        };
        self.open(effective)
    }

    /// Maps `path` (absolute, relative to the root) read-only.
    pub fn open(&self, path: &str) -> Result<ResolvedFile, ResolveError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(ResolveError::Traversal);
        }

        let full = self.root.join(relative);
        let meta = fs::metadata(&full).map_err(|_| ResolveError::NotFound)?;

        if meta.permissions().mode() & S_IROTH == 0 {
            return Err(ResolveError::Forbidden);
        }
        if meta.is_dir() {
            return Err(ResolveError::IsDirectory);
        }

        let file = File::open(&full).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ResolveError::Forbidden,
            _ => ResolveError::Internal(e),
        })?;
        let map = if meta.len() == 0 {
            None
        } else {
            Some(MappedFile::map(&file)?)
        };

        let content_type = mime::from_path(&full);
        Ok(ResolvedFile {
            path: full,
            map,
            content_type,
        })
    }

    fn login(&self, body: &[u8]) -> &'static str {
        let Some(form) = CredentialForm::parse(body) else {
            debug!("login form incomplete");
            return LOGIN_ERROR_PAGE;
        };

        let Some(store) = self.credentials.acquire() else {
            warn!(user = %form.user, "no credential handle free, login refused");
            return LOGIN_ERROR_PAGE;
        };
        match store.lookup(&form.user) {
            Ok(Some(password)) if password == form.password => WELCOME_PAGE,
            Ok(_) => LOGIN_ERROR_PAGE,
            Err(e) => {
                warn!(user = %form.user, error = %e, "credential lookup failed");
                LOGIN_ERROR_PAGE
            }
        }
    }

    fn register(&self, body: &[u8]) -> &'static str {
        let Some(form) = CredentialForm::parse(body) else {
            debug!("registration form incomplete");
            return REGISTER_ERROR_PAGE;
        };

        let Some(store) = self.credentials.acquire() else {
            warn!(user = %form.user, "no credential handle free, registration refused");
            return REGISTER_ERROR_PAGE;
        };
        match store.insert(&form.user, &form.password) {
            Ok(true) => LOGIN_PAGE,
            Ok(false) => {
                debug!(user = %form.user, "username already registered");
                REGISTER_ERROR_PAGE
            }
            Err(e) => {
                warn!(user = %form.user, error = %e, "credential insert failed");
                REGISTER_ERROR_PAGE
            }
        }
    }
}
