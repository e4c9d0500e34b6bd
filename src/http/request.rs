/// HTTP request methods accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// GET - Retrieve a resource
    #[default]
    GET,
    /// POST - Submit a form (login and registration)
    POST,
}

impl Method {
    /// Parses a method token, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use halfsync::http::request::Method;
    /// assert_eq!(Method::from_bytes(b"GET"), Some(Method::GET));
    /// assert_eq!(Method::from_bytes(b"post"), Some(Method::POST));
    /// assert_eq!(Method::from_bytes(b"PUT"), None);
    /// ```
    pub fn from_bytes(token: &[u8]) -> Option<Self> {
        if token.eq_ignore_ascii_case(b"GET") {
            Some(Method::GET)
        } else if token.eq_ignore_ascii_case(b"POST") {
            Some(Method::POST)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Fields extracted from the request line and the recognized headers.
///
/// The body is not copied here; it stays in the connection's read buffer
/// and is exposed as a slice by the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHead {
    /// The HTTP method
    pub method: Method,
    /// Normalized target path, always starting with `/`
    pub path: String,
    /// Value of the `Host` header, if sent
    pub host: Option<String>,
    /// Declared body length (`Content-Length`), zero when absent
    pub content_length: usize,
    /// `Connection: keep-alive` was requested
    pub keep_alive: bool,
}
