use crate::http::mapped::MappedFile;

/// HTTP status codes produced by the server.
///
/// - `Ok` (200): File served
/// - `BadRequest` (400): Malformed request, or the target is a directory
/// - `Forbidden` (403): File is not world-readable
/// - `NotFound` (404): No such file under the document root
/// - `InternalServerError` (500): Opening or mapping the file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use halfsync::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    /// Canned page sent with an error status.
    pub fn error_page(&self) -> &'static str {
        match self {
            StatusCode::Ok => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalServerError => {
                "There was an unusual problem serving the requested file.\n"
            }
        }
    }
}

/// Body sent in place of an empty file, which cannot be mapped.
pub const EMPTY_FILE_BODY: &str = "<html><body></body></html>";

/// Where the response body comes from.
#[derive(Debug)]
pub enum Body {
    /// Small static text copied into the header buffer.
    Inline(&'static str),
    /// A mapped file sent as its own output segment.
    Mapped(MappedFile),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Inline(text) => text.len(),
            Body::Mapped(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A response ready to be serialized by the writer.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Value of the `Content-Type` header
    pub content_type: &'static str,
    /// Response body
    pub body: Body,
}

impl Response {
    /// Error page for `status`.
    pub fn error(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/html",
            body: Body::Inline(status.error_page()),
        }
    }

    /// 200 response for a resolved file; `None` stands for an empty file.
    pub fn file(mapped: Option<MappedFile>, content_type: &'static str) -> Self {
        let body = match mapped {
            Some(file) => Body::Mapped(file),
            None => Body::Inline(EMPTY_FILE_BODY),
        };
        Self {
            status: StatusCode::Ok,
            content_type,
            body,
        }
    }
}
