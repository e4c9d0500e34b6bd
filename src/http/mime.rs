//! Content type lookup by file extension.

use std::path::Path;

/// Content type for `path`, falling back to `application/octet-stream`.
///
/// # Example
///
/// ```
/// # use halfsync::http::mime;
/// # use std::path::Path;
/// assert_eq!(mime::from_path(Path::new("root/index.HTML")), "text/html");
/// assert_eq!(mime::from_path(Path::new("root/blob")), "application/octet-stream");
/// ```
pub fn from_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return "application/octet-stream";
    };

    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
