//! Line sub-machine.
//!
//! Finds CRLF-terminated lines in a buffer that keeps growing between calls.
//! The scan cursor survives across calls, so a terminator split over two
//! socket reads is still recognized.

use std::ops::Range;

/// Result of scanning for the next line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineStatus {
    /// A complete line; the range excludes the `\r\n`.
    Ok(Range<usize>),
    /// A bare `\n`, or a `\r` followed by anything other than `\n`.
    Bad,
    /// No terminator yet; call again once more bytes arrived.
    Open,
}

/// Scans `buf` from `*checked` for the line that starts at `start`.
///
/// On [`LineStatus::Ok`] the cursor moves past the terminator. On
/// [`LineStatus::Open`] it stops on the last unexamined byte, which is a
/// trailing `\r` when the terminator is cut in half.
pub fn parse_line(buf: &[u8], start: usize, checked: &mut usize) -> LineStatus {
    while *checked < buf.len() {
        match buf[*checked] {
            b'\r' => {
                let Some(&next) = buf.get(*checked + 1) else {
                    return LineStatus::Open;
                };
                if next != b'\n' {
                    return LineStatus::Bad;
                }
                let end = *checked;
                *checked += 2;
                return LineStatus::Ok(start..end);
            }
            b'\n' => return LineStatus::Bad,
            _ => *checked += 1,
        }
    }
    LineStatus::Open
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_terminator_is_reentrant() {
        let full = b"GET / HTTP/1.1\r\n";
        let mut checked = 0;

        // Everything up to and including the '\r'.
        let cut = full.len() - 1;
        assert_eq!(parse_line(&full[..cut], 0, &mut checked), LineStatus::Open);
        assert_eq!(checked, cut - 1);

        assert_eq!(
            parse_line(full, 0, &mut checked),
            LineStatus::Ok(0..full.len() - 2)
        );
        assert_eq!(checked, full.len());
    }

    #[test]
    fn bare_line_feed_is_bad() {
        let mut checked = 0;
        assert_eq!(parse_line(b"Host: x\n", 0, &mut checked), LineStatus::Bad);
    }

    #[test]
    fn carriage_return_without_line_feed_is_bad() {
        let mut checked = 0;
        assert_eq!(parse_line(b"Host\rx", 0, &mut checked), LineStatus::Bad);
    }

    #[test]
    fn empty_line_is_ok() {
        let mut checked = 0;
        assert_eq!(parse_line(b"\r\n", 0, &mut checked), LineStatus::Ok(0..0));
    }
}
