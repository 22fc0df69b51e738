//! Utility functions for file naming, path handling and date parsing

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// Suffix appended to a destination while its transfer is in progress
pub const PARTIAL_SUFFIX: &str = ".part";

/// Split a media URL into `(filename, extension)`
///
/// The filename is the last path segment with the query string and any
/// `:size` style suffix (`photo.jpg:large`) removed. The extension is the
/// text after the final dot, or empty when there is none.
///
/// # Examples
///
/// ```
/// use tweetlikes_dl::utils::split_media_filename;
///
/// let (name, ext) = split_media_filename("https://video.example/vid/720x1280/clip.mp4?tag=12");
/// assert_eq!(name, "clip.mp4");
/// assert_eq!(ext, "mp4");
/// ```
pub fn split_media_filename(url: &str) -> (String, String) {
    let segment = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        Err(_) => {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            without_query
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        }
    };

    let filename = match segment.split_once(':') {
        Some((name, _suffix)) => name.to_string(),
        None => segment,
    };

    let extension = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_string(),
        _ => String::new(),
    };

    (filename, extension)
}

/// Make a value safe to use as a single path component
///
/// Path separators are replaced with `_`, and the special names `.` and
/// `..` are neutralised so a token can never climb out of its directory.
pub fn sanitize_component(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match replaced.as_str() {
        "" => "_".to_string(),
        "." | ".." => replaced.replace('.', "_"),
        _ => replaced,
    }
}

/// Path a transfer writes to before it is moved onto `destination`
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

/// Which side of a time window a user-supplied date bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateBound {
    /// Oldest instant to include; a bare date means its first second
    Lower,
    /// Newest instant to include; a bare date means its last second
    Upper,
}

/// Parse a date given on the command line
///
/// Accepted forms, all interpreted as UTC unless an offset is given:
/// - RFC 3339 (`2021-03-04T05:06:07+09:00`)
/// - `YYYY-MM-DD HH:MM:SS`
/// - `YYYY-MM-DD`, which covers the whole day for an upper bound
pub fn parse_date_bound(input: &str, bound: DateBound) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let time = match bound {
            DateBound::Lower => NaiveTime::MIN,
            DateBound::Upper => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN),
        };
        return Ok(Utc.from_utc_datetime(&date.and_time(time)));
    }

    Err(Error::config(
        "date",
        format!("could not parse date '{input}' (expected YYYY-MM-DD, YYYY-MM-DD HH:MM:SS or RFC 3339)"),
    ))
}
