//! Source snippet fetcher.
//!
//! Given the script an error was raised from and the line it was raised on, the
//! fetcher downloads the script and returns a bounded window of lines around it.
//! Scripts are fetched over HTTP(S). `file://` URLs and plain filesystem paths are
//! read from disk only when a local source root has been granted, and only for files
//! inside that root.

use crate::error::{ErrorTraceError, Result};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default number of lines in a snippet window
pub const DEFAULT_SOURCE_RANGE: usize = 10;

/// One line of a fetched source snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    /// 1-based line number
    #[serde(rename = "lineNo")]
    pub line_number: usize,
    pub content: String,
}

enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

fn locate(filename: &str) -> Result<SourceLocation> {
    match Url::parse(filename) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(SourceLocation::Remote(url)),
        Ok(url) if url.scheme() == "file" => url.to_file_path().map(SourceLocation::Local).map_err(|_| {
            ErrorTraceError::SliceError(format!("not a local file path: {}", filename))
        }),
        // Relative or scheme-less names are treated as paths on disk
        _ => Ok(SourceLocation::Local(PathBuf::from(filename))),
    }
}

/// Whether `filename` names an HTTP(S) script rather than a file on disk
pub fn is_remote(filename: &str) -> bool {
    matches!(locate(filename), Ok(SourceLocation::Remote(_)))
}

/// Resolve `path` against `root`, refusing anything that lands outside it
async fn resolve_local(path: &Path, root: Option<&Path>) -> Result<PathBuf> {
    let Some(root) = root else {
        return Err(ErrorTraceError::SourceDenied(format!(
            "local reads are disabled: {}",
            path.display()
        )));
    };

    let root = tokio::fs::canonicalize(root).await?;
    if path.is_absolute() && !path.starts_with(&root) {
        return Err(ErrorTraceError::SourceDenied(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        )));
    }

    // Canonicalizing resolves `..` and symlinks before the containment check
    let resolved = tokio::fs::canonicalize(root.join(path)).await?;
    if !resolved.starts_with(&root) {
        return Err(ErrorTraceError::SourceDenied(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        )));
    }

    Ok(resolved)
}

/// Fetches script text and cuts snippet windows out of it
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
    local_root: Option<PathBuf>,
}

impl SourceFetcher {
    /// Create a fetcher with a default HTTP client
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a fetcher sharing an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            local_root: None,
        }
    }

    /// Allow local reads of files under `root`
    ///
    /// Relative filenames are resolved against `root`. Without a root every local
    /// filename is refused with [`ErrorTraceError::SourceDenied`].
    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    /// Fetch `filename` and return the lines around `line_number`
    ///
    /// # Arguments
    ///
    /// * `filename` - URL or path of the script
    /// * `line_number` - 1-based line the error was raised on
    /// * `source_range` - Size of the window
    pub async fn fetch_snippet(
        &self,
        filename: &str,
        line_number: usize,
        source_range: usize,
    ) -> Result<Vec<SourceLine>> {
        self.fetch_snippet_within(filename, line_number, source_range, self.local_root.as_deref())
            .await
    }

    /// Like [`SourceFetcher::fetch_snippet`], with local reads confined to `local_root`
    pub async fn fetch_snippet_within(
        &self,
        filename: &str,
        line_number: usize,
        source_range: usize,
        local_root: Option<&Path>,
    ) -> Result<Vec<SourceLine>> {
        let text = self.fetch_text(filename, local_root).await?;
        slice_source(&text, line_number, source_range)
    }

    async fn fetch_text(&self, filename: &str, local_root: Option<&Path>) -> Result<String> {
        let bytes = match locate(filename)? {
            SourceLocation::Remote(url) => {
                debug!("Fetching source from {}", url);
                let response = self.client.get(url).send().await?;

                if !response.status().is_success() {
                    return Err(ErrorTraceError::FetchError {
                        url: filename.to_string(),
                        status: response.status().as_u16(),
                    });
                }

                response.bytes().await?.to_vec()
            }
            SourceLocation::Local(path) => {
                let path = resolve_local(&path, local_root).await?;
                debug!("Reading source from {}", path.display());
                tokio::fs::read(&path).await?
            }
        };

        String::from_utf8(bytes).map_err(|e| ErrorTraceError::SliceError(e.to_string()))
    }
}

impl Default for SourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut the window of `source_range` lines around `line_number` out of `text`
///
/// The window covers zero-based indices `[line_number - radius, line_number + radius)`
/// with `radius = ceil(source_range / 2)`, clipped to the text. Returned line numbers
/// are 1-based.
pub fn slice_source(text: &str, line_number: usize, source_range: usize) -> Result<Vec<SourceLine>> {
    let lines: Vec<&str> = text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line)).collect();
    let radius = source_range.div_ceil(2);

    let start = line_number.saturating_sub(radius);
    let end = line_number
        .checked_add(radius)
        .ok_or_else(|| ErrorTraceError::SliceError(format!("line number out of range: {}", line_number)))?
        .min(lines.len());

    Ok(lines
        .iter()
        .enumerate()
        .take(end)
        .skip(start)
        .map(|(index, content)| SourceLine {
            line_number: index + 1,
            content: content.to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn numbered_source(count: usize, newline: &str) -> String {
        (1..=count).map(|i| format!("line {}", i)).collect::<Vec<_>>().join(newline)
    }

    #[test]
    fn test_window_around_line() {
        let text = numbered_source(200, "\n");

        let snippet = slice_source(&text, 50, 10).unwrap();

        assert_eq!(snippet.len(), 10);
        assert_eq!(snippet[0].line_number, 46);
        assert_eq!(snippet[0].content, "line 46");
        assert_eq!(snippet[9].line_number, 55);
        assert_eq!(snippet[9].content, "line 55");
    }

    #[test]
    fn test_window_clipped_at_start() {
        let text = numbered_source(200, "\n");

        let snippet = slice_source(&text, 2, 10).unwrap();

        assert_eq!(snippet[0].line_number, 1);
        assert_eq!(snippet.last().unwrap().line_number, 7);
        assert_eq!(snippet.len(), 7);
    }

    #[test]
    fn test_window_clipped_at_end() {
        let text = numbered_source(20, "\n");

        let snippet = slice_source(&text, 19, 10).unwrap();

        assert_eq!(snippet[0].line_number, 15);
        assert_eq!(snippet.last().unwrap().line_number, 20);
    }

    #[test]
    fn test_odd_range_rounds_radius_up() {
        let text = numbered_source(100, "\n");

        let snippet = slice_source(&text, 50, 7).unwrap();

        assert_eq!(snippet.len(), 8);
        assert_eq!(snippet[0].line_number, 47);
    }

    #[test]
    fn test_crlf_line_endings() {
        let text = numbered_source(30, "\r\n");

        let snippet = slice_source(&text, 10, 4).unwrap();

        assert_eq!(snippet.len(), 4);
        assert!(snippet.iter().all(|line| !line.content.ends_with('\r')));
        assert_eq!(snippet[0].content, "line 9");
    }

    #[test]
    fn test_line_past_end_returns_empty() {
        let text = numbered_source(5, "\n");

        let snippet = slice_source(&text, 50, 10).unwrap();

        assert!(snippet.is_empty());
    }

    #[test]
    fn test_overflowing_line_number_is_tagged() {
        let err = slice_source("a\nb", usize::MAX, 10).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_source_line_serializes_line_no() {
        let line = SourceLine {
            line_number: 3,
            content: "let x = 1;".to_string(),
        };
        let value = serde_json::to_value(&line).unwrap();

        assert_eq!(value, serde_json::json!({"lineNo": 3, "content": "let x = 1;"}));
    }

    #[tokio::test]
    async fn test_fetch_snippet_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/static/app.js")
            .with_status(200)
            .with_body(numbered_source(200, "\n"))
            .create();

        let fetcher = SourceFetcher::new();
        let url = format!("{}/static/app.js", server.url());
        let snippet = fetcher.fetch_snippet(&url, 50, 10).await.unwrap();

        mock.assert();
        assert_eq!(snippet.len(), 10);
        assert_eq!(snippet[4].content, "line 50");
    }

    #[tokio::test]
    async fn test_fetch_snippet_http_failure_is_tagged() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/missing.js").with_status(404).create();

        let fetcher = SourceFetcher::new();
        let url = format!("{}/missing.js", server.url());
        let err = fetcher.fetch_snippet(&url, 1, 10).await.unwrap_err();

        mock.assert();
        match &err {
            ErrorTraceError::FetchError { status, .. } => assert_eq!(*status, 404),
            other => panic!("Expected FetchError, got {:?}", other),
        }
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_slice_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/binary.js")
            .with_status(200)
            .with_body(vec![0xff, 0xfe, 0x00])
            .create();

        let fetcher = SourceFetcher::new();
        let url = format!("{}/binary.js", server.url());
        let err = fetcher.fetch_snippet(&url, 1, 10).await.unwrap_err();

        assert!(matches!(err, ErrorTraceError::SliceError(_)));
    }

    #[tokio::test]
    async fn test_fetch_snippet_from_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.rs"), numbered_source(40, "\n")).unwrap();

        let fetcher = SourceFetcher::new().with_local_root(dir.path());
        let snippet = fetcher.fetch_snippet("app.rs", 20, 4).await.unwrap();

        assert_eq!(snippet.len(), 4);
        assert_eq!(snippet[0].line_number, 19);

        let absolute = dir.path().join("app.rs");
        let snippet = fetcher
            .fetch_snippet(absolute.to_str().unwrap(), 20, 4)
            .await
            .unwrap();
        assert_eq!(snippet[0].content, "line 19");
    }

    #[tokio::test]
    async fn test_local_reads_are_refused_without_root() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", numbered_source(40, "\n")).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let fetcher = SourceFetcher::new();
        let err = fetcher.fetch_snippet(&path, 20, 4).await.unwrap_err();
        assert!(matches!(err, ErrorTraceError::SourceDenied(_)));
        assert!(err.is_transport());

        let url = format!("file://{}", path);
        let err = fetcher.fetch_snippet(&url, 20, 4).await.unwrap_err();
        assert!(matches!(err, ErrorTraceError::SourceDenied(_)));
    }

    #[tokio::test]
    async fn test_local_reads_outside_root_are_refused() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(outside.path(), "secret").unwrap();
        let fetcher = SourceFetcher::new().with_local_root(root.path());

        let err = fetcher
            .fetch_snippet(outside.path().to_str().unwrap(), 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, ErrorTraceError::SourceDenied(_)));

        let err = fetcher.fetch_snippet("/etc/passwd", 1, 10).await.unwrap_err();
        assert!(matches!(err, ErrorTraceError::SourceDenied(_)));

        std::fs::create_dir(root.path().join("src")).unwrap();
        let escape = format!(
            "src/../../{}",
            outside.path().file_name().unwrap().to_str().unwrap()
        );
        let err = fetcher.fetch_snippet(&escape, 1, 10).await.unwrap_err();
        assert!(matches!(err, ErrorTraceError::SourceDenied(_)));
    }

    #[tokio::test]
    async fn test_fetch_snippet_missing_local_file_is_tagged() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = SourceFetcher::new().with_local_root(root.path());
        let err = fetcher.fetch_snippet("src/not_shipped.rs", 1, 10).await.unwrap_err();

        assert!(matches!(err, ErrorTraceError::IoError(_)));
        assert!(err.is_transport());
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/app.js"));
        assert!(is_remote("http://localhost:8080/app.js"));
        assert!(!is_remote("src/main.rs"));
        assert!(!is_remote("file:///tmp/app.rs"));
    }
}
