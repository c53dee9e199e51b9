//! Lazy pagination over provider listing endpoints.
//!
//! Two continuation styles exist:
//!
//! - `BodyCursor`: every page carries the absolute URL of the next page (or
//!   null). Only a null cursor ends the listing; empty pages do not.
//! - `LinkHeader`: a `rel="next"` entry in the `Link` response header
//!   continues the listing. A missing relation or an empty page ends it.

use crate::error::PaginationError;
use crate::model::RegistryEntry;
use async_trait::async_trait;
use futures::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationStyle {
    BodyCursor,
    LinkHeader,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Next(String),
    End,
}

impl PageCursor {
    /// Cursor from a body `next` field. Null and empty strings terminate.
    pub fn from_body(next: Option<String>) -> Self {
        match next {
            Some(url) if !url.trim().is_empty() => PageCursor::Next(url),
            _ => PageCursor::End,
        }
    }

    /// Cursor from a `Link` header value.
    pub fn from_link_header(header: Option<&str>) -> Self {
        match header.and_then(next_link) {
            Some(url) => PageCursor::Next(url),
            None => PageCursor::End,
        }
    }
}

/// One decoded page.
#[derive(Debug, Clone)]
pub struct Page {
    pub entries: Vec<RegistryEntry>,
    pub next: PageCursor,
}

/// Something that can fetch and decode a single listing page.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn style(&self) -> PaginationStyle;

    async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError>;
}

/// Stream of entry batches, one per page, starting at `first`.
///
/// Pages are fetched strictly in sequence. The stream ends after the first
/// error.
pub fn paginate<S>(
    source: &S,
    first: String,
) -> impl Stream<Item = Result<Vec<RegistryEntry>, PaginationError>> + Send + '_
where
    S: PageSource + ?Sized,
{
    async_stream::try_stream! {
        let style = source.style();
        let mut cursor = PageCursor::Next(first);

        while let PageCursor::Next(url) = cursor {
            let page = source.fetch_page(&url).await?;

            if style == PaginationStyle::LinkHeader && page.entries.is_empty() {
                tracing::debug!(url = %url, "Empty page ends listing");
                break;
            }

            if page.next == PageCursor::Next(url.clone()) {
                Err::<(), _>(PaginationError::CursorLoop { url: url.clone() })?;
            }

            cursor = page.next;
            yield page.entries;
        }
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut parts = link.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"').split_whitespace().any(|r| r == "next"))
                .unwrap_or(false)
        });

        if is_next {
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages keyed by URL and records every request.
    struct CannedPages {
        style: PaginationStyle,
        pages: HashMap<String, Result<Page, String>>,
        requests: Mutex<Vec<String>>,
    }

    impl CannedPages {
        fn new(style: PaginationStyle) -> Self {
            Self {
                style,
                pages: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn page(mut self, url: &str, names: &[&str], next: Option<&str>) -> Self {
            let page = Page {
                entries: names.iter().map(|n| RegistryEntry::tagged(*n)).collect(),
                next: match next {
                    Some(n) => PageCursor::Next(n.to_string()),
                    None => PageCursor::End,
                },
            };
            self.pages.insert(url.to_string(), Ok(page));
            self
        }

        fn error(mut self, url: &str, message: &str) -> Self {
            self.pages.insert(url.to_string(), Err(message.to_string()));
            self
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for CannedPages {
        fn style(&self) -> PaginationStyle {
            self.style
        }

        async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError> {
            self.requests.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(Ok(page)) => Ok(page.clone()),
                Some(Err(message)) => Err(PaginationError::ErrorBody {
                    url: url.to_string(),
                    message: message.clone(),
                }),
                None => panic!("unexpected request for {url}"),
            }
        }
    }

    async fn collect(source: &CannedPages) -> Vec<Result<Vec<RegistryEntry>, PaginationError>> {
        paginate(source, "p1".to_string()).collect().await
    }

    #[tokio::test]
    async fn test_body_cursor_yields_every_page() {
        let source = CannedPages::new(PaginationStyle::BodyCursor)
            .page("p1", &["a", "b"], Some("p2"))
            .page("p2", &["c"], Some("p3"))
            .page("p3", &["d"], None);

        let batches = collect(&source).await;

        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.is_ok()));
        assert_eq!(source.requests(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_body_cursor_continues_past_empty_page() {
        let source = CannedPages::new(PaginationStyle::BodyCursor)
            .page("p1", &[], Some("p2"))
            .page("p2", &["a"], None);

        let batches = collect(&source).await;

        assert_eq!(batches.len(), 2);
        assert!(batches[0].as_ref().unwrap().is_empty());
        assert_eq!(batches[1].as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_link_header_yields_every_page() {
        let source = CannedPages::new(PaginationStyle::LinkHeader)
            .page("p1", &["a"], Some("p2"))
            .page("p2", &["b"], None);

        let batches = collect(&source).await;

        assert_eq!(batches.len(), 2);
        assert_eq!(source.requests(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_link_header_stops_on_empty_page() {
        let source = CannedPages::new(PaginationStyle::LinkHeader)
            .page("p1", &["a"], Some("p2"))
            .page("p2", &[], Some("p3"));

        let batches = collect(&source).await;

        assert_eq!(batches.len(), 1);
        assert_eq!(source.requests(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_error_page_ends_stream() {
        let source = CannedPages::new(PaginationStyle::BodyCursor)
            .page("p1", &["a"], Some("p2"))
            .error("p2", "Rate limit exceeded");

        let batches = collect(&source).await;

        assert_eq!(batches.len(), 2);
        assert!(batches[0].is_ok());
        assert!(matches!(
            batches[1],
            Err(PaginationError::ErrorBody { ref message, .. }) if message == "Rate limit exceeded"
        ));
    }

    #[tokio::test]
    async fn test_self_referencing_cursor_is_an_error() {
        let source = CannedPages::new(PaginationStyle::BodyCursor).page("p1", &["a"], Some("p1"));

        let batches = collect(&source).await;

        assert_eq!(batches.len(), 1);
        assert!(matches!(batches[0], Err(PaginationError::CursorLoop { .. })));
    }

    #[test]
    fn test_next_link_parsing() {
        let header = r#"<https://api.github.com/orgs/acme/packages/container/api/versions?page=2>; rel="next", <https://api.github.com/orgs/acme/packages/container/api/versions?page=5>; rel="last""#;
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://api.github.com/orgs/acme/packages/container/api/versions?page=2")
        );

        let last_only = r#"<https://example.com/?page=1>; rel="prev", <https://example.com/?page=1>; rel="first""#;
        assert_eq!(next_link(last_only), None);

        assert_eq!(PageCursor::from_link_header(None), PageCursor::End);
    }

    #[test]
    fn test_body_cursor_parsing() {
        assert_eq!(PageCursor::from_body(None), PageCursor::End);
        assert_eq!(PageCursor::from_body(Some(String::new())), PageCursor::End);
        assert_eq!(
            PageCursor::from_body(Some("https://hub.example/?page=2".to_string())),
            PageCursor::Next("https://hub.example/?page=2".to_string())
        );
    }
}
