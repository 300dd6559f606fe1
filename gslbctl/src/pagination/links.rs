//! `next`/`previous` links for list responses.

use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

/// Query parameters rewritten when following a link; everything else is carried over verbatim.
const CURSOR_PARAMS: [&str; 2] = ["marker", "page_reverse"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

/// Cursors of the neighbouring pages, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    /// First row of the current page; set when the request itself had a marker
    pub previous: Option<Uuid>,
    /// Last row of the current page; set when the page was full
    pub next: Option<Uuid>,
}

impl PageLinks {
    /// Render links relative to the URL of the current request.
    pub fn render(&self, request_url: &Url) -> Vec<Link> {
        let mut links = Vec::new();
        if let Some(first) = self.previous {
            links.push(Link {
                href: with_cursor(request_url, first, true).to_string(),
                rel: "previous".to_string(),
            });
        }
        if let Some(last) = self.next {
            links.push(Link {
                href: with_cursor(request_url, last, false).to_string(),
                rel: "next".to_string(),
            });
        }
        links
    }
}

fn with_cursor(request_url: &Url, marker: Uuid, reverse: bool) -> Url {
    let kept: Vec<(String, String)> = request_url
        .query_pairs()
        .filter(|(key, _)| !CURSOR_PARAMS.contains(&&**key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = request_url.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(kept);
        pairs.append_pair("marker", &marker.to_string());
        if reverse {
            pairs.append_pair("page_reverse", "true");
        }
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query_of(href: &str) -> HashMap<String, String> {
        let url = Url::parse(href).unwrap();
        serde_urlencoded::from_str(url.query().unwrap_or_default()).unwrap()
    }

    #[test]
    fn test_no_links_for_single_page() {
        let url = Url::parse("http://api.example.com/pools").unwrap();
        assert!(PageLinks::default().render(&url).is_empty());
    }

    #[test]
    fn test_links_preserve_other_parameters() {
        let first = Uuid::new_v4();
        let last = Uuid::new_v4();
        let url = Url::parse(&format!(
            "http://api.example.com/pools?sort=-name&limit=2&marker={}&page_reverse=false",
            Uuid::nil()
        ))
        .unwrap();

        let links = PageLinks {
            previous: Some(first),
            next: Some(last),
        }
        .render(&url);
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].rel, "previous");
        let previous = query_of(&links[0].href);
        assert_eq!(previous["sort"], "-name");
        assert_eq!(previous["limit"], "2");
        assert_eq!(previous["marker"], first.to_string());
        assert_eq!(previous["page_reverse"], "true");

        assert_eq!(links[1].rel, "next");
        let next = query_of(&links[1].href);
        assert_eq!(next["sort"], "-name");
        assert_eq!(next["marker"], last.to_string());
        assert!(!next.contains_key("page_reverse"));
        assert!(links[1].href.starts_with("http://api.example.com/pools?"));
    }
}
