//! Input ingestion.
//!
//! Items arrive as positional arguments and, when stdin is a pipe, as
//! whitespace-separated words read from stdin. Each item is classified as a
//! local file or a remote URL before a request is built from them.

use crate::error::InputError;
use crate::models::{Feature, Item, RequestDescriptor};
use is_terminal::IsTerminal;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Read extra items from stdin when it is not a terminal.
pub async fn read_piped_items() -> Result<Vec<String>, InputError> {
    if std::io::stdin().is_terminal() {
        return Ok(Vec::new());
    }

    let mut buffer = String::new();
    tokio::io::stdin().read_to_string(&mut buffer).await?;
    let items = split_items(&buffer);
    debug!("Read {} item(s) from stdin", items.len());
    Ok(items)
}

fn split_items(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

/// Classify one raw item.
///
/// An existing path wins over URL parsing, so a local file that happens to
/// look like a URL is still read from disk. Anything else must be an
/// http(s) URL.
pub fn classify(raw: &str) -> Option<Item> {
    if Path::new(raw).is_file() {
        return Some(Item::file(raw));
    }

    match reqwest::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {
            Some(Item::url(raw))
        }
        _ => None,
    }
}

/// Classify every raw item, logging and skipping the unusable ones.
pub fn sort_items<I, S>(raw: I) -> Vec<Item>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|raw| {
            let raw = raw.as_ref();
            let item = classify(raw);
            if item.is_none() {
                warn!("{:?} is not a file or url", raw);
            }
            item
        })
        .collect()
}

/// Build a request from raw items.
///
/// Fails when none of the items is a usable file or URL.
pub fn build_request<I, S>(
    raw: I,
    features: impl IntoIterator<Item = Feature>,
    min_score: f64,
) -> Result<RequestDescriptor, InputError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let items = sort_items(raw);
    if items.is_empty() {
        return Err(InputError::NoValidItems);
    }

    Ok(RequestDescriptor::from_items(items)
        .with_features(features)
        .with_min_score(min_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_classify_url() {
        let item = classify("https://example.com/cat.jpg").unwrap();
        assert_eq!(item.kind, ItemKind::Url);
        assert_eq!(item.name, "https://example.com/cat.jpg");

        assert!(classify("ftp://example.com/cat.jpg").is_none());
        assert!(classify("not a thing").is_none());
        assert!(classify("http://").is_none());
    }

    #[test]
    fn test_classify_existing_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"\x89PNG").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let item = classify(&path).unwrap();
        assert_eq!(item.kind, ItemKind::File);
        assert_eq!(item.name, path);
    }

    #[test]
    fn test_directories_are_not_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(classify(&dir.path().to_string_lossy()).is_none());
    }

    #[test]
    fn test_build_request_skips_invalid_and_dedups() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let request = build_request(
            vec![
                "http://x/a.jpg",
                "bogus",
                path.as_str(),
                "http://x/a.jpg",
            ],
            [Feature::Tags],
            0.4,
        )
        .unwrap();

        let names: Vec<&str> = request.items().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["http://x/a.jpg", path.as_str()]);
        assert_eq!(request.files().count(), 1);
        assert!(request.wants(Feature::Tags));
        assert!(!request.wants(Feature::Faces));
        assert_eq!(request.min_score(), 0.4);
    }

    #[test]
    fn test_build_request_without_valid_items() {
        let err = build_request(vec!["nope", "also nope"], Vec::<Feature>::new(), 0.0).unwrap_err();
        assert!(matches!(err, InputError::NoValidItems));
        assert_eq!(err.to_string(), "failed to find any valid files or URLs");
    }

    #[test]
    fn test_split_items() {
        assert_eq!(
            split_items("a.jpg  http://x/b.png\n\tc.gif\n"),
            vec!["a.jpg", "http://x/b.png", "c.gif"]
        );
        assert!(split_items("  \n").is_empty());
    }
}
