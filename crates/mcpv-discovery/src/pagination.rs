//! Cursor-based pagination over primary-keyed federation items.

use mcpv_protocol::McpError;
use mcpv_types::snapshot::PrimaryKeyed;

/// Default page size, uniform across tool/resource/prompt listings.
pub const PAGE_SIZE: usize = 50;

/// One page of a sorted, primary-keyed listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in this page, in primary-key order.
    pub items: Vec<T>,
    /// Cursor to pass for the next page, `None` if this was the last page.
    pub next_cursor: Option<String>,
}

/// Sort `items` lexicographically by primary key and return the page
/// starting just after `cursor` (or from the start if `None`).
///
/// # Errors
///
/// Returns [`McpError::invalid_cursor`] if `cursor` is `Some` and does not
/// match any item's primary key.
pub fn paginate<T: PrimaryKeyed + Clone>(mut items: Vec<T>, cursor: Option<&str>, page_size: usize) -> Result<Page<T>, McpError> {
    items.sort_by(|a, b| a.primary_key().cmp(b.primary_key()));

    let start = match cursor {
        None => 0,
        Some(key) => {
            let position = items
                .iter()
                .position(|item| item.primary_key() == key)
                .ok_or_else(|| McpError::invalid_cursor(key))?;
            position + 1
        }
    };

    let end = (start + page_size).min(items.len());
    let page_items = items[start..end].to_vec();
    let next_cursor = if end < items.len() {
        page_items.last().map(|item| item.primary_key().to_string())
    } else {
        None
    };

    Ok(Page {
        items: page_items,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpv_types::spec::SpecKey;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(String, SpecKey);

    impl PrimaryKeyed for Item {
        fn primary_key(&self) -> &str {
            &self.0
        }

        fn spec_key(&self) -> &SpecKey {
            &self.1
        }
    }

    fn items(names: &[&str]) -> Vec<Item> {
        names.iter().map(|n| Item((*n).to_string(), SpecKey::from("test"))).collect()
    }

    #[test]
    fn first_page_starts_at_the_beginning() {
        let page = paginate(items(&["c", "a", "b"]), None, 2).unwrap();
        assert_eq!(page.items, items(&["a", "b"]));
        assert_eq!(page.next_cursor, Some("b".to_string()));
    }

    #[test]
    fn subsequent_page_resumes_after_cursor() {
        let page = paginate(items(&["a", "b", "c"]), Some("b"), 2).unwrap();
        assert_eq!(page.items, items(&["c"]));
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn unknown_cursor_is_rejected() {
        let err = paginate(items(&["a", "b"]), Some("ghost"), 2).unwrap_err();
        assert!(matches!(err, McpError::InvalidInput { .. }));
    }

    #[test]
    fn page_exactly_consuming_the_list_has_no_next_cursor() {
        let page = paginate(items(&["a", "b"]), None, 2).unwrap();
        assert_eq!(page.next_cursor, None);
    }
}
