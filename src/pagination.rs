//! Page-number pagination for list actions

use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};

/// Query parameters accepted by list actions
///
/// `page` is kept as a string so malformed values become "Invalid page."
/// rather than an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
}

/// Paginated list response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Same page metadata, different result type
    pub fn with_results<U>(self, results: Vec<U>) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: usize,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Slice `items` to the requested page; `base_path` is the list route used for links
    pub fn paginate<T>(
        &self,
        items: Vec<T>,
        page: Option<&str>,
        base_path: &str,
    ) -> ApiResult<Page<T>> {
        let count = items.len();
        let page_count = count.div_ceil(self.page_size).max(1);

        let number = match page {
            None => 1,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ApiError::InvalidPage)?,
        };
        if number == 0 || number > page_count {
            return Err(ApiError::InvalidPage);
        }

        let start = (number - 1) * self.page_size;
        let results: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(self.page_size)
            .collect();

        let next = (number < page_count).then(|| format!("{base_path}?page={}", number + 1));
        let previous = match number {
            1 => None,
            2 => Some(base_path.to_string()),
            n => Some(format!("{base_path}?page={}", n - 1)),
        };

        Ok(Page {
            count,
            next,
            previous,
            results,
        })
    }
}
