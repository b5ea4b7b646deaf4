//! Offset pagination shared by list endpoints.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated `(page, page_size)` pair. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Result<Self, DomainError> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(DomainError::validation("page must be >= 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(DomainError::validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus the totals the client needs to navigate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let size = u64::from(request.page_size());
        let total_pages = total.div_ceil(size);
        Self {
            items,
            total,
            page: request.page(),
            page_size: request.page_size(),
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }

    /// Slice an already-filtered, already-ordered result set.
    pub fn from_all(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .collect();
        Self::new(items, total, request)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_to_first_page_of_ten() {
        let req = PageRequest::new(None, None).unwrap();
        assert_eq!((req.page(), req.page_size(), req.offset()), (1, 10, 0));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(PageRequest::new(Some(0), None).is_err());
        assert!(PageRequest::new(None, Some(0)).is_err());
        assert!(PageRequest::new(None, Some(101)).is_err());
        assert!(PageRequest::new(None, Some(100)).is_ok());
    }

    #[test]
    fn slices_and_counts_pages() {
        let req = PageRequest::new(Some(2), Some(3)).unwrap();
        let page = Page::from_all((1..=7).collect::<Vec<_>>(), req);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page = Page::<u8>::from_all(vec![], PageRequest::default());
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }

    proptest! {
        #[test]
        fn page_never_exceeds_page_size(len in 0usize..300, page in 1u32..40, size in 1u32..=100) {
            let req = PageRequest::new(Some(page), Some(size)).unwrap();
            let p = Page::from_all(vec![0u8; len], req);
            prop_assert!(p.items.len() <= size as usize);
            prop_assert_eq!(p.total, len as u64);
            prop_assert!(u64::from(p.total_pages) * u64::from(size) >= p.total);
        }
    }
}
