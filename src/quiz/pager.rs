// src/quiz/pager.rs

//! Fixed-size paging of a test's ordered question list.

/// Questions shown per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Where a 0-based page sits inside a list of `total_count` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page_index: u32,
    pub total_pages: u32,
    /// Offset for the OFFSET/LIMIT query.
    pub offset: i64,
    pub limit: i64,
}

impl PageWindow {
    /// Pages past the end are valid requests that yield no items.
    pub fn is_past_end(&self) -> bool {
        self.page_index >= self.total_pages
    }
}

/// Computes the window for `page_index`. Unlike the usual clamp-to-last-page
/// behaviour, an out-of-range index is kept so the caller returns an empty page.
pub fn page_window(total_count: i64, page_index: u32, page_size: u32) -> PageWindow {
    let size = i64::from(page_size.max(1));
    let total = total_count.max(0);
    let total_pages = u32::try_from((total + size - 1) / size).unwrap_or(u32::MAX);

    PageWindow {
        page_index,
        total_pages,
        offset: i64::from(page_index) * size,
        limit: size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_five_questions_make_three_pages() {
        let w = page_window(25, 2, 10);
        assert_eq!(w.total_pages, 3);
        assert_eq!(w.offset, 20);
        assert_eq!(w.limit, 10);
        assert!(!w.is_past_end());
    }

    #[test]
    fn exact_boundary() {
        assert_eq!(page_window(20, 0, 10).total_pages, 2);
        assert_eq!(page_window(21, 0, 10).total_pages, 3);
    }

    #[test]
    fn empty_list_has_no_pages() {
        let w = page_window(0, 0, 10);
        assert_eq!(w.total_pages, 0);
        assert!(w.is_past_end());
    }

    #[test]
    fn past_end_keeps_requested_index() {
        let w = page_window(25, 7, 10);
        assert_eq!(w.page_index, 7);
        assert_eq!(w.offset, 70);
        assert!(w.is_past_end());
    }

    #[test]
    fn zero_page_size_is_treated_as_one() {
        let w = page_window(3, 1, 0);
        assert_eq!(w.total_pages, 3);
        assert_eq!(w.offset, 1);
    }
}
