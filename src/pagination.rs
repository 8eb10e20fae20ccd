// Pagination - slicing an ordered sequence into fixed-size, 1-indexed pages

use serde::Serialize;
use std::num::IntErrorKind;

/// Parse a raw `page` query value. Absent or non-numeric input means page 1;
/// numbers too large for `i64` saturate so they still clamp to the last page.
pub fn parse_page_number(raw: Option<&str>) -> i64 {
    let Some(value) = raw else {
        return 1;
    };
    match value.trim().parse::<i64>() {
        Ok(number) => number,
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => i64::MAX,
            IntErrorKind::NegOverflow => i64::MIN,
            _ => 1,
        },
    }
}

/// Where a requested page lands once clamped against the sequence length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
    pub total: usize,
}

impl PageWindow {
    /// An empty sequence still has one (empty) page. Requests past the end
    /// land on the last page, requests below 1 on the first.
    pub fn new(total: usize, per_page: usize, requested: i64) -> Self {
        let per_page = per_page.max(1);
        let num_pages = if total == 0 {
            1
        } else {
            total.div_ceil(per_page)
        };
        let number = if requested < 1 {
            1
        } else {
            usize::try_from(requested).unwrap_or(usize::MAX).min(num_pages)
        };

        Self {
            number,
            num_pages,
            per_page,
            total,
        }
    }

    pub fn offset(&self) -> usize {
        (self.number - 1) * self.per_page
    }

    pub fn limit(&self) -> usize {
        self.per_page
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_page_number(&self) -> Option<usize> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_page_number(&self) -> Option<usize> {
        self.has_next().then(|| self.number + 1)
    }

    /// Item count on this page.
    pub fn len(&self) -> usize {
        self.total.saturating_sub(self.offset()).min(self.per_page)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Presentation metadata attached to every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub number: usize,
    pub num_pages: usize,
    pub per_page: usize,
    pub total: usize,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page_number: Option<usize>,
    pub next_page_number: Option<usize>,
}

impl From<PageWindow> for PageInfo {
    fn from(window: PageWindow) -> Self {
        Self {
            number: window.number,
            num_pages: window.num_pages,
            per_page: window.per_page,
            total: window.total,
            has_previous: window.has_previous(),
            has_next: window.has_next(),
            previous_page_number: window.previous_page_number(),
            next_page_number: window.next_page_number(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: PageInfo,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow) -> Self {
        Self {
            items,
            page: window.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_previous(&self) -> bool {
        self.page.has_previous
    }

    pub fn has_next(&self) -> bool {
        self.page.has_next
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
        }
    }
}

/// Slice an in-memory sequence.
pub fn paginate<T>(items: Vec<T>, per_page: usize, requested: i64) -> Page<T> {
    let window = PageWindow::new(items.len(), per_page, requested);
    let items = items
        .into_iter()
        .skip(window.offset())
        .take(window.limit())
        .collect();
    Page::new(items, window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_number() {
        assert_eq!(parse_page_number(None), 1);
        assert_eq!(parse_page_number(Some("3")), 3);
        assert_eq!(parse_page_number(Some("abc")), 1);
        assert_eq!(parse_page_number(Some("")), 1);
        assert_eq!(parse_page_number(Some("-2")), -2);
    }

    #[test]
    fn test_overflowing_page_lands_on_last_page() {
        let huge = parse_page_number(Some("99999999999999999999"));
        assert_eq!(huge, i64::MAX);
        assert_eq!(PageWindow::new(15, 10, huge).number, 2);

        let tiny = parse_page_number(Some("-99999999999999999999"));
        assert_eq!(PageWindow::new(15, 10, tiny).number, 1);
    }

    #[test]
    fn test_first_and_second_page() {
        let items: Vec<u32> = (0..15).collect();

        let first = paginate(items.clone(), 10, 1);
        assert_eq!(first.items, (0..10).collect::<Vec<_>>());
        assert!(!first.has_previous());
        assert!(first.has_next());
        assert_eq!(first.page.next_page_number, Some(2));

        let second = paginate(items, 10, 2);
        assert_eq!(second.items, (10..15).collect::<Vec<_>>());
        assert!(second.has_previous());
        assert!(!second.has_next());
        assert_eq!(second.page.num_pages, 2);
    }

    #[test]
    fn test_out_of_range_requests_are_clamped() {
        let items: Vec<u32> = (0..15).collect();
        assert_eq!(paginate(items.clone(), 10, 99).items, (10..15).collect::<Vec<_>>());
        assert_eq!(paginate(items.clone(), 10, 0).items, (0..10).collect::<Vec<_>>());
        assert_eq!(paginate(items, 10, -5).page.number, 1);
    }

    #[test]
    fn test_empty_sequence_has_one_empty_page() {
        let page = paginate(Vec::<u32>::new(), 10, 4);
        assert!(page.is_empty());
        assert_eq!(page.page.number, 1);
        assert_eq!(page.page.num_pages, 1);
        assert!(!page.has_next());
        assert!(!page.has_previous());
    }

    #[test]
    fn test_window_len_matches_slice() {
        let window = PageWindow::new(13, 3, 5);
        assert_eq!(window.offset(), 12);
        assert_eq!(window.len(), 1);
        assert_eq!(PageWindow::new(12, 3, 4).len(), 3);
        assert!(PageWindow::new(0, 3, 1).is_empty());
    }
}
