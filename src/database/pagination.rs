use serde::{Deserialize, Serialize};

use crate::constants::{MAX_PAGE_SIZE, RECIPE_COUNT_PER_PAGE};

/// `?page=&limit=` query parameters. Pages are 1-based.
#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(RECIPE_COUNT_PER_PAGE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, query: &PageQuery) -> Self {
        let page = query.page();
        let page_count = (total_rows + query.limit() - 1) / query.limit();

        Self {
            count: total_rows,
            next: (page < page_count).then_some(page + 1),
            previous: (page > 1).then_some(page - 1),
            results: rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_links_both_ways() {
        let query = PageQuery {
            page: Some(2),
            limit: Some(2),
        };
        let page = PageContext::from_rows(vec![3, 4], 5, &query);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));
        assert_eq!(query.offset(), 2);
    }

    #[test]
    fn limit_is_clamped() {
        let query = PageQuery {
            page: Some(0),
            limit: Some(10_000),
        };
        assert_eq!(query.limit(), MAX_PAGE_SIZE);
        assert_eq!(query.page(), 1);
        let page = PageContext::<i32>::from_rows(vec![], 0, &query);
        assert_eq!(page.next, None);
        assert_eq!(page.previous, None);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let query = PageQuery {
            page: Some(i64::MAX),
            limit: None,
        };
        assert_eq!(query.offset(), i64::MAX);
        let page = PageContext::<i32>::from_rows(vec![], 3, &query);
        assert_eq!(page.count, 3);
        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(i64::MAX - 1));
    }
}
