use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, AnalyticsResult};

/// One-based pagination. A size of zero disables paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { number: 1, size: 0 }
    }
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self { number, size }
    }

    pub fn unpaginated() -> Self {
        Self::default()
    }

    pub fn is_unpaginated(&self) -> bool {
        self.size == 0
    }

    pub fn offset(&self) -> usize {
        (self.number as usize * self.size as usize).saturating_sub(self.size as usize)
    }

    pub fn limit(&self) -> usize {
        self.size as usize
    }

    pub fn validate(&self) -> AnalyticsResult<()> {
        if self.number == 0 {
            return Err(AnalyticsError::invalid("page number must be at least 1"));
        }
        Ok(())
    }

    /// Slices an already-ordered collection.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.is_unpaginated() {
            return items;
        }
        items
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_page_of_ten() {
        let page = Page::new(2, 10);
        assert_eq!(page.offset(), 10);
        assert_eq!(page.limit(), 10);

        let items: Vec<u32> = (0..25).collect();
        assert_eq!(page.apply(items), (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn first_page_starts_at_zero() {
        assert_eq!(Page::new(1, 50).offset(), 0);
    }

    #[test]
    fn zero_size_returns_everything() {
        let items: Vec<u32> = (0..5).collect();
        assert_eq!(Page::new(3, 0).apply(items.clone()), items);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let items: Vec<u32> = (0..5).collect();
        assert!(Page::new(4, 2).apply(items).is_empty());
    }

    #[test]
    fn page_zero_is_rejected() {
        assert!(Page::new(0, 10).validate().is_err());
        assert!(Page::new(1, 10).validate().is_ok());
    }
}
