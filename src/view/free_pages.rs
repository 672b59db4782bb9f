use crate::error::StorageError;
use crate::id::PageId;
use crate::pager::{Page, PageType};
use crate::view::{check_page, LinkedListView, PageFieldExt, PageView, LINK_HEADER_SIZE};

const ENTRY_SIZE: usize = 4;

/// A page listing ids of free pages. Entries below 1 are unused slots.
pub struct FreePagesView<'a> {
    page: &'a mut Page,
    len: usize,
}

impl<'a> FreePagesView<'a> {
    pub fn new(page: &'a mut Page) -> anyhow::Result<Self> {
        check_page::<Self>(page)?;
        let len = (page.len() - LINK_HEADER_SIZE) / ENTRY_SIZE;
        Ok(Self { page, len })
    }

    /// Number of slots, used or not.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&mut self, index: usize) -> anyhow::Result<Option<PageId>> {
        let offset = self.offset(index)?;
        let id = self.page.read_i32_at(offset)?;
        Ok(if id < 1 { None } else { PageId::new(id) })
    }

    pub fn set(&mut self, index: usize, id: Option<PageId>) -> anyhow::Result<()> {
        let offset = self.offset(index)?;
        self.page
            .write_i32_at(offset, id.map(|id| id.get()).unwrap_or(0))
    }

    fn offset(&self, index: usize) -> anyhow::Result<usize> {
        if index >= self.len {
            return Err(StorageError::invalid_argument(format!(
                "free page slot {index} is out of range, the page has {} slots",
                self.len
            ))
            .into());
        }
        Ok(LINK_HEADER_SIZE + index * ENTRY_SIZE)
    }
}

impl PageView for FreePagesView<'_> {
    const PAGE_TYPE: PageType = PageType::FreePageIndex;
    const HEADER_SIZE: usize = LINK_HEADER_SIZE;

    fn page(&mut self) -> &mut Page {
        self.page
    }
}

impl LinkedListView for FreePagesView<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::{PageStorage, Setting};
    use std::io::Cursor;

    #[test]
    fn test_free_page_slots() {
        let mut storage =
            PageStorage::open(Cursor::new(vec![]), Setting { page_size: 33 }).unwrap();
        let mut page = storage.allocate(PageType::FreePageIndex).unwrap();
        let mut view = FreePagesView::new(&mut page).unwrap();
        assert_eq!(5, view.len());

        for i in 0..view.len() {
            assert_eq!(None, view.get(i).unwrap());
        }

        view.set(0, PageId::new(12)).unwrap();
        view.set(4, PageId::new(3)).unwrap();
        view.set_next_page_id(PageId::new(9)).unwrap();
        assert_eq!(PageId::new(12), view.get(0).unwrap());
        assert_eq!(PageId::new(3), view.get(4).unwrap());
        assert_eq!(None, view.get(1).unwrap());
        assert_eq!(None, view.previous_page_id().unwrap());
        assert_eq!(PageId::new(9), view.next_page_id().unwrap());

        let err = view.get(5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::InvalidArgument(_))
        ));
        assert!(view.set(5, None).is_err());

        view.set(0, None).unwrap();
        assert_eq!(None, view.get(0).unwrap());
        view.commit().unwrap();
    }

    #[test]
    fn test_wrong_page_type() {
        let mut storage = PageStorage::open(Cursor::new(vec![]), Setting::default()).unwrap();
        let mut page = storage.allocate(PageType::StringList).unwrap();
        let Err(err) = FreePagesView::new(&mut page) else {
            panic!("a string list page is not a free page index");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::TypeMismatch {
                expected: PageType::FreePageIndex,
                actual: PageType::StringList,
            })
        ));
    }

    #[test]
    fn test_page_too_small() {
        let mut storage =
            PageStorage::open(Cursor::new(vec![]), Setting { page_size: 12 }).unwrap();
        let mut page = storage.allocate(PageType::FreePageIndex).unwrap();
        let Err(err) = FreePagesView::new(&mut page) else {
            panic!("a 7 byte page cannot hold the link header");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::InvalidArgument(_))
        ));
    }
}
