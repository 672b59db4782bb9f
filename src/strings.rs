use crate::error::StorageError;
use crate::id::PageId;
use crate::pager::{Page, PageStorage, PageType, Stream};
use crate::view::{LinkedListView, PageView, StringListView};
use anyhow::anyhow;

/// Append-only ledger of strings, spread over a chain of string-list pages. Every string gets a
/// unique positive index.
pub struct StringStorage {
    first: PageId,
    /// Tail of the chain, new strings go here.
    current: Page,
    last_index: i32,
}

impl StringStorage {
    /// Picks up the existing chain, or starts one when the storage has no string-list page yet.
    pub fn open<S: Stream>(pages: &mut PageStorage<S>) -> anyhow::Result<Self> {
        let descriptor = pages
            .pages()?
            .into_iter()
            .find(|descriptor| descriptor.page_type() == PageType::StringList);
        let Some(descriptor) = descriptor else {
            let current = pages.allocate(PageType::StringList)?;
            log::debug!("started string chain at page {}", current.id());
            return Ok(Self {
                first: current.id(),
                current,
                last_index: 0,
            });
        };

        let mut page = pages.load(descriptor)?;
        loop {
            let previous = StringListView::new(&mut page)?.previous_page_id()?;
            let Some(previous) = previous else {
                break;
            };
            page = pages.load_by_id(previous, PageType::StringList)?;
        }
        let first = page.id();

        let mut last_index = 0;
        loop {
            let mut view = StringListView::new(&mut page)?;
            last_index = last_index.max(view.max_index()?.unwrap_or(0));
            let Some(next) = view.next_page_id()? else {
                break;
            };
            page = pages.load_by_id(next, PageType::StringList)?;
        }

        log::debug!(
            "opened string chain, first={first} last={} last_index={last_index}",
            page.id()
        );
        Ok(Self {
            first,
            current: page,
            last_index,
        })
    }

    /// Stores `value` and returns its index. A new page is chained when the current one is full.
    pub fn add<S: Stream>(
        &mut self,
        pages: &mut PageStorage<S>,
        value: &str,
    ) -> anyhow::Result<i32> {
        let size = StringListView::encoded_size(value);
        let capacity = StringListView::capacity(self.current.len());
        if size > capacity {
            return Err(StorageError::invalid_argument(format!(
                "string of {size} bytes does not fit into a page, at most {capacity} bytes fit"
            ))
            .into());
        }
        let index = self
            .last_index
            .checked_add(1)
            .ok_or_else(|| anyhow!("string storage ran out of indexes"))?;

        let mut view = StringListView::new(&mut self.current)?;
        if !view.try_add(index, value)? {
            let mut next = pages.allocate(PageType::StringList)?;
            view.set_next_page_id(Some(next.id()))?;
            view.commit()?;

            let mut view = StringListView::new(&mut next)?;
            view.set_previous_page_id(Some(self.current.id()))?;
            if !view.try_add(index, value)? {
                return Err(anyhow!("string #{index} does not fit into an empty page"));
            }
            view.commit()?;
            log::debug!("chained string page {} after {}", next.id(), self.current.id());
            self.current = next;
        } else {
            view.commit()?;
        }

        self.last_index = index;
        Ok(index)
    }

    /// Finds the string stored under `index`, walking the chain from its first page.
    pub fn load<S: Stream>(&self, pages: &PageStorage<S>, index: i32) -> anyhow::Result<String> {
        if index <= 0 || index > self.last_index {
            return Err(no_such_string(index));
        }

        let mut page = pages.load_by_id(self.first, PageType::StringList)?;
        loop {
            let mut view = StringListView::new(&mut page)?;
            if let Some(value) = view.try_find(index)? {
                return Ok(value);
            }
            let Some(next) = view.next_page_id()? else {
                return Err(no_such_string(index));
            };
            page = pages.load_by_id(next, PageType::StringList)?;
        }
    }

    /// Index handed out by the latest [`StringStorage::add`], 0 if there is none.
    pub fn last_index(&self) -> i32 {
        self.last_index
    }
}

fn no_such_string(index: i32) -> anyhow::Error {
    StorageError::invalid_argument(format!("no such string #{index}")).into()
}
