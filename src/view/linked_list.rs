use crate::id::{PageId, PageLinkExt};
use crate::view::PageView;

/// `[previous_page_id: i32][next_page_id: i32]`, 0 meaning there is no such page.
pub(crate) const LINK_HEADER_SIZE: usize = 8;
const PREVIOUS_PAGE_OFFSET: usize = 0;
const NEXT_PAGE_OFFSET: usize = 4;

/// A view whose page is a member of a doubly linked chain of pages of the same type.
pub trait LinkedListView: PageView {
    fn previous_page_id(&mut self) -> anyhow::Result<Option<PageId>> {
        read_link(self, PREVIOUS_PAGE_OFFSET)
    }

    fn set_previous_page_id(&mut self, id: Option<PageId>) -> anyhow::Result<()> {
        self.page()
            .write_at(PREVIOUS_PAGE_OFFSET, &id.to_link_bytes())
    }

    fn next_page_id(&mut self) -> anyhow::Result<Option<PageId>> {
        read_link(self, NEXT_PAGE_OFFSET)
    }

    fn set_next_page_id(&mut self, id: Option<PageId>) -> anyhow::Result<()> {
        self.page().write_at(NEXT_PAGE_OFFSET, &id.to_link_bytes())
    }
}

fn read_link<V: LinkedListView + ?Sized>(
    view: &mut V,
    offset: usize,
) -> anyhow::Result<Option<PageId>> {
    let mut buff = [0u8; 4];
    view.page().read_at(offset, &mut buff)?;
    Ok(PageId::from_link_bytes(buff))
}
