mod free_pages;
mod linked_list;
mod storage_header;
mod string_list;
mod table_descriptor;

use crate::bins::SliceExt;
use crate::error::StorageError;
use crate::pager::{Page, PageType};

pub use crate::view::free_pages::FreePagesView;
pub use crate::view::linked_list::LinkedListView;
pub(crate) use crate::view::linked_list::LINK_HEADER_SIZE;
pub use crate::view::storage_header::{StorageHeaderView, CURRENT_STORAGE_VERSION};
pub use crate::view::string_list::StringListView;
pub use crate::view::table_descriptor::{ColumnDescription, TableDescriptorView};

/// Typed access to the data region of one page.
///
/// A view borrows its page, so only one view can be alive per page at a time. Views built one
/// after another over the same page observe each other's writes.
pub trait PageView {
    /// The only page type this view accepts.
    const PAGE_TYPE: PageType;

    /// Number of bytes at the start of the data region the view always uses.
    const HEADER_SIZE: usize;

    fn page(&mut self) -> &mut Page;

    /// Writes fields the view keeps outside of the page buffer.
    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Flushes the view and commits the page.
    fn commit(&mut self) -> anyhow::Result<()> {
        self.flush()?;
        self.page().commit()
    }
}

/// Checks that `page` can back a view of type `V`.
pub(crate) fn check_page<V: PageView>(page: &Page) -> anyhow::Result<()> {
    if page.page_type() != V::PAGE_TYPE {
        return Err(StorageError::TypeMismatch {
            expected: V::PAGE_TYPE,
            actual: page.page_type(),
        }
        .into());
    }
    if page.len() < V::HEADER_SIZE {
        return Err(StorageError::invalid_argument(format!(
            "page {} has {} bytes, a {:?} page needs at least {}",
            page.id(),
            page.len(),
            V::PAGE_TYPE,
            V::HEADER_SIZE
        ))
        .into());
    }
    Ok(())
}

/// Fixed-width little-endian fields inside a page.
pub(crate) trait PageFieldExt {
    fn read_u8_at(&mut self, offset: usize) -> anyhow::Result<u8>;
    fn read_u16_at(&mut self, offset: usize) -> anyhow::Result<u16>;
    fn read_i32_at(&mut self, offset: usize) -> anyhow::Result<i32>;
    fn read_i64_at(&mut self, offset: usize) -> anyhow::Result<i64>;
    fn write_u16_at(&mut self, offset: usize, value: u16) -> anyhow::Result<()>;
    fn write_i32_at(&mut self, offset: usize, value: i32) -> anyhow::Result<()>;
}

impl PageFieldExt for Page {
    fn read_u8_at(&mut self, offset: usize) -> anyhow::Result<u8> {
        let mut buff = [0u8; 1];
        self.read_at(offset, &mut buff)?;
        Ok(buff[0])
    }

    fn read_u16_at(&mut self, offset: usize) -> anyhow::Result<u16> {
        let mut buff = [0u8; 2];
        self.read_at(offset, &mut buff)?;
        Ok(buff.read_u16())
    }

    fn read_i32_at(&mut self, offset: usize) -> anyhow::Result<i32> {
        let mut buff = [0u8; 4];
        self.read_at(offset, &mut buff)?;
        Ok(buff.read_i32())
    }

    fn read_i64_at(&mut self, offset: usize) -> anyhow::Result<i64> {
        let mut buff = [0u8; 8];
        self.read_at(offset, &mut buff)?;
        Ok(buff.read_i64())
    }

    fn write_u16_at(&mut self, offset: usize, value: u16) -> anyhow::Result<()> {
        self.write_at(offset, &value.to_le_bytes())
    }

    fn write_i32_at(&mut self, offset: usize, value: i32) -> anyhow::Result<()> {
        self.write_at(offset, &value.to_le_bytes())
    }
}
