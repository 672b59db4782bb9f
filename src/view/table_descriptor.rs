use crate::error::StorageError;
use crate::id::{PageId, PageLinkExt};
use crate::pager::{Page, PageType};
use crate::view::{check_page, PageFieldExt, PageView};

const COLUMN_COUNT_OFFSET: usize = 0;
const TABLE_NAME_INDEX_OFFSET: usize = COLUMN_COUNT_OFFSET + 2;
const NEXT_TABLE_DESCRIPTOR_OFFSET: usize = TABLE_NAME_INDEX_OFFSET + 4;
const DATA_TYPE_INDEX_OFFSET: usize = NEXT_TABLE_DESCRIPTOR_OFFSET + 4;
const COLUMNS_OFFSET: usize = DATA_TYPE_INDEX_OFFSET + 4;
const COLUMN_DESCRIPTION_SIZE: usize = 8;

/// String indexes naming one column and its data type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnDescription {
    pub data_type_index: i32,
    pub name_index: i32,
}

/// Describes one table: `[column_count: u16][table_name_index: i32][next_table_descriptor_id:
/// i32][data_type_index: i32]`, then `[data_type_index: i32][name_index: i32]` per column.
pub struct TableDescriptorView<'a> {
    page: &'a mut Page,
    capacity: usize,
}

impl<'a> TableDescriptorView<'a> {
    pub fn new(page: &'a mut Page) -> anyhow::Result<Self> {
        check_page::<Self>(page)?;
        let capacity = Self::capacity(page.len());
        Ok(Self { page, capacity })
    }

    /// Number of columns a page of `page_len` bytes can describe.
    pub fn capacity(page_len: usize) -> usize {
        let capacity = page_len.saturating_sub(COLUMNS_OFFSET) / COLUMN_DESCRIPTION_SIZE;
        capacity.min(u16::MAX as usize)
    }

    pub fn column_capacity(&self) -> usize {
        self.capacity
    }

    pub fn column_count(&mut self) -> anyhow::Result<usize> {
        Ok(self.page.read_u16_at(COLUMN_COUNT_OFFSET)? as usize)
    }

    pub fn set_column_count(&mut self, count: usize) -> anyhow::Result<()> {
        if count > self.capacity {
            return Err(StorageError::invalid_argument(format!(
                "page {} can describe at most {} columns, got {count}",
                self.page.id(),
                self.capacity
            ))
            .into());
        }
        self.page.write_u16_at(COLUMN_COUNT_OFFSET, count as u16)
    }

    pub fn table_name_index(&mut self) -> anyhow::Result<i32> {
        self.page.read_i32_at(TABLE_NAME_INDEX_OFFSET)
    }

    pub fn set_table_name_index(&mut self, index: i32) -> anyhow::Result<()> {
        self.page.write_i32_at(TABLE_NAME_INDEX_OFFSET, index)
    }

    pub fn next_table_descriptor_id(&mut self) -> anyhow::Result<Option<PageId>> {
        let mut buff = [0u8; 4];
        self.page.read_at(NEXT_TABLE_DESCRIPTOR_OFFSET, &mut buff)?;
        Ok(PageId::from_link_bytes(buff))
    }

    pub fn set_next_table_descriptor_id(&mut self, id: Option<PageId>) -> anyhow::Result<()> {
        self.page
            .write_at(NEXT_TABLE_DESCRIPTOR_OFFSET, &id.to_link_bytes())
    }

    pub fn data_type_index(&mut self) -> anyhow::Result<i32> {
        self.page.read_i32_at(DATA_TYPE_INDEX_OFFSET)
    }

    pub fn set_data_type_index(&mut self, index: i32) -> anyhow::Result<()> {
        self.page.write_i32_at(DATA_TYPE_INDEX_OFFSET, index)
    }

    pub fn column(&mut self, index: usize) -> anyhow::Result<ColumnDescription> {
        let offset = self.column_offset(index)?;
        Ok(ColumnDescription {
            data_type_index: self.page.read_i32_at(offset)?,
            name_index: self.page.read_i32_at(offset + 4)?,
        })
    }

    pub fn set_column(&mut self, index: usize, column: ColumnDescription) -> anyhow::Result<()> {
        let offset = self.column_offset(index)?;
        self.page.write_i32_at(offset, column.data_type_index)?;
        self.page.write_i32_at(offset + 4, column.name_index)
    }

    /// The first `column_count` column descriptions.
    pub fn columns(&mut self) -> anyhow::Result<Vec<ColumnDescription>> {
        let count = self.column_count()?;
        if count > self.capacity {
            return Err(StorageError::corrupted(format!(
                "page {} claims {count} columns but can only hold {}",
                self.page.id(),
                self.capacity
            ))
            .into());
        }
        (0..count).map(|i| self.column(i)).collect()
    }

    fn column_offset(&self, index: usize) -> anyhow::Result<usize> {
        if index >= self.capacity {
            return Err(StorageError::invalid_argument(format!(
                "column {index} is out of range, page {} holds {} columns",
                self.page.id(),
                self.capacity
            ))
            .into());
        }
        Ok(COLUMNS_OFFSET + index * COLUMN_DESCRIPTION_SIZE)
    }
}

impl PageView for TableDescriptorView<'_> {
    const PAGE_TYPE: PageType = PageType::TableDescriptor;
    const HEADER_SIZE: usize = COLUMNS_OFFSET;

    fn page(&mut self) -> &mut Page {
        self.page
    }
}
