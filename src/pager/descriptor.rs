use crate::bins::SliceExt;
use crate::error::StorageError;
use crate::id::PageId;
use std::ops::Range;

/// Every page record starts with `[id: i32][type: u8]`, followed by its data region.
pub(crate) const PAGE_HEADER_SIZE: usize = 5;
const PAGE_HEADER_ID_RANGE: Range<usize> = 0..4;
const PAGE_HEADER_TYPE_INDEX: usize = 4;

macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

#[allow(dead_code)]
const fn range_size(range: Range<usize>) -> usize {
    range.end - range.start
}

const_assert!(PAGE_HEADER_ID_RANGE.end <= PAGE_HEADER_SIZE);
const_assert!(range_size(PAGE_HEADER_ID_RANGE) == 4);
const_assert!(PAGE_HEADER_TYPE_INDEX < PAGE_HEADER_SIZE);

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PageType {
    /// A page that was freed and can be handed out again.
    Invalid = 0,
    StorageDescriptor = 1,
    FreePageIndex = 2,
    TableDescriptor = 3,
    StringList = 4,
    TypeList = 5,
}

impl TryFrom<u8> for PageType {
    type Error = StorageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Invalid,
            1 => Self::StorageDescriptor,
            2 => Self::FreePageIndex,
            3 => Self::TableDescriptor,
            4 => Self::StringList,
            5 => Self::TypeList,
            _ => {
                return Err(StorageError::corrupted(format!(
                    "page type {value} is not recognized"
                )))
            }
        })
    }
}

/// Identity, location and type of one page.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageDescriptor {
    id: PageId,
    data_offset: u64,
    data_size: usize,
    page_type: PageType,
}

impl PageDescriptor {
    pub(crate) fn new(id: PageId, data_offset: u64, data_size: usize, page_type: PageType) -> Self {
        debug_assert!(data_offset >= PAGE_HEADER_SIZE as u64);
        Self {
            id,
            data_offset,
            data_size,
            page_type,
        }
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Absolute stream offset of the first data byte. The header sits right before it.
    #[inline]
    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    #[inline]
    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    #[inline]
    pub(crate) fn header_offset(&self) -> u64 {
        self.data_offset - PAGE_HEADER_SIZE as u64
    }

    pub(crate) fn with_type(&self, page_type: PageType) -> Self {
        Self { page_type, ..*self }
    }

    pub(crate) fn encode_header(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut header = [0u8; PAGE_HEADER_SIZE];
        header[PAGE_HEADER_ID_RANGE].copy_from_slice(&self.id.to_le_bytes());
        header[PAGE_HEADER_TYPE_INDEX] = self.page_type as u8;
        header
    }
}

/// Raw header fields as found on the stream, before they are checked against the layout.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PageHeader {
    pub(crate) id: i32,
    pub(crate) page_type: PageType,
}

impl PageHeader {
    pub(crate) fn decode(buff: &[u8]) -> Result<Self, StorageError> {
        let header = &buff[..PAGE_HEADER_SIZE];
        let id = header[PAGE_HEADER_ID_RANGE].read_i32();
        let page_type = PageType::try_from(header[PAGE_HEADER_TYPE_INDEX])?;
        Ok(Self { id, page_type })
    }
}
