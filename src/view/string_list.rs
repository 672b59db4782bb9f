use crate::error::StorageError;
use crate::pager::{Page, PageType};
use crate::view::{check_page, LinkedListView, PageFieldExt, PageView, LINK_HEADER_SIZE};

const STRING_COUNT_OFFSET: usize = LINK_HEADER_SIZE;
const STRING_DATA_OFFSET: usize = STRING_COUNT_OFFSET + 4;

/// Each record is `[index: i32][byte_length: i32]` followed by the utf-16le encoded string.
pub(crate) const STRING_RECORD_HEADER_SIZE: usize = 8;

/// A page of indexed strings, appended one after another. An index of 0 ends the records.
pub struct StringListView<'a> {
    page: &'a mut Page,
    free_offset: usize,
}

/// Location of one record inside the page.
struct StringRecord {
    index: i32,
    offset: usize,
    byte_length: usize,
}

impl StringRecord {
    fn data_offset(&self) -> usize {
        self.offset + STRING_RECORD_HEADER_SIZE
    }

    fn end(&self) -> usize {
        self.data_offset() + self.byte_length
    }
}

impl<'a> StringListView<'a> {
    pub fn new(page: &'a mut Page) -> anyhow::Result<Self> {
        check_page::<Self>(page)?;
        let mut view = Self {
            page,
            free_offset: STRING_DATA_OFFSET,
        };
        while let Some(record) = view.record_at(view.free_offset)? {
            view.free_offset = record.end();
        }
        Ok(view)
    }

    /// Bytes a string takes inside a page, record header included.
    pub fn encoded_size(value: &str) -> usize {
        STRING_RECORD_HEADER_SIZE + value.encode_utf16().count() * 2
    }

    /// Largest record an empty page of `page_len` bytes can hold.
    pub fn capacity(page_len: usize) -> usize {
        page_len.saturating_sub(STRING_DATA_OFFSET)
    }

    pub fn string_count(&mut self) -> anyhow::Result<i32> {
        self.page.read_i32_at(STRING_COUNT_OFFSET)
    }

    /// Appends `value` under `index`. Returns `false`, leaving the page untouched, when the record
    /// does not fit into the remaining space.
    pub fn try_add(&mut self, index: i32, value: &str) -> anyhow::Result<bool> {
        if index <= 0 {
            return Err(StorageError::invalid_argument(format!(
                "string index must be positive, got {index}"
            ))
            .into());
        }

        let data: Vec<u8> = value.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let Ok(byte_length) = i32::try_from(data.len()) else {
            return Ok(false);
        };
        let end = self.free_offset + STRING_RECORD_HEADER_SIZE + data.len();
        if end > self.page.len() {
            return Ok(false);
        }

        self.page.seek(self.free_offset)?;
        self.page.write(&index.to_le_bytes())?;
        self.page.write(&byte_length.to_le_bytes())?;
        self.page.write(&data)?;
        self.free_offset = end;

        let count = self.string_count()?;
        self.page.write_i32_at(STRING_COUNT_OFFSET, count + 1)?;
        Ok(true)
    }

    /// Looks `index` up, scanning the records from the start of the page.
    pub fn try_find(&mut self, index: i32) -> anyhow::Result<Option<String>> {
        let mut offset = STRING_DATA_OFFSET;
        while let Some(record) = self.record_at(offset)? {
            if record.index == index {
                return self.decode(&record).map(Some);
            }
            offset = record.end();
        }
        Ok(None)
    }

    /// Highest index stored in this page.
    pub fn max_index(&mut self) -> anyhow::Result<Option<i32>> {
        let mut max = None;
        let mut offset = STRING_DATA_OFFSET;
        while let Some(record) = self.record_at(offset)? {
            max = max.max(Some(record.index));
            offset = record.end();
        }
        Ok(max)
    }

    fn record_at(&mut self, offset: usize) -> anyhow::Result<Option<StringRecord>> {
        if offset + STRING_RECORD_HEADER_SIZE > self.page.len() {
            return Ok(None);
        }
        let index = self.page.read_i32_at(offset)?;
        if index == 0 {
            return Ok(None);
        }
        let byte_length = self.page.read_i32_at(offset + 4)?;
        let record = usize::try_from(byte_length)
            .ok()
            .filter(|len| len % 2 == 0)
            .map(|byte_length| StringRecord {
                index,
                offset,
                byte_length,
            })
            .filter(|record| record.end() <= self.page.len());
        match record {
            Some(record) => Ok(Some(record)),
            None => Err(StorageError::corrupted(format!(
                "string #{index} in page {} has an invalid length of {byte_length} bytes",
                self.page.id()
            ))
            .into()),
        }
    }

    fn decode(&mut self, record: &StringRecord) -> anyhow::Result<String> {
        let mut data = vec![0u8; record.byte_length];
        self.page.seek(record.offset)?;
        self.page.read(&mut [0u8; STRING_RECORD_HEADER_SIZE])?;
        self.page.read(&mut data)?;

        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
            .collect();
        String::from_utf16(&units).map_err(|err| {
            StorageError::corrupted(format!(
                "string #{} in page {} is not valid utf-16: {err}",
                record.index,
                self.page.id()
            ))
            .into()
        })
    }
}

impl PageView for StringListView<'_> {
    const PAGE_TYPE: PageType = PageType::StringList;
    const HEADER_SIZE: usize = STRING_DATA_OFFSET;

    fn page(&mut self) -> &mut Page {
        self.page
    }
}

impl LinkedListView for StringListView<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::{PageStorage, Setting};
    use std::io::Cursor;

    fn storage(page_size: usize) -> PageStorage<Cursor<Vec<u8>>> {
        PageStorage::open(Cursor::new(vec![]), Setting { page_size }).unwrap()
    }

    #[test]
    fn test_add_and_find() {
        let mut storage = storage(128);
        let mut page = storage.allocate(PageType::StringList).unwrap();
        let mut view = StringListView::new(&mut page).unwrap();

        assert!(view.try_add(1, "Foo").unwrap());
        assert!(view.try_add(2, "Bar").unwrap());
        assert_eq!(2, view.string_count().unwrap());

        assert_eq!(Some("Foo".to_string()), view.try_find(1).unwrap());
        assert_eq!(Some("Bar".to_string()), view.try_find(2).unwrap());
        assert_eq!(None, view.try_find(3).unwrap());
        assert_eq!(Some(2), view.max_index().unwrap());
    }

    #[test]
    fn test_second_view_appends() {
        let mut storage = storage(128);
        let mut page = storage.allocate(PageType::StringList).unwrap();

        let mut view = StringListView::new(&mut page).unwrap();
        assert!(view.try_add(1, "Foo").unwrap());
        assert!(view.try_add(2, "Bar").unwrap());
        view.commit().unwrap();

        let mut view = StringListView::new(&mut page).unwrap();
        assert!(view.try_add(3, "Clondyke Bar").unwrap());
        assert_eq!(3, view.string_count().unwrap());
        assert_eq!(Some("Foo".to_string()), view.try_find(1).unwrap());
        assert_eq!(Some("Bar".to_string()), view.try_find(2).unwrap());
        assert_eq!(Some("Clondyke Bar".to_string()), view.try_find(3).unwrap());
    }

    #[test]
    fn test_full_page() {
        // 59 data bytes: 12 for the header, "abcd" takes 16, "ab" takes 12
        let mut storage = storage(64);
        let mut page = storage.allocate(PageType::StringList).unwrap();
        let mut view = StringListView::new(&mut page).unwrap();

        assert!(view.try_add(1, "abcd").unwrap());
        assert!(view.try_add(2, "abcd").unwrap());
        assert!(!view.try_add(3, "abcd").unwrap());
        assert!(view.try_add(3, "ab").unwrap());
        assert!(!view.try_add(4, "").unwrap());

        assert_eq!(3, view.string_count().unwrap());
        assert_eq!(Some("abcd".to_string()), view.try_find(1).unwrap());
        assert_eq!(Some("abcd".to_string()), view.try_find(2).unwrap());
        assert_eq!(Some("ab".to_string()), view.try_find(3).unwrap());
        assert_eq!(None, view.try_find(4).unwrap());
    }

    #[test]
    fn test_non_ascii_and_empty() {
        let mut storage = storage(128);
        let mut page = storage.allocate(PageType::StringList).unwrap();
        let mut view = StringListView::new(&mut page).unwrap();

        assert!(view.try_add(7, "").unwrap());
        assert!(view.try_add(8, "grüße 🦀").unwrap());
        assert_eq!(Some(String::new()), view.try_find(7).unwrap());
        assert_eq!(Some("grüße 🦀".to_string()), view.try_find(8).unwrap());
        assert_eq!(STRING_RECORD_HEADER_SIZE + 16, StringListView::encoded_size("grüße 🦀"));
    }

    #[test]
    fn test_invalid_index() {
        let mut storage = storage(128);
        let mut page = storage.allocate(PageType::StringList).unwrap();
        let mut view = StringListView::new(&mut page).unwrap();

        for index in [0, -1] {
            let err = view.try_add(index, "Foo").unwrap_err();
            assert!(matches!(
                err.downcast_ref::<StorageError>(),
                Some(StorageError::InvalidArgument(_))
            ));
        }
        assert_eq!(0, view.string_count().unwrap());
    }

    #[test]
    fn test_corrupted_length() {
        let mut storage = storage(64);
        let mut page = storage.allocate(PageType::StringList).unwrap();
        page.write_at(STRING_DATA_OFFSET, &1i32.to_le_bytes()).unwrap();
        page.write_at(STRING_DATA_OFFSET + 4, &400i32.to_le_bytes()).unwrap();

        let Err(err) = StringListView::new(&mut page) else {
            panic!("the record does not fit into the page");
        };
        assert!(matches!(
            err.downcast_ref::<StorageError>(),
            Some(StorageError::Corrupted(_))
        ));
    }
}
