use crate::pager::{PageStorage, Stream};
use crate::strings::StringStorage;
use indexmap::IndexMap;

/// Maps data type names to the string indexes they are stored under. Names seen during this
/// session are reused instead of being stored again.
#[derive(Default)]
pub struct TypeStorage {
    known: IndexMap<String, i32>,
}

impl TypeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: Stream>(
        &mut self,
        pages: &mut PageStorage<S>,
        strings: &mut StringStorage,
        type_name: &str,
    ) -> anyhow::Result<i32> {
        if let Some(index) = self.known.get(type_name) {
            return Ok(*index);
        }
        let index = strings.add(pages, type_name)?;
        self.known.insert(type_name.to_string(), index);
        Ok(index)
    }

    pub fn load<S: Stream>(
        &mut self,
        pages: &PageStorage<S>,
        strings: &StringStorage,
        index: i32,
    ) -> anyhow::Result<String> {
        let type_name = strings.load(pages, index)?;
        self.known.entry(type_name.clone()).or_insert(index);
        Ok(type_name)
    }
}
