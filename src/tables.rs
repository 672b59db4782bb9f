use crate::error::StorageError;
use crate::id::PageId;
use crate::pager::{PageStorage, PageType, Stream, PAGE_HEADER_SIZE};
use crate::strings::StringStorage;
use crate::types::TypeStorage;
use crate::view::{ColumnDescription, PageView, TableDescriptorView};
use indexmap::IndexMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnLayout {
    pub name: String,
    pub data_type: String,
}

/// The shape of a table's rows: the row data type and its ordered columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableLayout {
    data_type: String,
    columns: Vec<ColumnLayout>,
}

impl TableLayout {
    pub fn new(data_type: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            columns: vec![],
        }
    }

    pub fn column(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.columns.push(ColumnLayout {
            name: name.into(),
            data_type: data_type.into(),
        });
        self
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn columns(&self) -> &[ColumnLayout] {
        &self.columns
    }
}

/// Types whose values are rows of a table.
pub trait Record {
    fn layout() -> TableLayout;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    name: String,
    layout: TableLayout,
    descriptor: PageId,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Id of the page describing this table.
    pub fn descriptor_id(&self) -> PageId {
        self.descriptor
    }
}

/// Catalog of tables. Each table is described by one table-descriptor page; the pages form a
/// chain through their `next_table_descriptor_id` in the order the tables were added.
pub struct TableStorage {
    tables: IndexMap<String, Table>,
    last: Option<PageId>,
}

impl TableStorage {
    pub fn open<S: Stream>(
        pages: &mut PageStorage<S>,
        strings: &StringStorage,
        types: &mut TypeStorage,
    ) -> anyhow::Result<Self> {
        let descriptors = pages
            .pages()?
            .into_iter()
            .filter(|descriptor| descriptor.page_type() == PageType::TableDescriptor);

        let mut found = IndexMap::new();
        for descriptor in descriptors {
            let mut page = pages.load(descriptor)?;
            let mut view = TableDescriptorView::new(&mut page)?;

            let name = strings.load(pages, view.table_name_index()?)?;
            let mut layout = TableLayout::new(types.load(pages, strings, view.data_type_index()?)?);
            for column in view.columns()? {
                layout = layout.column(
                    strings.load(pages, column.name_index)?,
                    types.load(pages, strings, column.data_type_index)?,
                );
            }
            let table = Table {
                name,
                layout,
                descriptor: descriptor.id(),
            };
            found.insert(descriptor.id(), (view.next_table_descriptor_id()?, table));
        }

        let mut heads = found
            .keys()
            .filter(|id| !found.values().any(|(next, _)| *next == Some(**id)));
        let head = heads.next().copied();
        if heads.next().is_some() {
            return Err(
                StorageError::corrupted("table descriptors form more than one chain").into(),
            );
        }

        let mut tables = IndexMap::with_capacity(found.len());
        let mut last = None;
        let mut cursor = head;
        while let Some(id) = cursor {
            let Some((next, table)) = found.swap_remove(&id) else {
                return Err(StorageError::corrupted(format!(
                    "table descriptor chain refers to page {id}, which is not a table descriptor"
                ))
                .into());
            };
            if tables.contains_key(&table.name) {
                return Err(StorageError::corrupted(format!(
                    "table {} is described twice",
                    table.name
                ))
                .into());
            }
            tables.insert(table.name.clone(), table);
            last = Some(id);
            cursor = next;
        }
        if !found.is_empty() {
            return Err(StorageError::corrupted(format!(
                "{} table descriptors are not part of the chain",
                found.len()
            ))
            .into());
        }

        log::debug!("opened {} tables", tables.len());
        Ok(Self { tables, last })
    }

    /// Persists a new table. The name has to be unique and all columns have to fit into one
    /// table-descriptor page.
    pub fn add<S: Stream>(
        &mut self,
        pages: &mut PageStorage<S>,
        strings: &mut StringStorage,
        types: &mut TypeStorage,
        name: &str,
        layout: TableLayout,
    ) -> anyhow::Result<&Table> {
        if self.tables.contains_key(name) {
            return Err(
                StorageError::invalid_argument(format!("table {name} already exists")).into(),
            );
        }
        let capacity = TableDescriptorView::capacity(pages.page_size() - PAGE_HEADER_SIZE);
        if layout.columns.len() > capacity {
            return Err(StorageError::invalid_argument(format!(
                "table {name} has {} columns, a table can have at most {capacity}",
                layout.columns.len()
            ))
            .into());
        }

        // TODO: strings stored before a failure below stay in the ledger unreferenced
        let name_index = strings.add(pages, name)?;
        let data_type_index = types.add(pages, strings, &layout.data_type)?;
        let mut columns = Vec::with_capacity(layout.columns.len());
        for column in &layout.columns {
            columns.push(ColumnDescription {
                data_type_index: types.add(pages, strings, &column.data_type)?,
                name_index: strings.add(pages, &column.name)?,
            });
        }

        let mut page = pages.allocate(PageType::TableDescriptor)?;
        let id = page.id();
        let mut view = TableDescriptorView::new(&mut page)?;
        view.set_table_name_index(name_index)?;
        view.set_data_type_index(data_type_index)?;
        view.set_next_table_descriptor_id(None)?;
        view.set_column_count(columns.len())?;
        for (i, column) in columns.into_iter().enumerate() {
            view.set_column(i, column)?;
        }
        view.commit()?;

        if let Some(last) = self.last {
            let mut page = pages.load_by_id(last, PageType::TableDescriptor)?;
            let mut view = TableDescriptorView::new(&mut page)?;
            view.set_next_table_descriptor_id(Some(id))?;
            view.commit()?;
        }
        self.last = Some(id);

        log::debug!("added table {name} at page {id}");
        let table = Table {
            name: name.to_string(),
            layout,
            descriptor: id,
        };
        Ok(self.tables.entry(name.to_string()).or_insert(table))
    }

    /// Adds a table whose layout comes from the record type.
    pub fn add_record<T: Record, S: Stream>(
        &mut self,
        pages: &mut PageStorage<S>,
        strings: &mut StringStorage,
        types: &mut TypeStorage,
        name: &str,
    ) -> anyhow::Result<&Table> {
        self.add(pages, strings, types, name, T::layout())
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Tables in the order they were added.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
