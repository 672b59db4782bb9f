use crate::error::StorageError;
use crate::pager::{Page, PageType};
use crate::view::{check_page, PageFieldExt, PageView};
use chrono::{DateTime, Utc};
use std::ops::Range;

pub const CURRENT_STORAGE_VERSION: i32 = 1;

const VERSION_OFFSET: usize = 0;
const TIME_KIND_OFFSET: usize = 4;
const TIME_TICKS_RANGE: Range<usize> = 5..13;
const STORAGE_HEADER_SIZE: usize = TIME_TICKS_RANGE.end;

/// Timestamps are stored as 100ns ticks since 0001-01-01T00:00:00, tagged with a kind byte.
const TICKS_PER_SECOND: i64 = 10_000_000;
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;
const TIME_KIND_UNSPECIFIED: u8 = 0;
const TIME_KIND_UTC: u8 = 1;
const TIME_KIND_LOCAL: u8 = 2;

/// The first page of every storage: `[version: i32][kind: u8][ticks: i64]`.
///
/// Fields are read when the view is built and written back on flush.
pub struct StorageHeaderView<'a> {
    page: &'a mut Page,
    version: i32,
    creation_time: DateTime<Utc>,
}

impl<'a> StorageHeaderView<'a> {
    pub fn new(page: &'a mut Page) -> anyhow::Result<Self> {
        check_page::<Self>(page)?;

        let version = page.read_i32_at(VERSION_OFFSET)?;
        let kind = page.read_u8_at(TIME_KIND_OFFSET)?;
        let ticks = page.read_i64_at(TIME_TICKS_RANGE.start)?;
        if !matches!(kind, TIME_KIND_UNSPECIFIED | TIME_KIND_UTC | TIME_KIND_LOCAL) {
            return Err(StorageError::corrupted(format!("unknown time kind {kind}")).into());
        }
        let creation_time = ticks_to_time(ticks)?;

        Ok(Self {
            page,
            version,
            creation_time,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn set_creation_time(&mut self, creation_time: DateTime<Utc>) {
        self.creation_time = creation_time;
    }
}

impl PageView for StorageHeaderView<'_> {
    const PAGE_TYPE: PageType = PageType::StorageDescriptor;
    const HEADER_SIZE: usize = STORAGE_HEADER_SIZE;

    fn page(&mut self) -> &mut Page {
        self.page
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        let ticks = time_to_ticks(&self.creation_time)?;
        self.page.write_i32_at(VERSION_OFFSET, self.version)?;
        self.page.write_at(TIME_KIND_OFFSET, &[TIME_KIND_UTC])?;
        self.page.write_at(TIME_TICKS_RANGE.start, &ticks.to_le_bytes())
    }
}

fn ticks_to_time(ticks: i64) -> anyhow::Result<DateTime<Utc>> {
    if ticks < 0 {
        return Err(StorageError::corrupted(format!("creation time {ticks} is negative")).into());
    }
    let since_epoch = ticks - UNIX_EPOCH_TICKS;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = since_epoch.rem_euclid(TICKS_PER_SECOND) as u32 * 100;
    DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
        StorageError::corrupted(format!("creation time {ticks} is out of range")).into()
    })
}

fn time_to_ticks(time: &DateTime<Utc>) -> anyhow::Result<i64> {
    time.timestamp()
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|ticks| ticks.checked_add(time.timestamp_subsec_nanos() as i64 / 100))
        .and_then(|ticks| ticks.checked_add(UNIX_EPOCH_TICKS))
        .filter(|ticks| *ticks >= 0)
        .ok_or_else(|| {
            StorageError::invalid_argument(format!("creation time {time} cannot be stored")).into()
        })
}
