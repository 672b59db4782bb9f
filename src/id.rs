use std::fmt;

/// Sequence number of a page. Ids are dense: the page with id `n` is the `n`-th record of the
/// stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageId(i32);

impl PageId {
    #[inline]
    pub fn new(id: i32) -> Option<Self> {
        if id < 0 {
            None
        } else {
            Some(Self(id))
        }
    }

    #[inline]
    pub fn get(&self) -> i32 {
        self.0
    }

    #[inline]
    pub(crate) fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    #[inline]
    pub(crate) fn to_le_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Decodes a page link, where anything below 1 means there is no linked page.
    #[inline]
    pub(crate) fn from_link_bytes(pgid: [u8; 4]) -> Option<Self> {
        let val = i32::from_le_bytes(pgid);
        if val < 1 {
            None
        } else {
            Some(Self(val))
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) trait PageLinkExt {
    fn to_link_bytes(&self) -> [u8; 4];
}

impl PageLinkExt for Option<PageId> {
    #[inline]
    fn to_link_bytes(&self) -> [u8; 4] {
        if let Some(pgid) = self {
            pgid.to_le_bytes()
        } else {
            0i32.to_le_bytes()
        }
    }
}
