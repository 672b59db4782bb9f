pub(crate) trait SliceExt {
    fn read_u16(&self) -> u16;
    fn read_i32(&self) -> i32;
    fn read_i64(&self) -> i64;
}

impl SliceExt for [u8] {
    fn read_u16(&self) -> u16 {
        u16::from_le_bytes(self[..2].try_into().unwrap())
    }
    fn read_i32(&self) -> i32 {
        i32::from_le_bytes(self[..4].try_into().unwrap())
    }
    fn read_i64(&self) -> i64 {
        i64::from_le_bytes(self[..8].try_into().unwrap())
    }
}
