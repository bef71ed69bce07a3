use crate::common::{Result, SdbError, PAGE_SIZE};

use super::Page;

/// Tuple page layout:
///
/// ```text
/// +--------------+--------------+---------------------------------------+
/// | count (u16)  | free (u16)   | [len u16][tuple] [len u16][tuple] ... |
/// +--------------+--------------+---------------------------------------+
/// ```
///
/// Records are appended after the header and addressed by their byte offset,
/// which is what a `Locator` stores. A zeroed page reads as an empty tuple page.
const HEADER_SIZE: usize = 4;

const TUPLE_COUNT_OFFSET: usize = 0;
const FREE_OFFSET_OFFSET: usize = 2;

/// Size of the length prefix in front of every record
const RECORD_LEN_SIZE: usize = 2;

/// Largest encoded tuple that fits in an empty page
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - HEADER_SIZE - RECORD_LEN_SIZE;

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn tuple_count(data: &[u8]) -> u16 {
    read_u16(data, TUPLE_COUNT_OFFSET)
}

fn free_offset(data: &[u8]) -> Result<usize> {
    match read_u16(data, FREE_OFFSET_OFFSET) as usize {
        0 => Ok(HEADER_SIZE),
        off if (HEADER_SIZE..=PAGE_SIZE).contains(&off) => Ok(off),
        off => Err(SdbError::corrupt(format!("tuple page free offset {} out of range", off))),
    }
}

fn free_space(data: &[u8]) -> Result<usize> {
    let used = free_offset(data)?;
    Ok((PAGE_SIZE - used).saturating_sub(RECORD_LEN_SIZE))
}

fn get_record(data: &[u8], offset: u32) -> Result<&[u8]> {
    let offset = offset as usize;
    let end = free_offset(data)?;
    if offset < HEADER_SIZE || offset + RECORD_LEN_SIZE > end {
        return Err(SdbError::corrupt(format!("no tuple at offset {}", offset)));
    }
    let len = read_u16(data, offset) as usize;
    let start = offset + RECORD_LEN_SIZE;
    if start + len > end {
        return Err(SdbError::corrupt(format!(
            "tuple at offset {} overruns the page ({} bytes)",
            offset, len
        )));
    }
    Ok(&data[start..start + len])
}

fn records(data: &[u8]) -> Result<Vec<(u32, &[u8])>> {
    let count = tuple_count(data) as usize;
    let mut out = Vec::with_capacity(count);
    let mut offset = HEADER_SIZE;
    for _ in 0..count {
        let record = get_record(data, offset as u32)?;
        out.push((offset as u32, record));
        offset += RECORD_LEN_SIZE + record.len();
    }
    Ok(out)
}

/// TuplePage provides methods to append and read encoded tuples inside a page.
pub struct TuplePage<'a> {
    page: &'a mut Page,
}

impl<'a> TuplePage<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Resets the page to an empty tuple page.
    pub fn init(&mut self) {
        self.page.clear();
        write_u16(self.page.data_mut(), FREE_OFFSET_OFFSET, HEADER_SIZE as u16);
    }

    pub fn tuple_count(&self) -> u16 {
        tuple_count(self.page.data())
    }

    /// Bytes still available for one more record, excluding its length prefix.
    pub fn free_space(&self) -> Result<usize> {
        free_space(self.page.data())
    }

    /// Appends an encoded tuple and returns its offset within the page.
    pub fn insert(&mut self, tuple: &[u8]) -> Result<u32> {
        let available = self.free_space()?;
        if tuple.len() > available {
            return Err(SdbError::PageOverflow {
                tuple_size: tuple.len(),
                available,
            });
        }

        let offset = free_offset(self.page.data())?;
        let data = self.page.data_mut();
        write_u16(data, offset, tuple.len() as u16);
        data[offset + RECORD_LEN_SIZE..offset + RECORD_LEN_SIZE + tuple.len()]
            .copy_from_slice(tuple);

        let next = offset + RECORD_LEN_SIZE + tuple.len();
        let count = tuple_count(data);
        write_u16(data, FREE_OFFSET_OFFSET, next as u16);
        write_u16(data, TUPLE_COUNT_OFFSET, count + 1);

        Ok(offset as u32)
    }

    pub fn get(&self, offset: u32) -> Result<&[u8]> {
        get_record(self.page.data(), offset)
    }
}

/// Read-only view of a tuple page
pub struct TuplePageRef<'a> {
    data: &'a [u8],
}

impl<'a> TuplePageRef<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { data: page.data() }
    }

    pub fn tuple_count(&self) -> u16 {
        tuple_count(self.data)
    }

    pub fn free_space(&self) -> Result<usize> {
        free_space(self.data)
    }

    pub fn get(&self, offset: u32) -> Result<&'a [u8]> {
        get_record(self.data, offset)
    }

    /// Every record in insertion order, paired with its offset.
    pub fn records(&self) -> Result<Vec<(u32, &'a [u8])>> {
        records(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_page_is_empty() {
        let mut page = Page::zeroed();
        let tp = TuplePage::new(&mut page);
        assert_eq!(tp.tuple_count(), 0);
        assert_eq!(tp.free_space().unwrap(), PAGE_SIZE - HEADER_SIZE - RECORD_LEN_SIZE);
    }

    #[test]
    fn test_insert_and_get() {
        let mut page = Page::zeroed();
        let (a, b) = {
            let mut tp = TuplePage::new(&mut page);
            tp.init();
            let a = tp.insert(b"first").unwrap();
            let b = tp.insert(b"second tuple").unwrap();
            assert_eq!(tp.get(a).unwrap(), b"first");
            (a, b)
        };
        assert_eq!(a, HEADER_SIZE as u32);
        assert_eq!(b, (HEADER_SIZE + RECORD_LEN_SIZE + 5) as u32);

        let view = TuplePageRef::new(&page);
        assert_eq!(view.tuple_count(), 2);
        assert_eq!(view.get(b).unwrap(), b"second tuple");
        let records = view.records().unwrap();
        assert_eq!(records, vec![(a, &b"first"[..]), (b, &b"second tuple"[..])]);
    }

    #[test]
    fn test_page_overflow() {
        let mut page = Page::zeroed();
        let mut tp = TuplePage::new(&mut page);
        let big = vec![1u8; PAGE_SIZE];
        assert!(matches!(tp.insert(&big), Err(SdbError::PageOverflow { .. })));

        let fits = vec![1u8; tp.free_space().unwrap()];
        tp.insert(&fits).unwrap();
        assert_eq!(tp.free_space().unwrap(), 0);
        assert!(tp.insert(b"x").is_err());
    }

    #[test]
    fn test_bad_offsets_are_corrupt() {
        let mut page = Page::zeroed();
        let mut tp = TuplePage::new(&mut page);
        tp.insert(b"abc").unwrap();
        assert!(tp.get(0).unwrap_err().is_corrupt());
        assert!(tp.get(3000).unwrap_err().is_corrupt());

        page.write(HEADER_SIZE, &500u16.to_le_bytes()).unwrap();
        assert!(TuplePageRef::new(&page).get(HEADER_SIZE as u32).unwrap_err().is_corrupt());
    }
}
