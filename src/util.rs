/// Splits off the first `N` bytes as an array
#[inline]
pub(crate) fn get_split<const N: usize>(data: &[u8]) -> Option<([u8; N], &[u8])> {
    data.split_first_chunk::<N>().map(|(head, rest)| (*head, rest))
}

#[inline]
pub(crate) fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let (head, _) = get_split::<2>(data.get(offset..)?)?;
    Some(u16::from_be_bytes(head))
}

#[inline]
pub(crate) fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let (head, _) = get_split::<4>(data.get(offset..)?)?;
    Some(u32::from_be_bytes(head))
}

/// Reads a big-endian u64 starting at `offset`, treating bytes past the end
/// of the slice as zero
#[inline]
pub(crate) fn be_u64_padded(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    if let Some(rest) = data.get(offset..) {
        let len = rest.len().min(8);
        buf[..len].copy_from_slice(&rest[..len]);
    }
    u64::from_be_bytes(buf)
}

#[inline]
pub(crate) fn put_be_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Number of NUL bytes needed after `len` bytes to reach the next 4 byte
/// boundary. Always at least one.
#[inline]
pub(crate) const fn pad4(len: usize) -> usize {
    4 - (len % 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case(0, 4)]
    #[case(1, 3)]
    #[case(3, 1)]
    #[case(4, 4)]
    #[case(13, 3)]
    fn test_pad4(#[case] len: usize, #[case] expected: usize) {
        assert_eq!(pad4(len), expected);
        assert_eq!((len + pad4(len)) % 4, 0);
    }

    #[test]
    fn test_big_endian_reads() {
        let data = [0x00, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(be_u16(&data, 0), Some(0x0001));
        assert_eq!(be_u32(&data, 1), Some(0x0102_0304));
        assert_eq!(be_u32(&data, 2), None);
        assert_eq!(be_u16(&data, 10), None);
    }

    #[test]
    fn test_padded_u64_read() {
        let data = [0xaa, 0xbb];
        assert_eq!(be_u64_padded(&data, 0), 0xaabb_0000_0000_0000);
        assert_eq!(be_u64_padded(&data, 5), 0);
    }
}
