//! Network byte-order conversions for frame headers.
//!
//! A WebSocket header stores the 16-bit and 64-bit extended payload lengths
//! big-endian, and a close frame opens with a big-endian status code. The
//! conversions live here so the `big_endian_bytes` lint expectation sits in
//! one place instead of at every header field.

macro_rules! network_order {
    ($ty:ty, $width:literal, $write:ident, $read:ident) => {
        #[doc = concat!("Serialise a `", stringify!($ty), "` header field big-endian.")]
        #[must_use]
        pub fn $write(value: $ty) -> [u8; $width] {
            #[expect(
                clippy::big_endian_bytes,
                reason = "WebSocket header fields are big-endian on the wire."
            )]
            value.to_be_bytes()
        }

        #[doc = concat!("Parse a big-endian `", stringify!($ty), "` header field.")]
        #[must_use]
        pub fn $read(bytes: [u8; $width]) -> $ty {
            #[expect(
                clippy::big_endian_bytes,
                reason = "WebSocket header fields are big-endian on the wire."
            )]
            <$ty>::from_be_bytes(bytes)
        }
    };
}

network_order!(u16, 2, write_network_u16, read_network_u16);
network_order!(u64, 8, write_network_u64, read_network_u64);

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::normal_closure(1000, [0x03, 0xE8])]
    #[case::largest_sixteen_bit_length(65_535, [0xFF, 0xFF])]
    fn sixteen_bit_fields(#[case] value: u16, #[case] wire: [u8; 2]) {
        assert_eq!(write_network_u16(value), wire);
        assert_eq!(read_network_u16(wire), value);
    }

    #[test]
    fn first_sixty_four_bit_length() {
        let wire = [0, 0, 0, 0, 0, 1, 0, 0];
        assert_eq!(write_network_u64(65_536), wire);
        assert_eq!(read_network_u64(wire), 65_536);
    }
}
