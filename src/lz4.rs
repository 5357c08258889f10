pub fn compress_bound(n: usize) -> usize {
    lz4_flex::block::get_maximum_output_size(n)
}

// None (not an error) means dst was too small for the worst case
pub fn compress(src: &[u8], dst: &mut [u8]) -> Option<usize> {
    lz4_flex::block::compress_into(src, dst).ok()
}
