//! Codebook for ROLZ match indices.
//!
//! A match index (distance behind the bucket head, `0..BUCKET_ITEM_SIZE`) is sent as
//! a Huffman coded class followed by a number of verbatim extra bits.  Small indices
//! are the most common, so they get classes of their own, after which the classes
//! cover exponentially growing ranges until they reach 256 indices each.
//!
//! The class widths and bases are part of the stream format and are kept as data.
//! The per-index lookup tables are expanded from them at compile time.

use super::rolz::BUCKET_ITEM_SIZE;

/// number of index classes, this is the size of the second Huffman alphabet
pub const MATCHIDX_CODES: usize = 32;

/// extra bits following each class code
pub const MATCHIDX_BITLEN: [u8;MATCHIDX_CODES] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6,
    7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8
];

/// first index in each class
pub const MATCHIDX_BASE: [u16;MATCHIDX_CODES] = [
       0,    1,    2,    3,    4,    6,    8,   12,
      16,   24,   32,   48,   64,   96,  128,  192,
     256,  384,  512,  768, 1024, 1280, 1536, 1792,
    2048, 2304, 2560, 2816, 3072, 3328, 3584, 3840
];

const fn expand_code() -> [u8;BUCKET_ITEM_SIZE] {
    let mut ans = [0;BUCKET_ITEM_SIZE];
    let mut code = 0;
    let mut idx = 0;
    while idx < BUCKET_ITEM_SIZE {
        if code + 1 < MATCHIDX_CODES && idx == MATCHIDX_BASE[code + 1] as usize {
            code += 1;
        }
        ans[idx] = code as u8;
        idx += 1;
    }
    ans
}

const MATCHIDX_CODE: [u8;BUCKET_ITEM_SIZE] = expand_code();

/// class of a match index
#[inline]
pub fn idx_to_code(idx: u16) -> usize {
    MATCHIDX_CODE[idx as usize] as usize
}

/// extra bits of a match index, i.e., its offset within the class
#[inline]
pub fn idx_to_bits(idx: u16) -> u16 {
    idx - MATCHIDX_BASE[idx_to_code(idx)]
}

/// number of extra bits that follow the class of a match index
#[inline]
pub fn idx_to_bitlen(idx: u16) -> u32 {
    MATCHIDX_BITLEN[idx_to_code(idx)] as u32
}

/// number of extra bits that follow a class code
#[inline]
pub fn code_to_bitlen(code: usize) -> u32 {
    MATCHIDX_BITLEN[code] as u32
}

/// Put the index back together.  The result can be out of range if the stream is corrupt,
/// callers must check against `BUCKET_ITEM_SIZE`.
#[inline]
pub fn idx_from_code_bits(code: usize,bits: u16) -> u16 {
    MATCHIDX_BASE[code] | bits
}

#[test]
fn classes_tile_the_ring() {
    // each class starts where the previous one ends, and the last one ends at the ring size
    for code in 1..MATCHIDX_CODES {
        let prev_end = MATCHIDX_BASE[code-1] as usize + (1 << MATCHIDX_BITLEN[code-1]);
        assert_eq!(MATCHIDX_BASE[code] as usize,prev_end);
    }
    let last = MATCHIDX_CODES - 1;
    assert_eq!(MATCHIDX_BASE[last] as usize + (1 << MATCHIDX_BITLEN[last]),BUCKET_ITEM_SIZE);
    assert_eq!(MATCHIDX_CODES % 2,0);
}

#[test]
fn canonical_values() {
    let expected: [(u16,usize,u16,u32);12] = [
        (0,0,0,0),
        (3,3,0,0),
        (4,4,0,1),
        (5,4,1,1),
        (7,5,1,1),
        (8,6,0,2),
        (100,13,4,5),
        (255,15,63,6),
        (511,17,127,7),
        (512,18,0,8),
        (3000,27,184,8),
        (4095,31,255,8)
    ];
    for (idx,code,bits,bitlen) in expected {
        assert_eq!(idx_to_code(idx),code,"class of {}",idx);
        assert_eq!(idx_to_bits(idx),bits,"bits of {}",idx);
        assert_eq!(idx_to_bitlen(idx),bitlen,"bit length of {}",idx);
    }
}

#[test]
fn every_index_is_recovered() {
    for idx in 0..BUCKET_ITEM_SIZE as u16 {
        let code = idx_to_code(idx);
        let bits = idx_to_bits(idx);
        assert!(bits < 1 << code_to_bitlen(code));
        assert_eq!(idx_from_code_bits(code,bits),idx);
    }
}
