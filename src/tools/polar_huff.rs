//! Length-limited static Huffman ("polar") tables.
//!
//! Only code lengths are transmitted.  Both sides rebuild the canonical codes from
//! the lengths, so `make_length_table` must be reproduced exactly by any encoder
//! that wants to interoperate, while the code and decode tables are pure functions
//! of the lengths.
//!
//! Codes are stored bit reversed, so that they can be pushed into an LSB-first
//! bit buffer as-is, and a decode table indexed by the next `n` bits of the stream
//! yields the symbol directly.

/// Value of a decode table slot that no code maps to.
pub const DECODE_NONE: u16 = u16::MAX;

/// largest power of two `<= x`, 0 stays 0
fn round_down(x: u32) -> u32 {
    match x {
        0 => 0,
        _ => 1 << (31 - x.leading_zeros())
    }
}

/// Derive code lengths from symbol frequencies, no length will exceed `max_codelen`.
/// Unused symbols get length 0, a lone used symbol gets length 1.
///
/// Frequencies are rounded down to powers of two, then, in order of descending
/// frequency (ties by symbol index), each allotment is doubled as long as the sum
/// fits in the next power of two above the total.  The length follows from the
/// ratio of that power to the allotment.  If some length is too long, the frequencies
/// are scaled down by another factor of two and the whole thing starts over.
pub fn make_length_table(freq: &[u32],length: &mut [u8],max_codelen: u8) {
    let n = freq.len();
    debug_assert_eq!(n,length.len());
    let mut work: Vec<u32> = vec![0;n];
    let mut symbols: Vec<usize> = (0..n).collect();
    let mut scaling: u32 = 0;
    'scaling: loop {
        for i in 0..n {
            work[i] = match freq[i].checked_shr(scaling).unwrap_or(0) {
                0 if freq[i] > 0 => 1,
                f => f
            };
        }
        // stable, so equal frequencies stay in symbol order
        for (i,s) in symbols.iter_mut().enumerate() {
            *s = i;
        }
        symbols.sort_by(|&a,&b| work[b].cmp(&work[a]));

        let mut total: u32 = work.iter().sum();
        let mut run: u32 = 0;
        for w in work.iter_mut() {
            *w = round_down(*w);
            run += *w;
        }
        total = round_down(total) << 1;

        while run < total {
            for &s in symbols.iter() {
                if run + work[s] <= total {
                    run += work[s];
                    work[s] *= 2;
                }
            }
        }

        for i in 0..n {
            length[i] = match work[i] {
                0 => 0,
                w => {
                    let mut codelen: u32 = 1;
                    while (total / w) >> (codelen + 1) != 0 {
                        codelen += 1;
                    }
                    codelen as u8
                }
            };
            if length[i] > max_codelen {
                scaling += 1;
                log::trace!("code length {} exceeds {}, scaling by {}",length[i],max_codelen,scaling);
                continue 'scaling;
            }
        }
        return;
    }
}

/// Assign canonical codes to `length`, shortest first, then by symbol index.
/// Each code is bit reversed within its own length.  Symbols with length 0 get code 0.
pub fn make_encode_table(length: &[u8],code: &mut [u16],max_codelen: u8) {
    debug_assert_eq!(length.len(),code.len());
    let mut next: u32 = 0;
    code.fill(0);
    for codelen in 1..=max_codelen {
        for (i,&len) in length.iter().enumerate() {
            if len == codelen {
                code[i] = next as u16;
                next += 1;
            }
        }
        next <<= 1;
    }
    for (c,&len) in code.iter_mut().zip(length) {
        *c = match len {
            0 => 0,
            len => c.reverse_bits() >> (16 - len as u32)
        };
    }
}

/// Fill a direct lookup table whose size is a power of two, `2^bits`.
/// Every slot whose low `length` bits equal a symbol's code gets the symbol.
/// Symbols with codes longer than `bits` are left out, their slots stay `DECODE_NONE`.
pub fn make_decode_table(length: &[u8],code: &[u16],decode: &mut [u16]) {
    let size = decode.len();
    debug_assert!(size.is_power_of_two());
    let table_bits = size.trailing_zeros();
    decode.fill(DECODE_NONE);
    for (sym,(&len,&c)) in length.iter().zip(code).enumerate() {
        if len > 0 && len as u32 <= table_bits {
            for i in (c as usize..size).step_by(1 << len) {
                decode[i] = sym as u16;
            }
        }
    }
}

#[cfg(test)]
fn lcg_freqs(seed: u32,n: usize,modulus: u32) -> Vec<u32> {
    let mut x = seed;
    let mut ans = Vec::new();
    for _i in 0..n {
        x = x.wrapping_mul(1103515245).wrapping_add(12345);
        let f = (x >> 8) % modulus;
        // skew things so some symbols are rare and some unused
        ans.push(if f % 7 == 0 { 0 } else { f * f / modulus });
    }
    ans
}

#[test]
fn length_table_works() {
    let freq = [0,10000,1,1];
    let mut length = [0;4];
    make_length_table(&freq,&mut length,8);
    assert_eq!(length,[0,1,2,2]);
}

#[test]
fn length_table_edge_cases() {
    let mut length = [9;6];
    make_length_table(&[0;6],&mut length,8);
    assert_eq!(length,[0;6]);
    make_length_table(&[0,0,5,0,0,0],&mut length,8);
    assert_eq!(length,[0,0,1,0,0,0]);
    make_length_table(&[3,0,3,0,0,0],&mut length,8);
    assert_eq!(length,[1,0,1,0,0,0]);
}

#[test]
fn length_table_is_limited() {
    // fibonacci frequencies produce very deep unlimited trees
    let mut freq = vec![1u32,1];
    while freq.len() < 32 {
        let k = freq.len();
        freq.push(freq[k-1] + freq[k-2]);
    }
    let mut length = vec![0;32];
    make_length_table(&freq,&mut length,8);
    assert!(length.iter().all(|&l| l > 0 && l <= 8));
    // more frequent never gets a longer code
    for i in 1..32 {
        assert!(length[i] <= length[i-1]);
    }
}

#[test]
fn kraft_inequality() {
    for seed in 0..20 {
        for (n,max_codelen) in [(512,15),(32,8)] {
            let freq = lcg_freqs(seed,n,4000);
            let mut length = vec![0;n];
            make_length_table(&freq,&mut length,max_codelen);
            let mut kraft = 0u64;
            for (i,&len) in length.iter().enumerate() {
                assert!(len <= max_codelen);
                assert_eq!(len > 0,freq[i] > 0);
                if len > 0 {
                    kraft += 1 << (max_codelen - len);
                }
            }
            assert!(kraft <= 1 << max_codelen);
        }
    }
}

#[test]
fn encode_table_works() {
    let length = [0,1,2,2];
    let mut code = [0;4];
    make_encode_table(&length,&mut code,8);
    // 0 -> 0, 10 -> 01, 11 -> 11
    assert_eq!(code,[0,0,1,3]);
}

#[test]
fn decode_table_works() {
    let length = [0,1,2,2];
    let mut code = [0;4];
    let mut decode = [0;256];
    make_encode_table(&length,&mut code,8);
    make_decode_table(&length,&code,&mut decode);
    for i in 0..256 {
        let expected = match i & 3 {
            0 | 2 => 1,
            1 => 2,
            _ => 3
        };
        assert_eq!(decode[i],expected);
    }
}

#[test]
fn tables_invert_each_other() {
    for seed in 0..10 {
        let freq = lcg_freqs(seed + 100,512,30000);
        let mut length = vec![0;512];
        let mut code = vec![0;512];
        let mut decode = vec![0;1 << 15];
        let mut fast = vec![0;1 << 10];
        make_length_table(&freq,&mut length,15);
        make_encode_table(&length,&mut code,15);
        make_decode_table(&length,&code,&mut decode);
        make_decode_table(&length,&code,&mut fast);
        for sym in 0..512 {
            if length[sym] == 0 {
                continue;
            }
            // whatever follows the code must not matter
            let c = code[sym] as usize;
            let junk = (sym * 7919) << length[sym];
            assert_eq!(decode[(c | junk) & 0x7fff],sym as u16);
            let f = fast[(c | junk) & 0x3ff];
            match length[sym] {
                len if len <= 10 => assert_eq!(f,sym as u16),
                _ => assert_eq!(f,DECODE_NONE)
            }
        }
    }
}
