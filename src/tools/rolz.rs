//! Reduced offset LZ (ROLZ) stage.
//!
//! Matches are only searched among earlier positions that were preceded by the same
//! byte as the current position.  There is one bucket per preceding byte, each one
//! remembering the last `BUCKET_ITEM_SIZE` positions in a ring.  A match is then sent
//! as a distance behind the ring head rather than a byte offset.  The decoder keeps
//! the same rings (without the hash chains) and resolves the distance back to a position.
//!
//! Token stream: a value below 256 is a literal.  A value `v >= 256` starts a match of
//! length `v - 256 + MATCH_MIN_LEN`, and is always followed by the match index.
//!
//! Only the starting position of a match is entered into the history, both sides
//! must do exactly the same pushes or the indices lose their meaning.

use std::collections::TryReserveError;
use crate::Error;
use super::ring_buffer::RingBuffer;

/// ring slots per context byte
pub const BUCKET_ITEM_SIZE: usize = 4096;
/// hash chain heads per context byte
pub const BUCKET_ITEM_HASH: usize = 8192;
/// indices this far back need a match one longer to be worthwhile
pub const MATCH_DISCARD_MINLEN: usize = 3000;
pub const MATCH_MIN_LEN: usize = 4;
pub const MATCH_MAX_LEN: usize = 259;
/// number of chain nodes to try, unless the level says otherwise
pub const DEFAULT_MATCH_DEPTH: usize = 8;

const OFFSET_MASK: u32 = 0xffffff;

/// Hash of the 4 bytes at `pos`, bytes past the end count as 0.
/// Returns (check byte, hash slot).
#[inline]
fn hash_context(buf: &[u8],pos: usize) -> (u32,usize) {
    let hash = match buf.get(pos..pos+4) {
        Some(p) => p[0] as u32 * 33337 + p[1] as u32 * 3337 + p[2] as u32 * 337 + p[3] as u32,
        None => {
            let b = |i: usize| buf.get(pos+i).copied().unwrap_or(0) as u32;
            b(0) * 33337 + b(1) * 3337 + b(2) * 337 + b(3)
        }
    };
    ((hash / BUCKET_ITEM_HASH as u32) % 256, hash as usize % BUCKET_ITEM_HASH)
}

#[inline]
fn common_length(buf1: &[u8],buf2: &[u8],maxlen: usize) -> usize {
    buf1.iter().zip(buf2).take(maxlen).take_while(|(a,b)| a==b).count()
}

/// Copy `len` bytes from `src` to `dst` in the same buffer, `src < dst`.
/// The regions may overlap, in which case the bytes between `src` and `dst` repeat,
/// same as a byte by byte forward copy.  The block copied doubles on each pass.
#[inline]
fn incremental_copy(buf: &mut [u8],src: usize,mut dst: usize,mut len: usize) {
    while len > 0 {
        let n = (dst - src).min(len);
        buf.copy_within(src..src+n,dst);
        dst += n;
        len -= n;
    }
}

fn try_vec<T: Clone>(fill: T,n: usize) -> Result<Vec<T>,TryReserveError> {
    let mut ans = Vec::new();
    ans.try_reserve_exact(n)?;
    ans.resize(n,fill);
    Ok(ans)
}

/// History of one context byte on the compression side.
/// `offset` holds positions with the hash check byte in the top 8 bits,
/// `suffix` links each slot to the previous slot with the same hash.
struct EncodeBucket {
    suffix: Vec<u16>,
    offset: RingBuffer<u32>,
    hash: Vec<u16>
}

impl EncodeBucket {
    fn try_create() -> Result<Self,TryReserveError> {
        Ok(Self {
            suffix: try_vec(0,BUCKET_ITEM_SIZE)?,
            offset: RingBuffer::try_create(0,BUCKET_ITEM_SIZE)?,
            hash: try_vec(0,BUCKET_ITEM_HASH)?
        })
    }
    fn reset(&mut self) {
        self.suffix.fill(0);
        self.offset.reset(0);
        self.hash.fill(0);
    }
}

pub struct RolzEncoder {
    buckets: Vec<EncodeBucket>,
    depth: usize
}

impl RolzEncoder {
    /// Allocate the 256 buckets, `depth` is the number of chain nodes to try for each match.
    pub fn try_create(depth: usize) -> Result<Self,TryReserveError> {
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(256)?;
        for _i in 0..256 {
            buckets.push(EncodeBucket::try_create()?);
        }
        Ok(Self {
            buckets,
            depth
        })
    }
    /// forget all history, call at the start of each block
    pub fn reset(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.reset();
        }
    }
    /// Look for the longest match at `pos`, returns (index,length).
    /// Requires `pos > 0` and `pos + MATCH_MAX_LEN < buf.len()`.
    fn find_match(&self,buf: &[u8],pos: usize) -> Option<(usize,usize)> {
        let mut maxlen = MATCH_MIN_LEN - 1;
        let mut maxidx = 0;
        let (check,slot) = hash_context(buf,pos);
        let bucket = &self.buckets[buf[pos-1] as usize];
        let mut node = bucket.hash[slot] as usize;

        for _i in 0..self.depth {
            let stored = bucket.offset.get_abs(node);
            let offset = (stored & OFFSET_MASK) as usize;
            if stored >> 24 == check && buf[pos+maxlen] == buf[offset+maxlen] {
                let len = common_length(&buf[pos..],&buf[offset..],MATCH_MAX_LEN);
                if len > maxlen {
                    maxlen = len;
                    maxidx = bucket.offset.distance_behind(node);
                    if maxlen == MATCH_MAX_LEN {
                        break;
                    }
                }
            }
            // positions only go down along a chain, unless the ring has wrapped
            let next = bucket.suffix[node] as usize;
            if offset <= (bucket.offset.get_abs(next) & OFFSET_MASK) as usize {
                break;
            }
            node = next;
        }
        let min_len = MATCH_MIN_LEN + (maxidx >= MATCH_DISCARD_MINLEN) as usize;
        match maxlen >= min_len {
            true => Some((maxidx,maxlen)),
            false => None
        }
    }
    /// enter `pos` into the bucket of its preceding byte, requires `pos > 0`
    fn update(&mut self,buf: &[u8],pos: usize) {
        let (check,slot) = hash_context(buf,pos);
        let bucket = &mut self.buckets[buf[pos-1] as usize];
        bucket.offset.push(pos as u32 | check << 24);
        let head = bucket.offset.head();
        bucket.suffix[head] = bucket.hash[slot];
        bucket.hash[slot] = head as u16;
    }
    /// Encode `ibuf` starting at `encpos` into `obuf`, stopping when either the input
    /// is consumed or `obuf` is full.  Returns the number of tokens written and leaves
    /// `encpos` at the first byte not yet encoded.  `ibuf.len()` must be below 2^24.
    pub fn encode(&mut self,ibuf: &[u8],obuf: &mut [u16],encpos: &mut usize) -> usize {
        let ilen = ibuf.len();
        let olen = obuf.len();
        let mut ipos = *encpos;
        let mut opos = 0;

        // first byte has no context
        if ipos == 0 && opos < olen && ipos < ilen {
            obuf[opos] = ibuf[ipos] as u16;
            opos += 1;
            ipos += 1;
        }

        while opos + 1 < olen && ipos + MATCH_MAX_LEN < ilen {
            match self.find_match(ibuf,ipos) {
                Some((idx,len)) => {
                    obuf[opos] = (256 + len - MATCH_MIN_LEN) as u16;
                    obuf[opos+1] = idx as u16;
                    opos += 2;
                    self.update(ibuf,ipos);
                    ipos += len;
                },
                None => {
                    obuf[opos] = ibuf[ipos] as u16;
                    opos += 1;
                    self.update(ibuf,ipos);
                    ipos += 1;
                }
            }
        }

        // too close to the end to look ahead safely
        while opos < olen && ipos < ilen {
            obuf[opos] = ibuf[ipos] as u16;
            opos += 1;
            self.update(ibuf,ipos);
            ipos += 1;
        }
        *encpos = ipos;
        opos
    }
}

pub struct RolzDecoder {
    buckets: Vec<RingBuffer<u32>>
}

impl RolzDecoder {
    pub fn try_create() -> Result<Self,TryReserveError> {
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(256)?;
        for _i in 0..256 {
            buckets.push(RingBuffer::try_create(0,BUCKET_ITEM_SIZE)?);
        }
        Ok(Self {
            buckets
        })
    }
    /// forget all history, call at the start of each block
    pub fn reset(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.reset(0);
        }
    }
    /// position referenced by a match index at `pos`, requires `pos > 0`
    fn get_match(&self,buf: &[u8],pos: usize,idx: usize) -> usize {
        let bucket = &self.buckets[buf[pos-1] as usize];
        bucket.get_abs(bucket.slot_behind(idx)) as usize
    }
    fn update(&mut self,buf: &[u8],pos: usize) {
        self.buckets[buf[pos-1] as usize].push(pos as u32);
    }
    /// Decode the tokens in `ibuf` into `obuf` starting at `decpos`.
    /// Returns the number of tokens consumed and leaves `decpos` after the last byte written.
    /// Tokens that would reach outside of `obuf` or before the block are an error.
    pub fn decode(&mut self,ibuf: &[u16],obuf: &mut [u8],decpos: &mut usize) -> Result<usize,Error> {
        let ilen = ibuf.len();
        let mut opos = *decpos;
        let mut ipos = 0;

        // first byte has no context
        if opos == 0 && ipos < ilen {
            if ibuf[ipos] >= 256 || obuf.is_empty() {
                log::error!("block does not start with a literal");
                return Err(Error::BadMatch);
            }
            obuf[opos] = ibuf[ipos] as u8;
            opos += 1;
            ipos += 1;
        }

        while ipos < ilen {
            if ibuf[ipos] < 256 {
                if opos >= obuf.len() {
                    return Err(Error::BadMatch);
                }
                obuf[opos] = ibuf[ipos] as u8;
                self.update(obuf,opos);
                opos += 1;
                ipos += 1;
            } else {
                if ipos + 1 >= ilen {
                    log::error!("match length without an index");
                    return Err(Error::BadMatch);
                }
                let match_len = ibuf[ipos] as usize - 256 + MATCH_MIN_LEN;
                let match_idx = ibuf[ipos+1] as usize;
                ipos += 2;
                if match_idx >= BUCKET_ITEM_SIZE {
                    return Err(Error::BadIndex);
                }
                let match_offset = self.get_match(obuf,opos,match_idx);
                if match_offset >= opos || opos + match_len > obuf.len() {
                    log::error!("match at {} refers to {} with length {}",opos,match_offset,match_len);
                    return Err(Error::BadMatch);
                }
                self.update(obuf,opos);
                incremental_copy(obuf,match_offset,opos,match_len);
                opos += match_len;
            }
        }
        *decpos = opos;
        Ok(ipos)
    }
}

#[cfg(test)]
fn test_text() -> Vec<u8> {
    let mut ans = Vec::new();
    while ans.len() < 5000 {
        ans.extend_from_slice(b"0.1.2.3.4.5.6.7.8.9 9.8.7.6.5.4.3.2.1.0 match:123456 match:123789 ");
        ans.extend_from_slice(format!("line {} ABCDEFGHIJKLMNOPQRSTUVWXYZ abcdefghijklmnopqrstuvwxyz\n",ans.len() % 97).as_bytes());
    }
    ans
}

/// Encode and decode through the ROLZ stage only, `olen` tokens at a time.
#[cfg(test)]
fn rolz_round_trip(data: &[u8],olen: usize) -> (Vec<u8>,usize) {
    let mut encoder = RolzEncoder::try_create(DEFAULT_MATCH_DEPTH).expect("alloc failed");
    let mut decoder = RolzDecoder::try_create().expect("alloc failed");
    let mut tokens = vec![0u16;olen];
    let mut ans = vec![0u8;data.len()];
    let mut encpos = 0;
    let mut decpos = 0;
    let mut total_tokens = 0;
    while encpos < data.len() {
        let rlen = encoder.encode(data,&mut tokens,&mut encpos);
        assert!(rlen > 0);
        let used = decoder.decode(&tokens[0..rlen],&mut ans,&mut decpos).expect("decode failed");
        assert_eq!(used,rlen);
        assert_eq!(decpos,encpos);
        total_tokens += rlen;
    }
    (ans,total_tokens)
}

#[test]
fn matches_are_found() {
    let data = test_text();
    let (ans,total_tokens) = rolz_round_trip(&data,data.len());
    assert_eq!(ans,data);
    // the text is highly repetitive
    assert!(total_tokens * 2 < data.len());
}

#[test]
fn literals_only() {
    // too short for the lookahead, everything is literal
    let data = b"I am Sam. Sam I am. I do not like this Sam I am.\n".to_vec();
    let mut encoder = RolzEncoder::try_create(DEFAULT_MATCH_DEPTH).expect("alloc failed");
    let mut tokens = vec![0u16;100];
    let mut encpos = 0;
    let rlen = encoder.encode(&data,&mut tokens,&mut encpos);
    assert_eq!(rlen,data.len());
    assert_eq!(encpos,data.len());
    assert!(tokens[0..rlen].iter().zip(&data).all(|(t,b)| *t == *b as u16));
    let (ans,_) = rolz_round_trip(&data,100);
    assert_eq!(ans,data);
}

#[test]
fn run_of_one_byte() {
    // the match source overlaps the destination
    let data = vec![b'a';2000];
    let (ans,total_tokens) = rolz_round_trip(&data,4096);
    assert_eq!(ans,data);
    assert!(total_tokens < 300);
}

#[test]
fn small_token_budget() {
    let data = test_text();
    for olen in [2,3,17,256] {
        let (ans,_) = rolz_round_trip(&data,olen);
        assert_eq!(ans,data);
    }
}

#[test]
fn ring_wraparound() {
    // many more than BUCKET_ITEM_SIZE positions per context byte
    let mut data = Vec::new();
    let mut x: u32 = 12345;
    while data.len() < 100000 {
        x = x.wrapping_mul(1103515245).wrapping_add(12345);
        data.push(b'#');
        data.push(b"abcd"[(x >> 16) as usize % 4]);
        data.push(b"efgh"[(x >> 20) as usize % 4]);
    }
    let (ans,_) = rolz_round_trip(&data,65536);
    assert_eq!(ans,data);
}

#[test]
fn bad_tokens_are_rejected() {
    let mut decoder = RolzDecoder::try_create().expect("alloc failed");
    let mut obuf = vec![0u8;16];
    let mut decpos = 0;
    // match before any literal
    assert!(decoder.decode(&[300,0],&mut obuf,&mut decpos).is_err());
    // index beyond the ring
    decoder.reset();
    decpos = 0;
    assert!(matches!(decoder.decode(&[b'x' as u16,b'y' as u16,300,5000],&mut obuf,&mut decpos),Err(Error::BadIndex)));
    // dangling match length
    decoder.reset();
    decpos = 0;
    assert!(decoder.decode(&[b'x' as u16,256],&mut obuf,&mut decpos).is_err());
    // overflow of the block
    decoder.reset();
    decpos = 0;
    assert!(decoder.decode(&[b'x' as u16,b'y' as u16,b'x' as u16,511,0],&mut obuf,&mut decpos).is_err());
}

#[test]
fn copy_overlaps() {
    let mut buf = b"abc\0\0\0\0\0\0\0\0".to_vec();
    incremental_copy(&mut buf,0,3,8);
    assert_eq!(&buf,b"abcabcabcab");
    let mut buf = b"xy\0\0".to_vec();
    incremental_copy(&mut buf,0,2,2);
    assert_eq!(&buf,b"xyxy");
}
