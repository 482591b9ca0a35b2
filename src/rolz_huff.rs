//! ROLZ Compression with Static Huffman Encoding
//!
//! The input is cut into blocks of `Options::block_size` bytes.  The ROLZ history is
//! reset at the start of each block, so blocks are independent.  Each block is turned
//! into ROLZ tokens a sub-block at a time, and each sub-block gets its own pair of
//! Huffman tables, one for literals and match lengths, one for match index classes.
//!
//! Stream layout, integers are big endian:
//!
//! ```text
//! block     := record* STOP
//! record    := CONTINUE encpos:u32 tokens:u32 payload_len:u32 payload
//! payload   := lengths (4 bit each, two per byte, even symbol in high nibble)
//!              zero padding to a multiple of 4 bytes
//!              Huffman coded tokens, least significant bit first
//! ```
//!
//! `encpos` is the number of bytes of the block that have been encoded once the
//! record is decoded.  An empty input gives an empty stream.

use std::io::{BufReader,BufWriter,Cursor,ErrorKind,Read,Write};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use crate::tools::codebuf::CodeBuf;
use crate::tools::matchidx::*;
use crate::tools::polar_huff::*;
use crate::tools::rolz::*;
use crate::{ActionHandler,Direction,Error,DYNERR};

/// size of the literal/length alphabet
const HUFFMAN_CODES1: usize = 256 + MATCH_MAX_LEN - MATCH_MIN_LEN + 1;
/// size of the match index class alphabet
const HUFFMAN_CODES2: usize = MATCHIDX_CODES;
const HUFFMAN_MAX_LEN1: u8 = 15;
const HUFFMAN_MAX_LEN1_FAST: u8 = 10;
const HUFFMAN_MAX_LEN2: u8 = 8;

/// largest block, positions must fit in 24 bits
pub const MAX_BLOCK_SIZE: usize = 1 << 24;
/// most tokens in one sub-block
pub const ROLZ_BLOCK_SIZE: usize = 262144;
/// usual payload size, the buffer grows if needed
const HUFFMAN_BLOCK_SIZE: usize = 393216;

const TABLE_BYTES: usize = ((HUFFMAN_CODES1 + HUFFMAN_CODES2) / 2 + 3) & !3;
/// A literal takes at most 15 bits, a match at most 31 bits for two tokens.
const MAX_PAYLOAD: usize = TABLE_BYTES + 2 * ROLZ_BLOCK_SIZE;

/// chain probe depth for each level
const LEVEL_DEPTH: [usize;5] = [2,4,DEFAULT_MATCH_DEPTH,16,32];

#[derive(FromPrimitive,Clone,Copy,Debug,PartialEq)]
enum Flag {
    Stop = 0,
    Continue = 1
}

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// bytes per block, at most `MAX_BLOCK_SIZE`
    pub block_size: usize,
    /// tokens per sub-block, from 2 to `ROLZ_BLOCK_SIZE`
    pub token_block_size: usize,
    /// 0 (fastest) to 4 (most thorough match search)
    pub level: usize
}

pub const STD_OPTIONS: Options = Options {
    block_size: MAX_BLOCK_SIZE,
    token_block_size: ROLZ_BLOCK_SIZE,
    level: 2
};

impl Options {
    fn verify(&self) -> Result<(),Error> {
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            log::error!("block size {} is out of range",self.block_size);
            return Err(Error::InvalidOptions);
        }
        if self.token_block_size < 2 || self.token_block_size > ROLZ_BLOCK_SIZE {
            log::error!("token block size {} is out of range",self.token_block_size);
            return Err(Error::InvalidOptions);
        }
        if self.level >= LEVEL_DEPTH.len() {
            log::error!("level {} is out of range",self.level);
            return Err(Error::InvalidOptions);
        }
        Ok(())
    }
}

fn try_vec<T: Clone>(fill: T,n: usize) -> Result<Vec<T>,Error> {
    let mut ans = Vec::new();
    ans.try_reserve_exact(n).map_err(|_| Error::OutOfMemory)?;
    ans.resize(n,fill);
    Ok(ans)
}

/// Read until `buf` is full or the source is exhausted, returns bytes read.
fn read_block<R: Read>(reader: &mut R,buf: &mut [u8]) -> Result<usize,std::io::Error> {
    let mut n = 0;
    while n < buf.len() {
        match reader.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind()==ErrorKind::Interrupted => {},
            Err(e) => return Err(e)
        }
    }
    Ok(n)
}

/// Like `read_exact`, but running out of data is a stream error.
fn read_stream<R: Read>(reader: &mut R,buf: &mut [u8]) -> Result<(),DYNERR> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind()==ErrorKind::UnexpectedEof => Err(Box::new(Error::Truncated)),
        Err(e) => Err(Box::new(e))
    }
}

fn get_u32<R: Read>(reader: &mut R) -> Result<u32,DYNERR> {
    let mut by: [u8;4] = [0;4];
    read_stream(reader,&mut by)?;
    Ok(u32::from_be_bytes(by))
}

/// Huffman stage of compression, tables are kept to avoid reallocating them.
struct PolarEncoder {
    freq1: Vec<u32>,
    freq2: Vec<u32>,
    length1: Vec<u8>,
    length2: Vec<u8>,
    code1: Vec<u16>,
    code2: Vec<u16>
}

impl PolarEncoder {
    fn try_create() -> Result<Self,Error> {
        Ok(Self {
            freq1: try_vec(0,HUFFMAN_CODES1)?,
            freq2: try_vec(0,HUFFMAN_CODES2)?,
            length1: try_vec(0,HUFFMAN_CODES1)?,
            length2: try_vec(0,HUFFMAN_CODES2)?,
            code1: try_vec(0,HUFFMAN_CODES1)?,
            code2: try_vec(0,HUFFMAN_CODES2)?
        })
    }
    /// Replace the contents of `obuf` with the payload for `tokens`.
    fn encode(&mut self,tokens: &[u16],obuf: &mut Vec<u8>) {
        self.freq1.fill(0);
        self.freq2.fill(0);
        let mut i = 0;
        while i < tokens.len() {
            self.freq1[tokens[i] as usize] += 1;
            if tokens[i] >= 256 {
                i += 1;
                self.freq2[idx_to_code(tokens[i])] += 1;
            }
            i += 1;
        }
        make_length_table(&self.freq1,&mut self.length1,HUFFMAN_MAX_LEN1);
        make_length_table(&self.freq2,&mut self.length2,HUFFMAN_MAX_LEN2);
        make_encode_table(&self.length1,&mut self.code1,HUFFMAN_MAX_LEN1);
        make_encode_table(&self.length2,&mut self.code2,HUFFMAN_MAX_LEN2);

        obuf.clear();
        for pair in self.length1.chunks(2).chain(self.length2.chunks(2)) {
            obuf.push(pair[0] << 4 | pair[1]);
        }
        obuf.resize(TABLE_BYTES,0);

        let mut codebuf = CodeBuf::new();
        let mut i = 0;
        while i < tokens.len() {
            let sym = tokens[i] as usize;
            codebuf.input(self.code1[sym] as u64,self.length1[sym] as u32);
            if sym >= 256 {
                i += 1;
                let idx = tokens[i];
                let code = idx_to_code(idx);
                codebuf.input(self.code2[code] as u64,self.length2[code] as u32);
                codebuf.input(idx_to_bits(idx) as u64,idx_to_bitlen(idx));
            }
            while codebuf.len() >= 32 {
                obuf.extend_from_slice(&(codebuf.output(32) as u32).to_le_bytes());
            }
            i += 1;
        }
        while !codebuf.is_empty() {
            let n = codebuf.len().min(8);
            obuf.push(codebuf.output(n) as u8);
        }
    }
}

/// Huffman stage of expansion, tables are kept to avoid reallocating them.
struct PolarDecoder {
    length1: Vec<u8>,
    length2: Vec<u8>,
    code1: Vec<u16>,
    code2: Vec<u16>,
    decode1: Vec<u16>,
    decode1_fast: Vec<u16>,
    decode2: Vec<u16>
}

impl PolarDecoder {
    fn try_create() -> Result<Self,Error> {
        Ok(Self {
            length1: try_vec(0,HUFFMAN_CODES1)?,
            length2: try_vec(0,HUFFMAN_CODES2)?,
            code1: try_vec(0,HUFFMAN_CODES1)?,
            code2: try_vec(0,HUFFMAN_CODES2)?,
            decode1: try_vec(DECODE_NONE,1 << HUFFMAN_MAX_LEN1)?,
            decode1_fast: try_vec(DECODE_NONE,1 << HUFFMAN_MAX_LEN1_FAST)?,
            decode2: try_vec(DECODE_NONE,1 << HUFFMAN_MAX_LEN2)?
        })
    }
    /// Decode `tokens.len()` tokens from `payload`.
    fn decode(&mut self,payload: &[u8],tokens: &mut [u16]) -> Result<(),Error> {
        if payload.len() < TABLE_BYTES {
            log::error!("payload of {} bytes cannot hold the tables",payload.len());
            return Err(Error::Truncated);
        }
        for sym in 0..HUFFMAN_CODES1 + HUFFMAN_CODES2 {
            let nibble = match sym % 2 {
                0 => payload[sym/2] >> 4,
                _ => payload[sym/2] & 0x0f
            };
            match sym < HUFFMAN_CODES1 {
                true => self.length1[sym] = nibble,
                false => self.length2[sym - HUFFMAN_CODES1] = nibble
            }
        }
        make_encode_table(&self.length1,&mut self.code1,HUFFMAN_MAX_LEN1);
        make_encode_table(&self.length2,&mut self.code2,HUFFMAN_MAX_LEN2);
        make_decode_table(&self.length1,&self.code1,&mut self.decode1);
        make_decode_table(&self.length1,&self.code1,&mut self.decode1_fast);
        make_decode_table(&self.length2,&self.code2,&mut self.decode2);

        // a corrupt stream can run past the payload, read zeros and check at the end
        let byte_at = |p: usize| payload.get(p).copied().unwrap_or(0);
        let mut codebuf = CodeBuf::new();
        let mut ptr = TABLE_BYTES;
        let rlen = tokens.len();
        let mut i = 0;
        while i < rlen {
            if codebuf.len() < 32 {
                let word = u32::from_le_bytes([byte_at(ptr),byte_at(ptr+1),byte_at(ptr+2),byte_at(ptr+3)]);
                codebuf.input(word as u64,32);
                ptr += 4;
            }
            let mut sym = self.decode1_fast[codebuf.peek(HUFFMAN_MAX_LEN1_FAST as u32) as usize];
            if sym == DECODE_NONE {
                sym = self.decode1[codebuf.peek(HUFFMAN_MAX_LEN1 as u32) as usize];
            }
            if sym as usize >= HUFFMAN_CODES1 {
                return Err(Error::BadLiteralCode);
            }
            codebuf.output(self.length1[sym as usize] as u32);
            tokens[i] = sym;

            if sym >= 256 {
                if i + 1 >= rlen {
                    log::error!("match length is the last token");
                    return Err(Error::BadMatch);
                }
                let code = self.decode2[codebuf.peek(HUFFMAN_MAX_LEN2 as u32) as usize] as usize;
                if code >= HUFFMAN_CODES2 {
                    return Err(Error::BadIndexCode);
                }
                codebuf.output(self.length2[code] as u32);
                let bits = codebuf.output(code_to_bitlen(code)) as u16;
                let idx = idx_from_code_bits(code,bits);
                if idx as usize >= BUCKET_ITEM_SIZE {
                    return Err(Error::BadIndex);
                }
                i += 1;
                tokens[i] = idx;
            }
            i += 1;
        }
        let bits_used = (ptr - TABLE_BYTES) * 8 - codebuf.len() as usize;
        if bits_used > (payload.len() - TABLE_BYTES) * 8 {
            log::error!("huffman stream needs {} bits, payload has {}",bits_used,(payload.len() - TABLE_BYTES) * 8);
            return Err(Error::Truncated);
        }
        Ok(())
    }
}

/// All the working memory of one compression, allocated up front.
struct Compressor {
    ibuf: Vec<u8>,
    tbuf: Vec<u16>,
    obuf: Vec<u8>,
    rolz: RolzEncoder,
    polar: PolarEncoder
}

impl Compressor {
    fn try_create(opt: &Options) -> Result<Self,Error> {
        let mut obuf = Vec::new();
        obuf.try_reserve(HUFFMAN_BLOCK_SIZE + 16).map_err(|_| Error::OutOfMemory)?;
        Ok(Self {
            ibuf: try_vec(0,opt.block_size)?,
            tbuf: try_vec(0,opt.token_block_size)?,
            obuf,
            rolz: RolzEncoder::try_create(LEVEL_DEPTH[opt.level]).map_err(|_| Error::OutOfMemory)?,
            polar: PolarEncoder::try_create()?
        })
    }
    /// Encode the block, returns the number of bytes written.
    fn encode_block<W: Write>(&mut self,ilen: usize,writer: &mut W) -> Result<u64,DYNERR> {
        let mut written: u64 = 0;
        let mut encpos = 0;
        self.rolz.reset();
        while encpos < ilen {
            writer.write_all(&[Flag::Continue as u8])?;
            let rlen = self.rolz.encode(&self.ibuf[0..ilen],&mut self.tbuf,&mut encpos);
            self.polar.encode(&self.tbuf[0..rlen],&mut self.obuf);
            writer.write_all(&u32::to_be_bytes(encpos as u32))?;
            writer.write_all(&u32::to_be_bytes(rlen as u32))?;
            writer.write_all(&u32::to_be_bytes(self.obuf.len() as u32))?;
            writer.write_all(&self.obuf)?;
            log::trace!("sub-block up to {}: {} tokens in {} bytes",encpos,rlen,self.obuf.len());
            written += 13 + self.obuf.len() as u64;
        }
        writer.write_all(&[Flag::Stop as u8])?;
        Ok(written + 1)
    }
}

/// All the working memory of one expansion, allocated up front.
struct Expander {
    ibuf: Vec<u8>,
    tbuf: Vec<u16>,
    obuf: Vec<u8>,
    rolz: RolzDecoder,
    polar: PolarDecoder
}

impl Expander {
    fn try_create() -> Result<Self,Error> {
        let mut obuf = Vec::new();
        obuf.try_reserve(HUFFMAN_BLOCK_SIZE + 16).map_err(|_| Error::OutOfMemory)?;
        Ok(Self {
            ibuf: try_vec(0,MAX_BLOCK_SIZE)?,
            tbuf: try_vec(0,ROLZ_BLOCK_SIZE)?,
            obuf,
            rolz: RolzDecoder::try_create().map_err(|_| Error::OutOfMemory)?,
            polar: PolarDecoder::try_create()?
        })
    }
    /// Decode records until the stop flag, `flag` is the first flag of the block.
    /// Returns (bytes read, bytes of the block).
    fn decode_block<R: Read>(&mut self,mut flag: u8,reader: &mut R) -> Result<(u64,usize),DYNERR> {
        let mut read: u64 = 0;
        let mut decpos = 0;
        self.rolz.reset();
        loop {
            match Flag::from_u8(flag) {
                Some(Flag::Stop) => break,
                Some(Flag::Continue) => {},
                None => {
                    log::error!("bad flag {} after {} bytes of block",flag,decpos);
                    return Err(Box::new(Error::InvalidFlag(flag)));
                }
            }
            let encpos = get_u32(reader)? as usize;
            let rlen = get_u32(reader)? as usize;
            let olen = get_u32(reader)? as usize;
            if encpos <= decpos || encpos > MAX_BLOCK_SIZE || rlen == 0 || rlen > ROLZ_BLOCK_SIZE || olen < TABLE_BYTES || olen > MAX_PAYLOAD {
                log::error!("bad record: position {}, {} tokens, {} bytes",encpos,rlen,olen);
                return Err(Box::new(Error::InvalidHeader));
            }
            self.obuf.resize(olen,0);
            read_stream(reader,&mut self.obuf)?;
            self.polar.decode(&self.obuf,&mut self.tbuf[0..rlen])?;
            self.rolz.decode(&self.tbuf[0..rlen],&mut self.ibuf[0..encpos],&mut decpos)?;
            if decpos != encpos {
                return Err(Box::new(Error::PositionMismatch(decpos,encpos)));
            }
            log::trace!("sub-block up to {}: {} tokens in {} bytes",encpos,rlen,olen);
            read += 13 + olen as u64;
            let mut by: [u8;1] = [0];
            read_stream(reader,&mut by)?;
            flag = by[0];
        }
        Ok((read + 1,decpos))
    }
}

fn compress_blocks<R,W>(reader: &mut R,writer: &mut W,opt: &Options,handler: &mut Option<&mut dyn ActionHandler>,sizes: &mut (u64,u64)) -> Result<(),DYNERR>
where R: Read, W: Write {
    let mut comp = Compressor::try_create(opt)?;
    log::debug!("entering loop over blocks");
    loop {
        let ilen = read_block(reader,&mut comp.ibuf)?;
        if ilen == 0 {
            break;
        }
        let written = comp.encode_block(ilen,writer)?;
        sizes.0 += ilen as u64;
        sizes.1 += written;
        log::debug!("block of {} bytes compressed into {}",ilen,written);
        if let Some(h) = handler.as_deref_mut() {
            h.on_process(sizes.0,sizes.1);
        }
        if ilen < opt.block_size {
            break;
        }
    }
    writer.flush()?;
    Ok(())
}

fn expand_blocks<R,W>(reader: &mut R,writer: &mut W,handler: &mut Option<&mut dyn ActionHandler>,sizes: &mut (u64,u64)) -> Result<(),DYNERR>
where R: Read, W: Write {
    let mut exp = Expander::try_create()?;
    log::debug!("entering loop over blocks");
    loop {
        let mut by: [u8;1] = [0];
        if read_block(reader,&mut by)? == 0 {
            break;
        }
        let (read,olen) = exp.decode_block(by[0],reader)?;
        writer.write_all(&exp.ibuf[0..olen])?;
        sizes.0 += read;
        sizes.1 += olen as u64;
        log::debug!("block of {} bytes expanded into {}",read,olen);
        if let Some(h) = handler.as_deref_mut() {
            h.on_process(sizes.0,sizes.1);
        }
    }
    writer.flush()?;
    Ok(())
}

/// Main compression function.
/// `expanded_in` is any `Read`, e.g. `std::fs::File`, `std::io::Stdin`, or `&[u8]`.
/// `compressed_out` is any `Write`, e.g. `std::fs::File`, or `Vec<u8>`.
/// Returns (in_size,out_size) or error.  The handler's `on_done` is called in either case.
pub fn compress<R,W>(expanded_in: &mut R,compressed_out: &mut W,opt: &Options,mut handler: Option<&mut dyn ActionHandler>) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    opt.verify()?;
    let mut reader = BufReader::new(expanded_in);
    let mut writer = BufWriter::new(compressed_out);
    let mut sizes = (0,0);
    if let Some(h) = handler.as_deref_mut() {
        h.on_init(Direction::Compress);
    }
    let result = compress_blocks(&mut reader,&mut writer,opt,&mut handler,&mut sizes);
    if let Some(h) = handler.as_deref_mut() {
        h.on_done(sizes.0,sizes.1);
    }
    result.map(|_| sizes)
}

/// Main decompression function.
/// `compressed_in` is any `Read`, e.g. `std::fs::File`, `std::io::Stdin`, or `&[u8]`.
/// `expanded_out` is any `Write`, e.g. `std::fs::File`, or `Vec<u8>`.
/// Returns (in_size,out_size) or error.  The handler's `on_done` is called in either case.
pub fn expand<R,W>(compressed_in: &mut R,expanded_out: &mut W,mut handler: Option<&mut dyn ActionHandler>) -> Result<(u64,u64),DYNERR>
where R: Read, W: Write {
    let mut reader = BufReader::new(compressed_in);
    let mut writer = BufWriter::new(expanded_out);
    let mut sizes = (0,0);
    if let Some(h) = handler.as_deref_mut() {
        h.on_init(Direction::Expand);
    }
    let result = expand_blocks(&mut reader,&mut writer,&mut handler,&mut sizes);
    if let Some(h) = handler.as_deref_mut() {
        h.on_done(sizes.0,sizes.1);
    }
    result.map(|_| sizes)
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    compress(&mut src,&mut ans,opt,None)?;
    Ok(ans.into_inner())
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans,None)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[cfg(test)]
fn pseudo_random(n: usize,seed: u32) -> Vec<u8> {
    let mut x = seed;
    (0..n).map(|_| {
        x = x.wrapping_mul(1103515245).wrapping_add(12345);
        (x >> 23) as u8
    }).collect()
}

#[cfg(test)]
fn sam_text(n: usize) -> Vec<u8> {
    let mut ans = Vec::new();
    let mut count = 0;
    while ans.len() < n {
        ans.extend_from_slice(format!("{}: I am Sam. Sam I am. I do not like this Sam I am.\n",count).as_bytes());
        ans.extend_from_slice(b"Would you like them here or there? I would not like them anywhere.\n");
        count += 1;
    }
    ans.truncate(n);
    ans
}

/// (block count, record count) of a valid stream
#[cfg(test)]
fn count_records(stream: &[u8]) -> (usize,usize) {
    let mut ptr = 0;
    let mut blocks = 0;
    let mut records = 0;
    while ptr < stream.len() {
        while stream[ptr] == 1 {
            let olen = u32::from_be_bytes([stream[ptr+9],stream[ptr+10],stream[ptr+11],stream[ptr+12]]);
            ptr += 13 + olen as usize;
            records += 1;
        }
        assert_eq!(stream[ptr],0);
        ptr += 1;
        blocks += 1;
    }
    (blocks,records)
}

#[cfg(test)]
fn stream_error(stream: &[u8]) -> Error {
    match expand_slice(stream) {
        Ok(_) => panic!("corrupt stream was accepted"),
        Err(e) => match e.downcast::<Error>() {
            Ok(e) => *e,
            Err(e) => panic!("unexpected error {}",e)
        }
    }
}

#[test]
fn compression_works() {
    let compressed = compress_slice(b"aaaaaaaaaa",&STD_OPTIONS).expect("compression failed");
    // record header: continue, 10 bytes encoded, 10 tokens, 272+2 bytes of payload
    let header = "01 0000000A 0000000A 00000112";
    assert_eq!(compressed[0..13],hex::decode(header.replace(" ","")).unwrap());
    assert_eq!(compressed.len(),13 + 274 + 1);
    // only 'a' (97, low nibble of byte 48) has a code, 1 bit long
    for (i,by) in compressed[13..13+TABLE_BYTES].iter().enumerate() {
        assert_eq!(*by,if i==48 { 0x01 } else { 0x00 });
    }
    // ten zero bits, then the stop flag
    assert_eq!(compressed[13+TABLE_BYTES..],[0,0,0]);
}

#[test]
fn invertibility() {
    for test_data in [b"".to_vec(),b"a".to_vec(),b"aaaaaaaaaa".to_vec(),b"I am Sam. Sam I am. I do not like this Sam I am.\n".to_vec(),sam_text(20000)] {
        let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
        let expanded = expand_slice(&compressed).expect("expansion failed");
        assert_eq!(test_data,expanded);
    }
}

#[test]
fn empty_stream() {
    let compressed = compress_slice(b"",&STD_OPTIONS).expect("compression failed");
    assert!(compressed.is_empty());
    assert!(expand_slice(&compressed).expect("expansion failed").is_empty());
}

#[test]
fn text_compresses() {
    let test_data = sam_text(100000);
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() * 4 < test_data.len());
    assert_eq!(expand_slice(&compressed).expect("expansion failed"),test_data);
}

#[test]
fn random_data() {
    let test_data = pseudo_random(2000000,1);
    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < test_data.len() + test_data.len() / 50);
    assert_eq!(expand_slice(&compressed).expect("expansion failed"),test_data);
}

#[test]
fn block_boundaries() {
    let mut opt = STD_OPTIONS;
    opt.block_size = 1000;
    for n in [999,1000,1001,4000,4321] {
        let test_data = sam_text(n);
        let compressed = compress_slice(&test_data,&opt).expect("compression failed");
        let (blocks,_) = count_records(&compressed);
        assert_eq!(blocks,(n + 999) / 1000);
        assert_eq!(expand_slice(&compressed).expect("expansion failed"),test_data);
    }
}

#[test]
fn many_sub_blocks() {
    let mut opt = STD_OPTIONS;
    opt.token_block_size = 100;
    let test_data = [sam_text(30000),pseudo_random(10000,7)].concat();
    let compressed = compress_slice(&test_data,&opt).expect("compression failed");
    let (blocks,records) = count_records(&compressed);
    assert_eq!(blocks,1);
    assert!(records > 50);
    assert_eq!(expand_slice(&compressed).expect("expansion failed"),test_data);
}

#[test]
fn all_levels() {
    let test_data = [sam_text(50000),pseudo_random(5000,3),sam_text(5000)].concat();
    for level in 0..5 {
        let mut opt = STD_OPTIONS;
        opt.level = level;
        let compressed = compress_slice(&test_data,&opt).expect("compression failed");
        assert_eq!(expand_slice(&compressed).expect("expansion failed"),test_data);
    }
}

#[test]
fn bad_options() {
    let mut opt = STD_OPTIONS;
    opt.token_block_size = 1;
    assert!(compress_slice(b"abc",&opt).is_err());
    let mut opt = STD_OPTIONS;
    opt.block_size = MAX_BLOCK_SIZE + 1;
    assert!(compress_slice(b"abc",&opt).is_err());
    let mut opt = STD_OPTIONS;
    opt.level = 5;
    assert!(compress_slice(b"abc",&opt).is_err());
}

#[test]
fn corrupt_flags() {
    let compressed = compress_slice(b"aaaaaaaaaa",&STD_OPTIONS).expect("compression failed");
    let mut bad = compressed.clone();
    bad[0] = 7;
    assert!(matches!(stream_error(&bad),Error::InvalidFlag(7)));
    let mut bad = compressed.clone();
    let last = bad.len() - 1;
    bad[last] = 2;
    assert!(matches!(stream_error(&bad),Error::InvalidFlag(2)));
}

#[test]
fn corrupt_codes() {
    let compressed = compress_slice(b"aaaaaaaaaa",&STD_OPTIONS).expect("compression failed");
    // 1 bits select the unused half of the code space
    let mut bad = compressed.clone();
    bad[13+TABLE_BYTES] = 0xff;
    assert!(matches!(stream_error(&bad),Error::BadLiteralCode));
    // claim a match length symbol has the only code, but give the index alphabet nothing
    let mut bad = compressed.clone();
    bad[13+48] = 0x00;
    bad[13+200] = 0x10;
    assert!(matches!(stream_error(&bad),Error::BadIndexCode));
}

#[test]
fn corrupt_headers() {
    let compressed = compress_slice(b"aaaaaaaaaa",&STD_OPTIONS).expect("compression failed");
    // too many tokens
    let mut bad = compressed.clone();
    bad[5] = 0xff;
    assert!(matches!(stream_error(&bad),Error::InvalidHeader));
    // more tokens than the payload holds
    let mut bad = compressed.clone();
    bad[8] = 200;
    bad[1..5].copy_from_slice(&u32::to_be_bytes(200));
    assert!(matches!(stream_error(&bad),Error::Truncated));
    // recorded position is one past the ten literals actually decoded
    let mut bad = compressed.clone();
    bad[4] = 11;
    assert!(matches!(stream_error(&bad),Error::PositionMismatch(10,11)));
}

#[test]
fn truncated_stream() {
    let compressed = compress_slice(&sam_text(5000),&STD_OPTIONS).expect("compression failed");
    for n in [1,5,13,100,compressed.len()-1] {
        assert!(matches!(stream_error(&compressed[0..n]),Error::Truncated));
    }
}

#[cfg(test)]
#[derive(Default)]
struct Recorder {
    direction: Option<Direction>,
    progress: Vec<(u64,u64)>,
    done: Option<(u64,u64)>
}

#[cfg(test)]
impl ActionHandler for Recorder {
    fn on_init(&mut self,direction: Direction) {
        self.direction = Some(direction);
    }
    fn on_process(&mut self,in_bytes: u64,out_bytes: u64) {
        self.progress.push((in_bytes,out_bytes));
    }
    fn on_done(&mut self,in_bytes: u64,out_bytes: u64) {
        self.done = Some((in_bytes,out_bytes));
    }
}

#[test]
fn handler_is_notified() {
    let test_data = sam_text(3500);
    let mut opt = STD_OPTIONS;
    opt.block_size = 1000;
    let mut compressed: Vec<u8> = Vec::new();
    let mut rec = Recorder::default();
    let sizes = compress(&mut &test_data[..],&mut compressed,&opt,Some(&mut rec)).expect("compression failed");
    assert_eq!(sizes,(3500,compressed.len() as u64));
    assert_eq!(rec.direction,Some(Direction::Compress));
    assert_eq!(rec.progress.len(),4);
    assert_eq!(rec.progress[0].0,1000);
    assert_eq!(rec.done,Some(sizes));

    let mut expanded: Vec<u8> = Vec::new();
    let mut rec = Recorder::default();
    let sizes = expand(&mut &compressed[..],&mut expanded,Some(&mut rec)).expect("expansion failed");
    assert_eq!(sizes,(compressed.len() as u64,3500));
    assert_eq!(rec.direction,Some(Direction::Expand));
    assert_eq!(rec.progress.len(),4);
    assert_eq!(rec.progress[3],sizes);
    assert_eq!(rec.done,Some(sizes));
    assert_eq!(expanded,test_data);
}

#[test]
fn handler_sees_failure() {
    let mut bad = compress_slice(b"aaaaaaaaaa",&STD_OPTIONS).expect("compression failed");
    bad[0] = 9;
    let mut rec = Recorder::default();
    let mut expanded: Vec<u8> = Vec::new();
    assert!(expand(&mut &bad[..],&mut expanded,Some(&mut rec)).is_err());
    assert!(rec.progress.is_empty());
    assert_eq!(rec.done,Some((0,0)));
}

/// Sink that fails after accepting a few bytes
#[cfg(test)]
struct FailingWriter {
    room: usize
}

#[cfg(test)]
impl Write for FailingWriter {
    fn write(&mut self,buf: &[u8]) -> std::io::Result<usize> {
        if self.room == 0 {
            return Err(std::io::Error::new(ErrorKind::Other,"disk full"));
        }
        let n = buf.len().min(self.room);
        self.room -= n;
        Ok(n)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Source that hands out a few bytes at a time
#[cfg(test)]
struct TrickleReader<'a> {
    data: &'a [u8],
    step: usize
}

#[cfg(test)]
impl Read for TrickleReader<'_> {
    fn read(&mut self,buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.step).min(self.data.len());
        buf[0..n].copy_from_slice(&self.data[0..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

#[test]
fn io_errors_propagate() {
    let test_data = sam_text(50000);
    let mut rec = Recorder::default();
    let mut sink = FailingWriter { room: 100 };
    let err = compress(&mut &test_data[..],&mut sink,&STD_OPTIONS,Some(&mut rec)).expect_err("write error was lost");
    assert!(err.downcast_ref::<std::io::Error>().is_some());
    assert!(rec.done.is_some());

    let compressed = compress_slice(&test_data,&STD_OPTIONS).expect("compression failed");
    let mut sink = FailingWriter { room: 100 };
    let err = expand(&mut &compressed[..],&mut sink,None).expect_err("write error was lost");
    assert!(err.downcast_ref::<std::io::Error>().is_some());
}

#[test]
fn partial_reads() {
    let test_data = sam_text(20000);
    let mut opt = STD_OPTIONS;
    opt.block_size = 5000;
    let mut compressed: Vec<u8> = Vec::new();
    compress(&mut TrickleReader { data: &test_data, step: 7 },&mut compressed,&opt,None).expect("compression failed");
    assert_eq!(compressed,compress_slice(&test_data,&opt).expect("compression failed"));
    let mut expanded: Vec<u8> = Vec::new();
    expand(&mut TrickleReader { data: &compressed, step: 3 },&mut expanded,None).expect("expansion failed");
    assert_eq!(expanded,test_data);
}

#[test]
fn polar_tables_are_allocated() {
    let enc = PolarEncoder::try_create().expect("alloc failed");
    assert_eq!(enc.freq1.len(),HUFFMAN_CODES1);
    assert_eq!(enc.code2.len(),HUFFMAN_CODES2);
    let dec = PolarDecoder::try_create().expect("alloc failed");
    assert_eq!(dec.decode1.len(),1 << HUFFMAN_MAX_LEN1);
    assert_eq!(dec.decode1_fast.len(),1 << HUFFMAN_MAX_LEN1_FAST);
    assert_eq!(dec.decode2.len(),1 << HUFFMAN_MAX_LEN2);
    assert!(dec.decode2.iter().all(|&s| s == DECODE_NONE));
}
