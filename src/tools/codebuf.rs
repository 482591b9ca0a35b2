//! Bit accumulator used to pack and unpack the Huffman stream.
//!
//! Codes go in and come out least significant bit first.  Moving whole bytes
//! between the accumulator and the payload is left to the caller.

/// 64 bit code accumulator.  The caller must keep `len() + n <= 64` when
/// calling `input`, and must never ask for more bits than `len()`.
pub struct CodeBuf {
    buf: u64,
    len: u32
}

impl CodeBuf {
    pub fn new() -> Self {
        Self {
            buf: 0,
            len: 0
        }
    }
    /// append the low `n` bits of `code` above the bits already held
    #[inline]
    pub fn input(&mut self,code: u64,n: u32) {
        debug_assert!(self.len + n <= 64);
        if n > 0 {
            self.buf |= code << self.len;
            self.len += n;
        }
    }
    /// remove and return the low `n` bits
    #[inline]
    pub fn output(&mut self,n: u32) -> u64 {
        let out = self.peek(n);
        // shifting a u64 by 64 overflows, so a full drain is handled separately
        self.buf = match n {
            64 => 0,
            _ => self.buf >> n
        };
        self.len -= n;
        out
    }
    /// return the low `n` bits without consuming them
    #[inline]
    pub fn peek(&self,n: u32) -> u64 {
        match n {
            64 => self.buf,
            _ => self.buf & !(u64::MAX << n)
        }
    }
    /// number of valid bits held
    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[test]
fn input_output() {
    let mut codebuf = CodeBuf::new();
    assert_eq!(codebuf.len(),0);
    codebuf.input(0x101,12);
    codebuf.input(0x101,12);
    assert_eq!(codebuf.len(),24);
    assert_eq!(codebuf.peek(16),0x1101);
    assert_eq!(codebuf.peek(24),0x101101);
    assert_eq!(codebuf.output(16),0x1101);
    assert_eq!(codebuf.len(),8);
    assert_eq!(codebuf.output(8),0x10);
    assert!(codebuf.is_empty());
}

#[test]
fn code_is_masked_on_output() {
    let mut codebuf = CodeBuf::new();
    for n in 1..=32 {
        let code: u64 = 0xdead_beef_u64 & ((1 << n) - 1);
        codebuf.input(code,n);
        assert_eq!(codebuf.output(n),code);
    }
    codebuf.input(u64::MAX,64);
    assert_eq!(codebuf.peek(64),u64::MAX);
    assert_eq!(codebuf.output(64),u64::MAX);
    assert!(codebuf.is_empty());
}

#[test]
fn new_buffer_is_empty() {
    let mut codebuf = CodeBuf::new();
    assert!(codebuf.is_empty());
    assert_eq!(codebuf.peek(64),0);
    codebuf.input(0b101,3);
    assert_eq!(codebuf.output(3),0b101);
    assert!(codebuf.is_empty());
}
