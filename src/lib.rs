//! # ROLZ compression library
//!
//! Lossless general purpose compression combining a reduced offset Lempel-Ziv (ROLZ)
//! matcher with length-limited static Huffman coding.  Data is processed in blocks of
//! up to 16 MiB, each block being split into sub-blocks with their own Huffman tables.
//!
//! The `rolz_huff` module does the work, it transforms any `Read` into any `Write`.
//!
//! ```
//! let data = b"I am Sam. Sam I am. I do not like this Sam I am.\n";
//! let compressed = rolzpack::rolz_huff::compress_slice(data,&rolzpack::rolz_huff::STD_OPTIONS).unwrap();
//! let expanded = rolzpack::rolz_huff::expand_slice(&compressed).unwrap();
//! assert_eq!(expanded,data);
//! ```

mod tools;
pub mod rolz_huff;

pub type DYNERR = Box<dyn std::error::Error>;

/// Stream Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("invalid stream: bad block flag {0}")]
    InvalidFlag(u8),
    #[error("invalid stream: record header out of range")]
    InvalidHeader,
    #[error("invalid stream: unexpected end of data")]
    Truncated,
    #[error("invalid stream: bad literal/length code")]
    BadLiteralCode,
    #[error("invalid stream: bad match index code")]
    BadIndexCode,
    #[error("invalid stream: bad match index")]
    BadIndex,
    #[error("invalid stream: match refers outside of the block")]
    BadMatch,
    #[error("invalid stream: decoded position {0} but expected {1}")]
    PositionMismatch(usize,usize),
    #[error("invalid options")]
    InvalidOptions,
    #[error("could not allocate working buffers")]
    OutOfMemory
}

/// Which way the data is going
#[derive(Clone,Copy,Debug,PartialEq)]
pub enum Direction {
    Compress,
    Expand
}

/// Receives progress notifications, does not affect the output in any way.
/// Byte counts are cumulative, `in_bytes` is what was read from the source,
/// `out_bytes` is what was written to the sink.
pub trait ActionHandler {
    /// called once before anything is read
    fn on_init(&mut self,_direction: Direction) {}
    /// called after each block is finished
    fn on_process(&mut self,_in_bytes: u64,_out_bytes: u64) {}
    /// called once at the end, also when stopping on an error
    fn on_done(&mut self,_in_bytes: u64,_out_bytes: u64) {}
}
