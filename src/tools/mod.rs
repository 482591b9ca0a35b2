pub mod ring_buffer;
pub mod codebuf;
pub mod polar_huff;
pub mod matchidx;
pub mod rolz;
