//! Ring buffer for ROLZ type history buckets.
//!
//! The cursor always points at the most recently written slot, which is what
//! the ROLZ coders call the `head`.  Match indices are distances behind the head,
//! so the encoder and decoder only have to agree on the order of the pushes.
use num_traits::PrimInt;
use std::collections::TryReserveError;

pub struct RingBuffer<T: PrimInt> {
    buf: Vec<T>,
    pos: usize,
    mask: usize
}

impl <T: PrimInt> RingBuffer<T> {
    /// Create a ring with `n` slots, `n` must be a power of two.
    pub fn try_create(fill: T,n: usize) -> Result<Self,TryReserveError> {
        debug_assert!(n.is_power_of_two());
        let mut buf = Vec::new();
        buf.try_reserve_exact(n)?;
        buf.resize(n,fill);
        Ok(Self {
            buf,
            pos: 0,
            mask: n - 1
        })
    }
    /// fill every slot and put the cursor back at slot 0
    pub fn reset(&mut self,fill: T) {
        self.buf.fill(fill);
        self.pos = 0;
    }
    /// absolute position of the cursor
    pub fn head(&self) -> usize {
        self.pos
    }
    /// get value at absolute position, cursor does not move
    pub fn get_abs(&self,abs: usize) -> T {
        self.buf[abs & self.mask]
    }
    /// advance cursor by 1
    pub fn advance(&mut self) {
        self.pos = (self.pos + 1) & self.mask;
    }
    /// advance the cursor and store `val` in the new head slot
    pub fn push(&mut self,val: T) {
        self.advance();
        self.buf[self.pos] = val;
    }
    /// absolute position of the slot `idx` steps behind the cursor
    pub fn slot_behind(&self,idx: usize) -> usize {
        self.pos.wrapping_sub(idx) & self.mask
    }
    /// Distance to another position, assuming it is behind us.
    /// Correctly handles positions that are "ahead" in memory order.
    pub fn distance_behind(&self,other: usize) -> usize {
        self.pos.wrapping_sub(other) & self.mask
    }
}

#[test]
fn wraparound() {
    // four slots 0 1 2 3, push five times so the cursor wraps once
    let mut ring: RingBuffer<u32> = RingBuffer::try_create(0,4).expect("alloc failed");
    for v in 1..=5 {
        ring.push(v);
    }
    assert_eq!(ring.head(),1);
    assert_eq!(ring.get_abs(ring.head()),5);
    assert_eq!(ring.get_abs(0),4);
    assert_eq!(ring.get_abs(ring.slot_behind(1)),4);
    assert_eq!(ring.get_abs(ring.slot_behind(2)),3);
    assert_eq!(ring.get_abs(ring.slot_behind(4)),5);
}

#[test]
fn distance() {
    let mut ring: RingBuffer<u16> = RingBuffer::try_create(0,4).expect("alloc failed");
    for _i in 0..5 {
        ring.advance();
    }
    assert_eq!(ring.head(),1);
    assert_eq!(ring.distance_behind(0),1);
    assert_eq!(ring.distance_behind(1),0);
    assert_eq!(ring.distance_behind(3),2);
    for idx in 0..4 {
        assert_eq!(ring.distance_behind(ring.slot_behind(idx)),idx);
    }
}

#[test]
fn reset_clears() {
    let mut ring: RingBuffer<u32> = RingBuffer::try_create(0,8).expect("alloc failed");
    ring.push(7);
    ring.push(9);
    ring.reset(0);
    assert_eq!(ring.head(),0);
    for i in 0..8 {
        assert_eq!(ring.get_abs(i),0);
    }
}
