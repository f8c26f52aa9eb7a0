//! Fixed-size ring storage shared between one producer and one consumer which
//! may preempt each other.
//!
//! One slot is always left empty: `read == write` means empty, and the
//! producer never moves `write` onto `read`. Each cursor is owned by one side
//! but read by both, so every cursor access goes through a critical section
//! covering that access and nothing else.

use core::{
    cell::{Cell, UnsafeCell},
    ptr, slice,
};

use critical_section::Mutex;

pub(crate) struct Ring<T, const N: usize> {
    slots: UnsafeCell<[T; N]>,
    read: Mutex<Cell<usize>>,
    write: Mutex<Cell<usize>>,
}

// SAFETY: slot storage is only reached through the `unsafe` accessors below,
// whose callers are the single producer (slots at and after `write`) and the
// single consumer (slots in `read..write`). Cursors are behind critical
// sections.
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}

impl<T: Copy, const N: usize> Ring<T, N> {
    const MIN_SIZE: () = assert!(N >= 2, "a ring needs at least two slots");

    pub const fn new(fill: T) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::MIN_SIZE;

        Self {
            slots: UnsafeCell::new([fill; N]),
            read: Mutex::new(Cell::new(0)),
            write: Mutex::new(Cell::new(0)),
        }
    }

    /// Slots that can be filled at once
    pub const fn capacity(&self) -> usize {
        N - 1
    }

    pub const fn advance(index: usize, by: usize) -> usize {
        (index + by) % N
    }

    pub const fn occupied(read: usize, write: usize) -> usize {
        (write + N - read) % N
    }

    pub const fn headroom(read: usize, write: usize) -> usize {
        N - 1 - Self::occupied(read, write)
    }

    /// Both cursors as `(read, write)`, taken together.
    pub fn snapshot(&self) -> (usize, usize) {
        critical_section::with(|cs| (self.read.borrow(cs).get(), self.write.borrow(cs).get()))
    }

    pub fn len(&self) -> usize {
        let (read, write) = self.snapshot();
        Self::occupied(read, write)
    }

    pub fn commit_read(&self, index: usize) {
        debug_assert!(index < N);
        critical_section::with(|cs| self.read.borrow(cs).set(index));
    }

    pub fn commit_write(&self, index: usize) {
        debug_assert!(index < N);
        critical_section::with(|cs| self.write.borrow(cs).set(index));
    }

    /// Resets both cursors to zero. Only the consumer may do this, and only
    /// while the producer is known to be idle.
    pub fn clear(&self) {
        critical_section::with(|cs| {
            self.read.borrow(cs).set(0);
            self.write.borrow(cs).set(0);
        });
    }

    /// Consumer-side flush: moves `read` up to `write`. Safe against a
    /// producer that commits concurrently, which just appends after the
    /// flushed region.
    pub fn discard_pending(&self) {
        critical_section::with(|cs| {
            let write = self.write.borrow(cs).get();
            self.read.borrow(cs).set(write);
        });
    }

    /// # Safety
    ///
    /// Only the producer may call this, with `index` equal to its current
    /// (uncommitted) write cursor.
    pub unsafe fn write_slot(&self, index: usize, value: T) {
        debug_assert!(index < N);
        self.slots.get().cast::<T>().add(index).write(value);
    }

    /// # Safety
    ///
    /// Only the consumer may call this, with `index` inside its `read..write`
    /// snapshot.
    pub unsafe fn read_slot(&self, index: usize) -> T {
        debug_assert!(index < N);
        self.slots.get().cast::<T>().add(index).read()
    }
}

impl<const N: usize> Ring<u8, N> {
    /// Copies `bytes` starting at `index`, wrapping at the physical end.
    ///
    /// # Safety
    ///
    /// Only the producer may call this, starting at its write cursor, with no
    /// more bytes than the current headroom.
    pub unsafe fn write_bytes(&self, index: usize, bytes: &[u8]) {
        debug_assert!(index < N && bytes.len() < N);

        let base = self.slots.get().cast::<u8>();
        let (head, tail) = bytes.split_at(bytes.len().min(N - index));

        ptr::copy_nonoverlapping(head.as_ptr(), base.add(index), head.len());
        ptr::copy_nonoverlapping(tail.as_ptr(), base, tail.len());
    }

    /// Borrows `start..end` of the physical buffer without wrapping.
    ///
    /// # Safety
    ///
    /// Only the consumer may call this, for a span inside its `read..write`
    /// snapshot, and must drop the slice before committing past it.
    pub unsafe fn span(&self, start: usize, end: usize) -> &[u8] {
        debug_assert!(start <= end && end <= N);
        slice::from_raw_parts(self.slots.get().cast::<u8>().add(start), end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::Ring;

    type Small = Ring<u32, 4>;

    #[test]
    fn one_slot_is_reserved() {
        let ring = Small::new(0);
        assert_eq!(ring.capacity(), 3);

        assert_eq!(Small::headroom(0, 0), 3);
        assert_eq!(Small::headroom(0, 3), 0);
        assert_eq!(Small::headroom(2, 1), 0);
        assert_eq!(Small::headroom(3, 1), 1);

        assert_eq!(Small::occupied(3, 1), 2);
        assert_eq!(Small::advance(3, 1), 0);
        assert_eq!(Small::advance(2, 3), 1);
    }

    #[test]
    fn slots_and_cursors() {
        let ring = Small::new(0);

        unsafe {
            ring.write_slot(0, 10);
            ring.write_slot(1, 11);
        }
        ring.commit_write(2);

        assert_eq!(ring.snapshot(), (0, 2));
        assert_eq!(ring.len(), 2);
        assert_eq!(unsafe { ring.read_slot(0) }, 10);

        ring.commit_read(1);
        assert_eq!(ring.len(), 1);

        ring.discard_pending();
        assert_eq!(ring.snapshot(), (2, 2));

        ring.clear();
        assert_eq!(ring.snapshot(), (0, 0));
    }

    #[test]
    fn bytes_wrap_at_physical_end() {
        let ring = Ring::<u8, 8>::new(0);

        unsafe { ring.write_bytes(5, b"abcde") };

        assert_eq!(unsafe { ring.span(5, 8) }, b"abc");
        assert_eq!(unsafe { ring.span(0, 2) }, b"de");
    }
}
