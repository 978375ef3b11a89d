//! An AtomicCell type which uses a critical_section Mutex to make every load and store atomic
//!
//! All state which is shared between the CAN interrupt and the main loop is kept in one of these,
//! so every access is a single short critical section.

use core::{cell::Cell, ops::Add};
use critical_section::Mutex;

/// A `Copy` value which may be shared between an interrupt handler and the main loop
#[derive(Debug)]
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Send + Copy> AtomicCell<T> {
    /// Create a new cell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Overwrite the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value));
    }

    /// Store `value`, returning the value it replaced
    pub fn swap(&self, value: T) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).replace(value))
    }

    /// Apply `f` to the value inside a single critical section
    ///
    /// If `f` returns `Some`, the new value is stored and the old one returned in `Ok`. If it
    /// returns `None` nothing is stored and the current value is returned in `Err`.
    pub fn fetch_update(&self, mut f: impl FnMut(T) -> Option<T>) -> Result<T, T> {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let old_value = cell.get();
            match f(old_value) {
                Some(new_value) => {
                    cell.set(new_value);
                    Ok(old_value)
                }
                None => Err(old_value),
            }
        })
    }
}

impl<T: Send + Copy + Default> AtomicCell<T> {
    /// Take the value, leaving `T::default()` behind
    pub fn take(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).take())
    }
}

impl<T: Send + Copy + Add<Output = T>> AtomicCell<T> {
    /// Add to the value, returning the previous one
    pub fn fetch_add(&self, value: T) -> T {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let old_value = cell.get();
            cell.set(old_value + value);
            old_value
        })
    }
}

impl<T: Default + Copy + Send> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
