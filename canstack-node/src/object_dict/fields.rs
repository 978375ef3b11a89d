use canstack_common::{objects::DataWidth, sdo::AbortCode, AtomicCell};
use critical_section::Mutex;
use core::cell::RefCell;
use heapless::HistoryBuffer;

/// Access to the backing storage of a scalar object
///
/// Values travel as `u32` regardless of the object width; implementors keep the low bits.
pub trait ScalarAccess: Sync {
    /// Width of the stored value
    fn width(&self) -> DataWidth;
    /// Read the value, zero extended
    fn load_u32(&self) -> u32;
    /// Store the value, truncated to the object width
    fn store_u32(&self, value: u32);
}

/// Access to the backing storage of an array object
///
/// Elements are addressed 1..=`max_len()`, matching their sub-indices.
pub trait ArrayAccess: Sync {
    /// Width of each element
    fn width(&self) -> DataWidth;

    /// Number of elements
    fn max_len(&self) -> u8;

    /// Read element `i`, or `None` when `i` is out of range
    fn get(&self, i: u8) -> Option<u32>;

    /// Write element `i`
    ///
    /// Fails with [`AbortCode::UnsupportedAccess`] for `i == 0` and [`AbortCode::NoSuchObject`]
    /// past the end.
    fn set(&self, i: u8, value: u32) -> Result<(), AbortCode>;

    /// Reset the array contents
    fn clear(&self) -> Result<(), AbortCode> {
        Err(AbortCode::UnsupportedAccess)
    }
}

/// Check that `i` addresses an element of an array with `max_len` elements
pub(crate) fn check_element(i: u8, max_len: u8) -> Result<usize, AbortCode> {
    if i == 0 {
        Err(AbortCode::UnsupportedAccess)
    } else if i > max_len {
        Err(AbortCode::NoSuchObject)
    } else {
        Ok(i as usize - 1)
    }
}

/// A scalar object value
#[derive(Debug)]
pub struct ScalarField<T: Copy> {
    value: AtomicCell<T>,
}

impl<T: Send + Copy> ScalarField<T> {
    /// Atomically read the value
    pub fn load(&self) -> T {
        self.value.load()
    }

    /// Atomically store a new value
    pub fn store(&self, value: T) {
        self.value.store(value);
    }
}

impl<T: Copy + Default + Send> Default for ScalarField<T> {
    fn default() -> Self {
        Self {
            value: AtomicCell::default(),
        }
    }
}

macro_rules! impl_scalar_field {
    ($rust_type: ty, $width: expr) => {
        impl ScalarField<$rust_type> {
            /// Create a new ScalarField with the given value
            pub const fn new(value: $rust_type) -> Self {
                Self {
                    value: AtomicCell::new(value),
                }
            }
        }

        impl ScalarAccess for ScalarField<$rust_type> {
            fn width(&self) -> DataWidth {
                $width
            }

            fn load_u32(&self) -> u32 {
                self.value.load() as u32
            }

            fn store_u32(&self, value: u32) {
                self.value.store(value as $rust_type);
            }
        }
    };
}

impl_scalar_field!(u8, DataWidth::U8);
impl_scalar_field!(u16, DataWidth::U16);
impl_scalar_field!(u32, DataWidth::U32);

/// An array object with `N` elements of type `T`
///
/// The whole array lives in a single cell, so every element access is one critical section.
#[derive(Debug)]
pub struct ArrayField<T: Copy, const N: usize> {
    values: AtomicCell<[T; N]>,
}

/// Largest element count an array object can expose through its u8 sub-indices
pub const MAX_ARRAY_LEN: usize = 254;

impl<T: Send + Copy, const N: usize> ArrayField<T, N> {
    const LEN_CHECK: () = assert!(N <= MAX_ARRAY_LEN, "array objects hold at most 254 elements");

    /// Create an array holding `values`
    ///
    /// Fails to compile when `N` exceeds [`MAX_ARRAY_LEN`].
    pub const fn new(values: [T; N]) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::LEN_CHECK;
        Self {
            values: AtomicCell::new(values),
        }
    }

    /// Read all elements
    pub fn load(&self) -> [T; N] {
        self.values.load()
    }

    /// Overwrite all elements
    pub fn store(&self, values: [T; N]) {
        self.values.store(values);
    }
}

macro_rules! impl_array_field {
    ($rust_type: ty, $width: expr) => {
        impl<const N: usize> ArrayAccess for ArrayField<$rust_type, N> {
            fn width(&self) -> DataWidth {
                $width
            }

            fn max_len(&self) -> u8 {
                N as u8
            }

            fn get(&self, i: u8) -> Option<u32> {
                let idx = check_element(i, N as u8).ok()?;
                Some(self.values.load()[idx] as u32)
            }

            fn set(&self, i: u8, value: u32) -> Result<(), AbortCode> {
                let idx = check_element(i, N as u8)?;
                // The closure never rejects, so this cannot fail
                self.values
                    .fetch_update(|mut values| {
                        values[idx] = value as $rust_type;
                        Some(values)
                    })
                    .ok();
                Ok(())
            }
        }
    };
}

impl_array_field!(u8, DataWidth::U8);
impl_array_field!(u16, DataWidth::U16);
impl_array_field!(u32, DataWidth::U32);

/// Something the node can record fault codes in
pub trait FaultLog: Sync {
    /// Record a fault code
    fn record(&self, code: u32);
}

/// A fixed size history of fault codes, most recent first
///
/// When full, recording a new code drops the oldest one. In the object dictionary it appears as
/// a read-only array of u32: sub 0 gives the capacity, sub n the n-th most recent code, and 0 for
/// slots not yet written.
#[allow(missing_debug_implementations)]
pub struct ErrorLog<const N: usize> {
    history: Mutex<RefCell<HistoryBuffer<u32, N>>>,
}

impl<const N: usize> Default for ErrorLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ErrorLog<N> {
    const LEN_CHECK: () = assert!(N <= MAX_ARRAY_LEN, "an error log holds at most 254 codes");

    /// Create an empty log
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::LEN_CHECK;
        Self {
            history: Mutex::new(RefCell::new(HistoryBuffer::new())),
        }
    }

    /// Number of codes currently held
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.history.borrow_ref(cs).len())
    }

    /// Returns true when no codes are held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The n-th most recent code (1 based)
    pub fn recent(&self, n: usize) -> Option<u32> {
        critical_section::with(|cs| {
            let history = self.history.borrow_ref(cs);
            let len = history.len();
            if n == 0 || n > len {
                return None;
            }
            history.oldest_ordered().nth(len - n).copied()
        })
    }

    /// Discard every recorded code
    pub fn reset(&self) {
        critical_section::with(|cs| {
            *self.history.borrow_ref_mut(cs) = HistoryBuffer::new();
        })
    }
}

impl<const N: usize> FaultLog for ErrorLog<N> {
    fn record(&self, code: u32) {
        critical_section::with(|cs| self.history.borrow_ref_mut(cs).write(code));
    }
}

impl<const N: usize> ArrayAccess for ErrorLog<N> {
    fn width(&self) -> DataWidth {
        DataWidth::U32
    }

    fn max_len(&self) -> u8 {
        N as u8
    }

    fn get(&self, i: u8) -> Option<u32> {
        check_element(i, N as u8).ok()?;
        Some(self.recent(i as usize).unwrap_or(0))
    }

    fn set(&self, i: u8, _value: u32) -> Result<(), AbortCode> {
        check_element(i, N as u8)?;
        Err(AbortCode::ReadOnly)
    }

    fn clear(&self) -> Result<(), AbortCode> {
        self.reset();
        Ok(())
    }
}
