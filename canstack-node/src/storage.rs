//! Persistent storage of parameter images
//!
//! The node serializes every entry marked `persist` into an image (see [`crate::persist`]) and
//! hands it to the application's [`ParameterStorage`], typically backed by flash.

/// Application provided non-volatile storage for one parameter image
pub trait ParameterStorage: Sync {
    /// Replace the stored image
    fn store(&self, image: &[u8]);

    /// Copy the stored image into `buf`
    ///
    /// Returns the image length, or `None` if nothing is stored or `buf` is too small.
    fn load(&self, buf: &mut [u8]) -> Option<usize>;

    /// Erase the stored image, so defaults apply at the next reset
    fn clear(&self);
}

#[cfg(feature = "std")]
mod mem {
    use super::ParameterStorage;
    use std::sync::Mutex;

    /// A [`ParameterStorage`] held in RAM, for hosts and tests
    #[derive(Debug, Default)]
    pub struct MemoryStorage {
        image: Mutex<Option<Vec<u8>>>,
    }

    impl MemoryStorage {
        /// Create an empty storage
        pub fn new() -> Self {
            Self::default()
        }

        /// A copy of the stored image
        pub fn image(&self) -> Option<Vec<u8>> {
            self.image.lock().ok().and_then(|image| image.clone())
        }
    }

    impl ParameterStorage for MemoryStorage {
        fn store(&self, image: &[u8]) {
            if let Ok(mut stored) = self.image.lock() {
                *stored = Some(image.to_vec());
            }
        }

        fn load(&self, buf: &mut [u8]) -> Option<usize> {
            let stored = self.image.lock().ok()?;
            let image = stored.as_ref()?;
            let dst = buf.get_mut(..image.len())?;
            dst.copy_from_slice(image);
            Some(image.len())
        }

        fn clear(&self) {
            if let Ok(mut stored) = self.image.lock() {
                *stored = None;
            }
        }
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub use mem::MemoryStorage;
