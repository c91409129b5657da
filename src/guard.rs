//! Scope-bound ownership of foreign framework references
//!
//! Core Foundation objects, Disk Arbitration sessions, Win32 find handles and
//! `malloc`ed buffers handed out by libc all need exactly one matching
//! release. [`Owned`] takes that one reference at construction and gives it
//! back in `Drop`, so early returns, `?` and panics cannot leak or double
//! release it.

use std::fmt;

/// A raw handle from a foreign framework that owes one release
///
/// # Safety
///
/// `release` must give back exactly the reference the handle represents and
/// must be sound to call once on any handle for which `is_null` is false.
pub unsafe trait ForeignHandle: Copy {
    /// Framework function that returns the reference (`CFRelease`, `FindClose`, `free`)
    const RELEASE: &'static str;

    /// True for the value the framework uses to signal "no object"
    fn is_null(&self) -> bool;

    /// Give the reference back to the framework
    ///
    /// # Safety
    ///
    /// Called at most once per obtained reference.
    unsafe fn release(self);
}

/// Owns one reference to a foreign handle and releases it on drop
///
/// Not `Clone`: derived handles (a description dictionary copied out of a
/// disk object) get their own `Owned`.
pub struct Owned<H: ForeignHandle> {
    raw: H,
}

impl<H: ForeignHandle> Owned<H> {
    /// Take ownership of a freshly obtained reference
    ///
    /// Returns `None` for a null handle, which owes nothing.
    ///
    /// # Safety
    ///
    /// The caller must own `raw` (a Create/Copy rule result, or an opened
    /// handle) and must not release it elsewhere.
    pub unsafe fn from_owned(raw: H) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(Self { raw })
        }
    }

    /// Borrow the raw handle for a framework call
    ///
    /// The handle is only valid while `self` is alive.
    pub fn get(&self) -> H {
        self.raw
    }
}

impl<H: ForeignHandle> Drop for Owned<H> {
    fn drop(&mut self) {
        log::trace!("[guard] {}", H::RELEASE);
        // SAFETY: `from_owned` guarantees a non-null owned reference and
        // `Owned` is neither Clone nor Copy, so this runs once.
        unsafe { self.raw.release() }
    }
}

impl<H: ForeignHandle + fmt::Debug> fmt::Debug for Owned<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RELEASED: [AtomicUsize; 4] = [
        AtomicUsize::new(0),
        AtomicUsize::new(0),
        AtomicUsize::new(0),
        AtomicUsize::new(0),
    ];

    /// Index into `RELEASED`; 0 is the null handle
    #[derive(Debug, Clone, Copy)]
    struct Mock(usize);

    unsafe impl ForeignHandle for Mock {
        const RELEASE: &'static str = "MockRelease";

        fn is_null(&self) -> bool {
            self.0 == 0
        }

        unsafe fn release(self) {
            RELEASED[self.0].fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fallible(fail: bool) -> Result<(), &'static str> {
        let _guard = unsafe { Owned::from_owned(Mock(2)) }.ok_or("null")?;
        if fail {
            return Err("early exit");
        }
        Ok(())
    }

    #[test]
    fn test_release_once_on_scope_exit() {
        {
            let guard = unsafe { Owned::from_owned(Mock(1)) }.unwrap();
            assert_eq!(guard.get().0, 1);
        }
        assert_eq!(RELEASED[1].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_once_on_early_return() {
        assert!(fallible(true).is_err());
        assert!(fallible(false).is_ok());
        assert_eq!(RELEASED[2].load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_derived_handles_release_independently() {
        {
            let _parent = unsafe { Owned::from_owned(Mock(3)) }.unwrap();
            let _child = unsafe { Owned::from_owned(Mock(3)) }.unwrap();
        }
        assert_eq!(RELEASED[3].load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_null_handle_is_not_owned() {
        assert!(unsafe { Owned::from_owned(Mock(0)) }.is_none());
        assert_eq!(RELEASED[0].load(Ordering::SeqCst), 0);
    }
}
