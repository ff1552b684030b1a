// Fallible buffer allocation
//
// Every buffer the engine hands back (outputs, gradients) and every scratch
// buffer it needs (im2col columns, partial reductions) goes through here, so
// exhaustion surfaces as `Error::AllocationFailure` instead of an abort.

use crate::error::{Error, Result};

/// Allocate a `Vec` of `len` copies of `value`, reporting failure as an error.
pub(crate) fn try_filled<T: Copy>(len: usize, value: T) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::AllocationFailure {
        elems: len,
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    buf.resize(len, value);
    log::trace!(
        "allocated {} elements ({} bytes)",
        len,
        len * std::mem::size_of::<T>()
    );
    Ok(buf)
}
