//! memory zeroing that the optimizer is not allowed to elide

use std::ptr;

pub fn zero(to_zero: &mut [u8]) {
    for byte in to_zero.iter_mut() {
        unsafe { ptr::write_volatile(byte, 0) };
    }
}
