//! Fixed-layout message records and their byte views

use std::{mem, ptr, slice};

use super::metadata::TopicMetadata;

/// Field types for which every bit pattern is a valid value
///
/// # Safety
///
/// Implementors must contain no padding, no pointers and no invalid bit
/// patterns.
pub unsafe trait Plain: Copy + Send + Sync + 'static {}

macro_rules! impl_plain {
    ($($ty:ty),* $(,)?) => {
        $(unsafe impl Plain for $ty {})*
    };
}

impl_plain!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

/// A topic record type
///
/// Normally implemented through [`define_topic!`](crate::define_topic),
/// which also checks the layout requirements below at compile time.
///
/// # Safety
///
/// The type must be `#[repr(C)]`, built only from [`Plain`] fields, free of
/// padding, and exactly `metadata().size` bytes long.
pub unsafe trait Message: Copy + Default + Send + Sync + 'static {
    /// Default queue depth for producers of this type
    const QUEUE_LENGTH: u8 = 1;

    /// Static description of the topic
    fn metadata() -> &'static TopicMetadata;
}

/// View a record as its raw bytes
pub fn as_bytes<T: Message>(msg: &T) -> &[u8] {
    // SAFETY: Message types are padding-free plain data
    unsafe { slice::from_raw_parts(msg as *const T as *const u8, mem::size_of::<T>()) }
}

/// View a record as mutable raw bytes
pub fn as_bytes_mut<T: Message>(msg: &mut T) -> &mut [u8] {
    // SAFETY: any byte pattern is a valid Message value
    unsafe { slice::from_raw_parts_mut(msg as *mut T as *mut u8, mem::size_of::<T>()) }
}

/// Rebuild a record from bytes, `None` if the length does not match
pub fn read_message<T: Message>(bytes: &[u8]) -> Option<T> {
    if bytes.len() != mem::size_of::<T>() {
        return None;
    }
    // SAFETY: length checked; every bit pattern is valid for a Message
    Some(unsafe { ptr::read_unaligned(bytes.as_ptr() as *const T) })
}
