//! Topic definition macro

/// Define one or more topic record types.
///
/// Each struct becomes `#[repr(C)]` with `Debug, Clone, Copy, Default,
/// PartialEq` derived, gets an associated `METADATA` constant and an
/// implementation of [`Message`](crate::topic::Message). Compilation fails if
/// a field type is not [`Plain`](crate::topic::Plain) or if the layout
/// contains padding; pad explicitly with `_padding` byte arrays instead.
///
/// ```
/// skybus::define_topic! {
///     /// Airspeed estimate
///     pub struct Airspeed("airspeed", id = 40) {
///         pub timestamp: u64,
///         pub indicated_m_s: f32,
///         pub true_m_s: f32,
///     }
/// }
///
/// use skybus::topic::Message;
/// assert_eq!(Airspeed::metadata().size, 16);
/// assert_eq!(Airspeed::METADATA.fields, "u64 timestamp;f32 indicated_m_s;f32 true_m_s;");
/// ```
#[macro_export]
macro_rules! define_topic {
    ($(
        $(#[$meta:meta])*
        $vis:vis struct $name:ident ($topic:literal, id = $id:expr $(, queue = $queue:expr)?) {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $fty:ty ),* $(,)?
        }
    )+) => {$(
        $(#[$meta])*
        #[repr(C)]
        #[derive(Debug, Clone, Copy, Default, PartialEq)]
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $fty, )*
        }

        impl $name {
            /// Static description of this topic
            pub const METADATA: $crate::topic::TopicMetadata = $crate::topic::TopicMetadata::new(
                $topic,
                ::core::mem::size_of::<$name>(),
                concat!($( stringify!($fty), " ", stringify!($field), ";" ),*),
                $id,
            );
        }

        const _: () = {
            const fn assert_plain<T: $crate::topic::Plain>() {}
            $( assert_plain::<$fty>(); )*
            assert!(
                ::core::mem::size_of::<$name>() == 0 $( + ::core::mem::size_of::<$fty>() )*,
                concat!("topic ", $topic, " contains padding")
            );
        };

        unsafe impl $crate::topic::Message for $name {
            $( const QUEUE_LENGTH: u8 = $queue; )?

            fn metadata() -> &'static $crate::topic::TopicMetadata {
                static METADATA: $crate::topic::TopicMetadata = $name::METADATA;
                &METADATA
            }
        }
    )+};
}
