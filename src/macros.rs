//! Crate-local macros and utility macros.

macro_rules! with_debug_logging {
    ($message:expr $(,$arg:expr)*; $expression:expr) => {{
        log::debug!(concat!("Begin: ", $message)$(,$arg)*);
        let _result = $expression;
        log::debug!(concat!("Done: ", $message)$(,$arg)*);
        _result
    }};
}

/// Asserts at compile time that the given type satisfies the size and
/// alignment requirements for uniform buffers.
macro_rules! assert_uniform_valid {
    ($uniform:ty) => {
        const _: () = assert!(
            ::std::mem::size_of::<$uniform>() % 16 == 0,
            concat!(
                "Size of uniform type ",
                stringify!($uniform),
                " is not a multiple of 16 bytes"
            )
        );
        const _: () = assert!(
            ::std::mem::align_of::<$uniform>() <= 16,
            concat!("Uniform type ", stringify!($uniform), " is over-aligned")
        );
    };
}

/// Creates a slice of `(label, replacement)` pairs for resolving a shader
/// template.
macro_rules! shader_template_replacements {
    ($($label:literal => $replacement:expr),* $(,)?) => {
        &[$(($label, ($replacement).to_string())),*]
    };
}
