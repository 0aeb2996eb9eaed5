//! Helper macros for ABI function generation.
//!
//! `abi_fn!` generates `pub unsafe extern "C" fn` items that are exported
//! unmangled in release builds.

/// Generate an extern "C" entry point.
///
/// # Usage
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn my_func(arg1: Type1, arg2: Type2) -> ReturnType {
///         // implementation body
///     }
/// }
/// ```
///
/// The body runs inside an `unsafe` block. The symbol is only exported
/// unmangled when debug assertions are off, so test binaries linked against
/// the rlib do not interpose on the host libc.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };

    // Variant without return type (returns ())
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };
}
