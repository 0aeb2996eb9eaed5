//! Numeric conversion collaborators used by the format engines.

pub mod conversion;
pub mod float_parse;

pub use conversion::{
    ConversionStatus, NumUnit, atoi, atol, strtol, strtol_impl, strtoul, strtoul_impl,
    wcstol_impl, wcstoul_impl,
};
pub use float_parse::{
    strtod_impl, strtod_with_point, strtof_impl, strtof_with_point, wcstod_impl,
};
