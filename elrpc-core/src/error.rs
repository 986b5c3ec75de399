use thiserror::Error;

/// Failure while serializing a host value to S-expression text.
///
/// Encoding is total over the supported value space; these are the two
/// ways out of it. The Display strings are part of the wire-visible
/// surface (they travel inside `epc-error` frames), so they are stable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The host type has no S-expression representation at all
    /// (channels, functions and the like).
    #[error("sexp encode: unsupported type: {0}")]
    UnsupportedType(&'static str),

    /// The type is encodable but this particular value is not
    /// (NaN and the infinities).
    #[error("sexp encode: unsupported value: {0}")]
    UnsupportedValue(String),
}
