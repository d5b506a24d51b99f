pub(crate) mod field;
pub(crate) mod source;
