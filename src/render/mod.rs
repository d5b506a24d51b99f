pub(crate) mod events;
pub(crate) mod frame;
pub(crate) mod images;
pub mod interpolate;
pub(crate) mod target;
pub(crate) mod task;
pub(crate) mod video;
