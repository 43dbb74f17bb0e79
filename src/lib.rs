pub mod control;
pub mod flight;
pub mod geometry;
pub mod io;
pub mod localization;
pub mod system;
pub mod viz;

#[cfg(test)]
pub(crate) mod test_utils;
