/// Song providers used to fill new rooms.
pub mod catalog;
