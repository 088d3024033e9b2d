pub mod overlays;
pub mod upload;
