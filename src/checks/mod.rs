// src/checks/mod.rs

//! Checks run against a loaded repository snapshot

pub mod consistency;
pub mod image;

pub use consistency::{ConsistencyReport, analyze};
pub use image::{DockerCli, ImageInspector, image_reference, verify_image};
