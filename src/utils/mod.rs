//! Shared helpers for the segmentation pipeline

pub mod preprocessing;

pub use preprocessing::{ImagePreprocessor, LetterboxTransform};
