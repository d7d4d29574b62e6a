//! Test doubles for the collaborator traits

pub mod fakes;

pub use fakes::{FakeBackend, FakeCanvasSurface};
