//! Parametric geometry of a dumbbell-shaped fiber-reinforced rubber test
//! specimen, the two crossed fiber families embedded in it and the transfer
//! of solid-domain results onto the fibers.
//!
//! The nonlinear solver itself is not part of this crate. It consumes the
//! solid [`mesh::Mesh`] and the descriptors of [`materials`], and hands its
//! results back through [`transfer::SolidField`].

pub mod datatypes;
pub mod error;
pub mod fibers;
pub mod input;
pub mod materials;
pub mod mesh;
pub mod mesher;
pub mod post_processor;
pub mod transfer;

pub use error::{FiberMeshError, Result};
