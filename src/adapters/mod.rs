//! Adapters implementing the domain ports

pub mod memory;
