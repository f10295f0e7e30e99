#![no_std]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod communication;
pub mod mail;
pub mod tee;

pub use communication::*;
