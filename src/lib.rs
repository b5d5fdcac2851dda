#![crate_name = "rust_ofc"]
#![crate_type = "lib"]
extern crate byteorder;
extern crate bytes;
extern crate mio;

#[macro_use]
extern crate log;

extern crate failure;

#[macro_use]
extern crate failure_derive;

pub mod io_loop;
pub mod message;
pub mod ofp_controller;
pub mod ofp_future;
pub mod ofp_header;
pub mod ofp_message;
pub mod ofp_serialization;
pub mod ofp_stream;
pub mod ofp_switch;
pub mod ofp_utils;
pub mod openflow;

mod rust_ofc {
    pub use super::*;
}
