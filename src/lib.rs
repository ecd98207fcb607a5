//! Container image registry backed by an IPFS content store
//!
//! Images are decomposed into a graph of content-addressed records by the
//! [ImageWriter], served back over the distribution API by the [server]
//! module, and named cluster-wide through a published reference map that the
//! [admission] webhook consults to relocate pod image pulls onto the store.

#[macro_use] extern crate lazy_static;
#[macro_use] extern crate serde;

pub mod admission;
pub mod consts;
pub mod errors;
pub mod graph;
pub mod image;
pub mod manifest;
pub mod naming;
pub mod remote;
pub mod server;
pub mod store;

pub use crate::{
    graph::{GraphReader, ImageWriter, Reader},
    image::{ContentDigest, ImageName},
    naming::{CidMapper, NameMapper, Updater},
    store::{ContentStore, KuboStore, MemoryStore},
};
