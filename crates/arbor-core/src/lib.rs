#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Loader for the actual tree: a snapshot of the packages installed under a
//! project's `node_modules`, links and all.

pub mod arborist;
pub mod config;
pub mod error;
pub mod manifest;
pub mod tree;
pub mod version;
pub mod yarn_lock;

pub use arborist::{Arborist, ArboristOptions, LoadFilter, LoadOptions, TransplantFilter};
pub use config::Config;
pub use error::{ArboristError, NodeError};
pub use manifest::{DepKind, Manifest};
pub use tree::{tree_check, DepFlags, Node, NodeId, PrintNode, Tree};
pub use version::{SCHEMA_VERSION, VERSION};
pub use yarn_lock::{YarnLock, YarnLockEntry, YarnLockError};
