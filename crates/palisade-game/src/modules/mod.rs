//! The module roster compiled into this Game build.

mod base;

pub use base::BaseModule;

use crate::module::PlayerModule;

/// The modules attached to every player actor, in handling order.
pub fn default_modules() -> Vec<Box<dyn PlayerModule>> {
    vec![Box::new(BaseModule::new())]
}
