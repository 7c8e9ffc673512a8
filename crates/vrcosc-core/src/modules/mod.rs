//! Modules shipped with the runtime.

pub mod clock;

pub use clock::ClockModule;

use crate::module::Module;

/// A fresh instance of every built-in module.
pub fn builtin() -> Vec<Box<dyn Module>> {
    vec![Box::new(ClockModule::new())]
}
