pub mod spheroid;

pub use spheroid::SpheroidPlugin;

use crate::plugin::PluginRegistration;

/// Every plugin linked into this crate, declared for explicit registration
/// at startup.
pub fn builtin_plugins() -> Vec<PluginRegistration> {
    vec![spheroid::registration()]
}
