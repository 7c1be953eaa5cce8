//! # `HighResolutionNet` Pre-Fabs
//!
//! Well-known HRNet widths; named ``hrnet_w{base_channels}``.
//!
//! | name        | base channels |
//! |-------------|---------------|
//! | `hrnet_w18` | 18            |
//! | `hrnet_w32` | 32            |
//! | `hrnet_w48` | 48            |

use crate::models::hrnet::hrnet_model::HighResolutionNetConfig;
use crate::utility::prefabs::{PreFabConfig, StaticPreFabConfig};

/// Static builder for [`HighResolutionNetPreFab`].
pub type StaticHighResolutionNetPreFab = StaticPreFabConfig<HighResolutionNetConfig>;

/// A [`HighResolutionNetConfig`] Well-Known Pre-Fab.
pub type HighResolutionNetPreFab = PreFabConfig<HighResolutionNetConfig>;

/// `HRNet-W18`.
pub static HRNET_W18: StaticHighResolutionNetPreFab = StaticPreFabConfig {
    name: "hrnet_w18",
    description: "HRNet backbone, base width 18",
    builder: || HighResolutionNetConfig::new(18),
};

/// `HRNet-W32`.
pub static HRNET_W32: StaticHighResolutionNetPreFab = StaticPreFabConfig {
    name: "hrnet_w32",
    description: "HRNet backbone, base width 32",
    builder: || HighResolutionNetConfig::new(32),
};

/// `HRNet-W48`.
pub static HRNET_W48: StaticHighResolutionNetPreFab = StaticPreFabConfig {
    name: "hrnet_w48",
    description: "HRNet backbone, base width 48",
    builder: || HighResolutionNetConfig::new(48),
};

/// All known pre-fabs.
pub static HRNET_PREFABS: [&StaticHighResolutionNetPreFab; 3] =
    [&HRNET_W18, &HRNET_W32, &HRNET_W48];

/// The names of all known pre-fabs.
pub fn prefab_names() -> Vec<&'static str> {
    HRNET_PREFABS.iter().map(|prefab| prefab.name).collect()
}

/// Look up a pre-fab by name.
pub fn lookup_prefab(name: &str) -> Option<HighResolutionNetPreFab> {
    HRNET_PREFABS
        .iter()
        .find(|prefab| prefab.name == name)
        .map(|prefab| prefab.to_prefab())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::hrnet::hrnet_model::HighResolutionNetMeta;
    use hamcrest::prelude::*;

    #[test]
    fn test_prefab_names() {
        assert_that!(
            prefab_names(),
            is(equal_to(vec!["hrnet_w18", "hrnet_w32", "hrnet_w48"]))
        );
    }

    #[test]
    fn test_lookup_prefab() {
        for (name, width) in [("hrnet_w18", 18), ("hrnet_w32", 32), ("hrnet_w48", 48)] {
            let prefab = lookup_prefab(name).unwrap();
            assert_eq!(prefab.name, name);

            let config = prefab.new_config();
            assert_eq!(config.base_channels(), width);
            assert_eq!(config.out_channels(), width);
            assert_eq!(config.low_level_channels(), 256);
            assert_eq!(config.num_branches(), 4);
            assert_eq!(config.stage_modules, vec![1, 4, 3]);
        }

        assert!(lookup_prefab("hrnet_w64").is_none());
        assert!(lookup_prefab("").is_none());
    }
}
