//! Feature tags driving remap selection and plugin callbacks.

use std::collections::HashSet;

use crate::platform::ExportPlatform;
use crate::preset::ExportPreset;
use crate::util::split_comma;

/// The active feature tags for one export run.
///
/// Kept both as a set (for membership tests during remap resolution) and as
/// an ordered vector handed to plugins: platform features first, then preset
/// features, then `debug`/`release`, then the preset's custom tags.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    set: HashSet<String>,
    ordered: Vec<String>,
}

impl FeatureSet {
    pub fn build(platform: &dyn ExportPlatform, preset: &ExportPreset, debug: bool) -> Self {
        let mut features = Self::default();
        for tag in platform.platform_features() {
            features.insert(tag);
        }
        for tag in platform.preset_features(preset) {
            features.insert(tag);
        }
        features.insert(if debug { "debug" } else { "release" }.to_owned());
        for tag in split_comma(&preset.custom_features) {
            features.insert(tag);
        }
        features
    }

    pub fn insert(&mut self, tag: String) {
        self.set.insert(tag.clone());
        self.ordered.push(tag);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.set.contains(tag)
    }

    pub fn as_set(&self) -> &HashSet<String> {
        &self.set
    }

    /// The ordered, script-visible view.
    pub fn ordered(&self) -> &[String] {
        &self.ordered
    }
}
