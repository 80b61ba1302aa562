//! Import remap resolution.
//!
//! A file with an `.import` sidecar is not packed directly; the sidecar's
//! `[remap]` section names the imported payload(s) to pack instead. A plain
//! `path` key is the default payload; `path.<feature>` keys are gated on the
//! active feature set, with platform-specific tie-breaking when more than
//! one gated variant is active.

use std::collections::HashSet;

use crate::cfg::ConfigFile;
use crate::error::{ExportError, Result};
use crate::features::FeatureSet;
use crate::platform::ExportPlatform;
use crate::preset::ExportPreset;
use crate::project::Project;

/// How an imported file should be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapOutcome {
    /// `importer="keep"`: pack the original file verbatim.
    Keep,
    /// Pack these payload paths (the `.import` sidecar itself is appended
    /// separately by the driver).
    Remapped { payloads: Vec<String> },
}

/// Resolve the `.import` sidecar for `path`.
pub fn resolve_import(
    project: &Project,
    platform: &dyn ExportPlatform,
    preset: &ExportPreset,
    features: &FeatureSet,
    path: &str,
) -> Result<RemapOutcome> {
    let sidecar = project.resolve_path(&format!("{path}.import"));
    let config = ConfigFile::load(&sidecar).map_err(|source| ExportError::Remap {
        path: path.to_owned(),
        source,
    })?;

    let importer = config
        .get("remap", "importer")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if importer == "keep" {
        return Ok(RemapOutcome::Keep);
    }

    let remap_keys = config.section_keys("remap");

    // Which feature-gated variants are actually active for this file.
    let mut remap_features: HashSet<String> = HashSet::new();
    for key in &remap_keys {
        if let Some(feature) = key.strip_prefix("path.") {
            if features.contains(feature) {
                remap_features.insert(feature.to_owned());
            }
        }
    }
    if remap_features.len() > 1 {
        platform.resolve_platform_feature_priorities(preset, &mut remap_features);
    }

    let mut payloads = Vec::new();
    for key in &remap_keys {
        if *key == "path" {
            if let Some(target) = config.get("remap", key).and_then(|v| v.as_str()) {
                payloads.push(target.to_owned());
            }
        } else if let Some(feature) = key.strip_prefix("path.") {
            if remap_features.contains(feature) {
                if let Some(target) = config.get("remap", key).and_then(|v| v.as_str()) {
                    payloads.push(target.to_owned());
                }
            }
        }
    }

    Ok(RemapOutcome::Remapped { payloads })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PcPlatform;
    use std::fs;
    use tempfile::tempdir;

    fn setup(sidecar: &str) -> (tempfile::TempDir, Project) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.png"), "png").unwrap();
        fs::write(dir.path().join("a.png.import"), sidecar).unwrap();
        let project = Project::load(dir.path()).unwrap();
        (dir, project)
    }

    fn features(tags: &[&str]) -> FeatureSet {
        let mut set = FeatureSet::default();
        for tag in tags {
            set.insert((*tag).to_owned());
        }
        set
    }

    #[test]
    fn keep_importer_short_circuits() {
        let (_dir, project) = setup("[remap]\n\nimporter=\"keep\"\n");
        let platform = PcPlatform::linux();
        let preset = ExportPreset::new("p", platform.name());
        let outcome =
            resolve_import(&project, &platform, &preset, &features(&[]), "res://a.png").unwrap();
        assert_eq!(outcome, RemapOutcome::Keep);
    }

    #[test]
    fn default_and_active_gated_remaps_are_emitted() {
        let (_dir, project) = setup(
            "[remap]\n\nimporter=\"texture\"\npath=\"res://.godot/imported/a.ctex\"\n\
             path.etc2=\"res://.godot/imported/a.etc2\"\npath.s3tc=\"res://.godot/imported/a.s3tc\"\n",
        );
        let platform = PcPlatform::linux();
        let preset = ExportPreset::new("p", platform.name());
        let outcome = resolve_import(
            &project,
            &platform,
            &preset,
            &features(&["etc2"]),
            "res://a.png",
        )
        .unwrap();
        assert_eq!(
            outcome,
            RemapOutcome::Remapped {
                payloads: vec![
                    "res://.godot/imported/a.ctex".to_owned(),
                    "res://.godot/imported/a.etc2".to_owned(),
                ]
            }
        );
    }

    #[test]
    fn tie_break_prefers_bptc_over_s3tc() {
        let (_dir, project) = setup(
            "[remap]\n\nimporter=\"texture\"\n\
             path.bptc=\"res://.godot/imported/a.bptc\"\npath.s3tc=\"res://.godot/imported/a.s3tc\"\n",
        );
        let platform = PcPlatform::linux();
        let mut preset = ExportPreset::for_platform("p", &platform);
        preset.options.insert(
            "texture_format/no_bptc_fallbacks".to_owned(),
            crate::cfg::Value::Bool(true),
        );
        let outcome = resolve_import(
            &project,
            &platform,
            &preset,
            &features(&["bptc", "s3tc"]),
            "res://a.png",
        )
        .unwrap();
        assert_eq!(
            outcome,
            RemapOutcome::Remapped {
                payloads: vec!["res://.godot/imported/a.bptc".to_owned()]
            }
        );
    }

    #[test]
    fn inactive_features_are_ignored() {
        let (_dir, project) = setup(
            "[remap]\n\nimporter=\"texture\"\npath.etc2=\"res://.godot/imported/a.etc2\"\n",
        );
        let platform = PcPlatform::linux();
        let preset = ExportPreset::new("p", platform.name());
        let outcome = resolve_import(
            &project,
            &platform,
            &preset,
            &features(&["s3tc"]),
            "res://a.png",
        )
        .unwrap();
        assert_eq!(outcome, RemapOutcome::Remapped { payloads: vec![] });
    }

    #[test]
    fn unparsable_sidecar_is_a_remap_error() {
        let (_dir, project) = setup("[remap\nbroken");
        let platform = PcPlatform::linux();
        let preset = ExportPreset::new("p", platform.name());
        match resolve_import(&project, &platform, &preset, &features(&[]), "res://a.png") {
            Err(ExportError::Remap { path, .. }) => assert_eq!(path, "res://a.png"),
            other => panic!("expected remap error, got {other:?}"),
        }
    }
}
