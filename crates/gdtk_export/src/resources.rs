//! Project resource enumeration and dependency closure.
//!
//! [`ResourceIndex::scan`] builds a snapshot of the project's resources:
//! every file that either has an `.import` sidecar or carries a recognized
//! resource extension, with its resource type and (for text resources) the
//! dependencies it references. [`collect_export_paths`] then seeds the
//! export set from the preset's filter mode.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use walkdir::WalkDir;

use crate::cfg::ConfigFile;
use crate::preset::{ExportFilter, ExportPreset};
use crate::project::Project;

/// One indexed resource.
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub resource_type: String,
    pub deps: Vec<String>,
}

/// Snapshot of the project's resources, keyed by `res://` path.
#[derive(Debug, Default)]
pub struct ResourceIndex {
    entries: BTreeMap<String, ResourceEntry>,
}

impl ResourceIndex {
    pub fn scan(project: &Project) -> Self {
        let mut index = Self::default();

        let walker = WalkDir::new(project.root())
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                if entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with('.'))
                {
                    return false;
                }
                !project.should_skip_directory(entry.path())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("resource scan error: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') || name.ends_with(".import") || name.ends_with(".remap") {
                continue;
            }
            if name == "project.godot" || name == "export_presets.cfg" {
                continue;
            }

            let rel = match entry.path().strip_prefix(project.root()) {
                Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
                Err(_) => continue,
            };
            let res_path = format!("res://{rel}");

            let resource_type = match detect_type(project, &res_path) {
                Some(ty) => ty,
                None => continue, // not a resource the editor tracks
            };
            let deps = scan_deps(project, &res_path);
            index.entries.insert(
                res_path,
                ResourceEntry {
                    resource_type,
                    deps,
                },
            );
        }
        index
    }

    pub fn resource_type(&self, path: &str) -> &str {
        self.entries
            .get(path)
            .map(|e| e.resource_type.as_str())
            .unwrap_or("")
    }

    pub fn deps(&self, path: &str) -> &[String] {
        self.entries.get(path).map(|e| e.deps.as_slice()).unwrap_or(&[])
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn detect_type(project: &Project, res_path: &str) -> Option<String> {
    let sidecar = project.resolve_path(&format!("{res_path}.import"));
    if sidecar.is_file() {
        let ty = ConfigFile::load(&sidecar)
            .ok()
            .and_then(|cfg| cfg.get("remap", "type").and_then(|v| v.as_str().map(str::to_owned)))
            .unwrap_or_else(|| "Resource".to_owned());
        return Some(ty);
    }
    let ext = res_path.rsplit('.').next().unwrap_or("");
    let ty = match ext {
        "tscn" | "scn" => "PackedScene",
        "tres" | "res" => "Resource",
        "gd" => "GDScript",
        "gdshader" => "Shader",
        "json" => "JSON",
        "txt" | "md" | "rst" | "log" => "TextFile",
        _ => return None,
    };
    Some(ty.to_owned())
}

/// Dependencies referenced by a text resource: `[ext_resource ...]` headers
/// carry a `path="res://..."` attribute. Binary resources declare none.
fn scan_deps(project: &Project, res_path: &str) -> Vec<String> {
    if !res_path.ends_with(".tscn") && !res_path.ends_with(".tres") {
        return Vec::new();
    }
    let Ok(text) = fs::read_to_string(project.resolve_path(res_path)) else {
        return Vec::new();
    };

    let mut deps = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if !line.starts_with("[ext_resource") {
            continue;
        }
        if let Some(start) = line.find("path=\"") {
            let rest = &line[start + 6..];
            if let Some(end) = rest.find('"') {
                deps.push(rest[..end].to_owned());
            }
        }
    }
    deps
}

/// Seed the export path set from the preset's filter mode, then close over
/// dependencies and autoloads.
pub fn collect_export_paths(
    project: &Project,
    index: &ResourceIndex,
    preset: &ExportPreset,
) -> BTreeSet<String> {
    let mut paths = BTreeSet::new();

    match preset.export_filter {
        ExportFilter::AllResources => {
            collect_all(index, &mut paths);
        }
        ExportFilter::ExcludeSelectedResources => {
            collect_all(index, &mut paths);
            for file in &preset.selected_files {
                paths.remove(file);
            }
        }
        ExportFilter::SelectedScenes | ExportFilter::SelectedResources => {
            let scenes_only = preset.export_filter == ExportFilter::SelectedScenes;
            for file in &preset.selected_files {
                if scenes_only && index.resource_type(file) != "PackedScene" {
                    continue;
                }
                find_dependencies(index, file, &mut paths);
            }
        }
    }

    for autoload in project.autoloads() {
        find_dependencies(index, &autoload, &mut paths);
    }

    paths
}

fn collect_all(index: &ResourceIndex, paths: &mut BTreeSet<String>) {
    for path in index.paths() {
        if index.resource_type(path) == "TextFile" {
            continue;
        }
        paths.insert(path.to_owned());
    }
}

fn find_dependencies(index: &ResourceIndex, path: &str, paths: &mut BTreeSet<String>) {
    if !paths.insert(path.to_owned()) {
        return;
    }
    for dep in index.deps(path) {
        find_dependencies(index, dep, paths);
    }
}
