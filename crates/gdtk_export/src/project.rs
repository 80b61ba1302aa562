//! The project context threaded through the export driver.
//!
//! Replaces the editor's process-wide singletons: project settings,
//! autoload registrations, synthetic-artifact locations and the optional
//! text-server data provider all hang off one explicit [`Project`] value.

use byteorder::{WriteBytesExt, LE};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::cfg::{ConfigFile, Value};
use crate::error::{ExportError, Result};
use crate::util::strip_res_prefix;

/// Marker file that excludes a directory from resource scans.
const IGNORE_MARKER: &str = ".gdignore";

/// Magic for the binary project settings blob packed as `project.binary`.
const SETTINGS_MAGIC: &[u8; 4] = b"ECFG";

/// Provider for text-server support data (ICU tables and the like).
///
/// When the project opts in, the driver packs either a user-provided data
/// file from the project root or a freshly generated one.
pub trait TextServer {
    /// File name the runtime expects, e.g. `icudt_godot.dat`.
    fn support_data_filename(&self) -> String;
    /// Write the default support data to `path`.
    fn save_support_data(&self, path: &Path) -> io::Result<()>;
}

/// One open project: root directory plus parsed settings.
pub struct Project {
    root: PathBuf,
    pub settings: ConfigFile,
    pub text_server: Option<Box<dyn TextServer>>,
}

impl Project {
    /// Open the project at `root`, reading `project.godot` when present.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let settings_path = root.join("project.godot");
        let settings = if settings_path.exists() {
            ConfigFile::load(&settings_path)?
        } else {
            ConfigFile::new()
        };
        Ok(Self {
            root,
            settings,
            text_server: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a `res://` path to its location on disk.
    pub fn resolve_path(&self, res_path: &str) -> PathBuf {
        self.root.join(strip_res_prefix(res_path))
    }

    pub fn file_exists(&self, res_path: &str) -> bool {
        self.resolve_path(res_path).is_file()
    }

    pub fn read_file(&self, res_path: &str) -> Result<Vec<u8>> {
        let disk = self.resolve_path(res_path);
        fs::read(&disk).map_err(|e| ExportError::io(disk, e))
    }

    /// Look up a settings value by its slash-joined name, e.g.
    /// `application/config/icon`.
    pub fn setting(&self, name: &str) -> Option<&Value> {
        match name.split_once('/') {
            Some((section, key)) => self.settings.get(section, key),
            None => self.settings.get("", name),
        }
    }

    pub fn string_setting(&self, name: &str) -> &str {
        self.setting(name).and_then(Value::as_str).unwrap_or("")
    }

    pub fn bool_setting(&self, name: &str) -> bool {
        self.setting(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Autoload resource paths, with the leading `*` singleton marker
    /// stripped.
    pub fn autoloads(&self) -> Vec<String> {
        self.settings
            .section_entries("autoload")
            .into_iter()
            .filter_map(|(_, v)| v.as_str())
            .map(|path| path.strip_prefix('*').unwrap_or(path).to_owned())
            .collect()
    }

    /// Directories excluded from resource scans (an `.gdignore` marker).
    /// Dot-directories are handled separately by the walkers themselves.
    pub fn should_skip_directory(&self, dir: &Path) -> bool {
        dir.join(IGNORE_MARKER).is_file()
    }

    /// Resource-UID cache emitted by the importer.
    pub fn uid_cache_path(&self) -> &'static str {
        "res://.godot/uid_cache.bin"
    }

    /// Native-extension list config file.
    pub fn extension_list_path(&self) -> &'static str {
        "res://.godot/extension_list.cfg"
    }

    /// Serialize project settings into the `project.binary` blob.
    ///
    /// `custom_features` becomes the leading `_custom_features` entry;
    /// `overlays` are appended after the regular (sorted) settings so they
    /// win at load time.
    pub fn save_settings_binary(
        &self,
        custom_features: &[String],
        overlays: &[(String, Value)],
    ) -> Result<Vec<u8>> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        if !custom_features.is_empty() {
            entries.push((
                "_custom_features".to_owned(),
                Value::String(custom_features.join(",")),
            ));
        }

        let mut flat: Vec<(String, Value)> = Vec::new();
        for section in self.settings.section_names() {
            for (key, value) in self.settings.section_entries(section) {
                let name = if section.is_empty() {
                    key.to_owned()
                } else {
                    format!("{section}/{key}")
                };
                flat.push((name, value.clone()));
            }
        }
        flat.sort_by(|a, b| a.0.cmp(&b.0));
        entries.extend(flat);
        entries.extend(overlays.iter().cloned());

        let mut out = Vec::new();
        out.extend_from_slice(SETTINGS_MAGIC);
        out.write_u32::<LE>(entries.len() as u32)
            .map_err(|e| ExportError::io("project.binary", e))?;
        for (name, value) in &entries {
            out.write_u32::<LE>(name.len() as u32)
                .map_err(|e| ExportError::io("project.binary", e))?;
            out.extend_from_slice(name.as_bytes());
            write_binary_value(&mut out, value).map_err(|e| ExportError::io("project.binary", e))?;
        }
        Ok(out)
    }
}

fn write_binary_value(out: &mut Vec<u8>, value: &Value) -> io::Result<()> {
    match value {
        Value::Bool(b) => {
            out.write_u32::<LE>(1)?;
            out.write_u8(*b as u8)?;
        }
        Value::Int(i) => {
            out.write_u32::<LE>(2)?;
            out.write_i64::<LE>(*i)?;
        }
        Value::String(s) => {
            out.write_u32::<LE>(3)?;
            out.write_u32::<LE>(s.len() as u32)?;
            out.extend_from_slice(s.as_bytes());
        }
        Value::List(items) => {
            out.write_u32::<LE>(4)?;
            out.write_u32::<LE>(items.len() as u32)?;
            for item in items {
                out.write_u32::<LE>(item.len() as u32)?;
                out.extend_from_slice(item.as_bytes());
            }
        }
    }
    Ok(())
}
