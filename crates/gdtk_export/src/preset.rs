//! Export presets: the immutable configuration for one export run, plus the
//! `export_presets.cfg` store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cfg::{ConfigFile, Value};
use crate::error::{ExportError, Result};
use crate::platform::ExportPlatform;
use crate::project::Project;

/// Which resources seed the export set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFilter {
    /// Every resource the project index knows about.
    #[default]
    AllResources,
    /// Selected scenes plus their transitive dependencies.
    SelectedScenes,
    /// Selected resources plus their transitive dependencies.
    SelectedResources,
    /// Everything except the selected resources.
    ExcludeSelectedResources,
}

impl ExportFilter {
    fn as_config_str(self) -> &'static str {
        match self {
            ExportFilter::AllResources => "all_resources",
            ExportFilter::SelectedScenes => "scenes",
            ExportFilter::SelectedResources => "resources",
            ExportFilter::ExcludeSelectedResources => "exclude",
        }
    }

    fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "all_resources" => Some(ExportFilter::AllResources),
            "scenes" => Some(ExportFilter::SelectedScenes),
            "resources" => Some(ExportFilter::SelectedResources),
            "exclude" => Some(ExportFilter::ExcludeSelectedResources),
            _ => None,
        }
    }

    fn saves_files(self) -> bool {
        !matches!(self, ExportFilter::AllResources)
    }
}

/// One export configuration, bound to a platform by name.
///
/// Read-only while a build is running; edits go through the
/// [`PresetStore`] so they are persisted.
#[derive(Debug, Clone, Default)]
pub struct ExportPreset {
    pub name: String,
    pub platform: String,
    pub runnable: bool,
    pub export_filter: ExportFilter,
    pub selected_files: BTreeSet<String>,
    /// Comma-separated glob list of extra files to include.
    pub include_filter: String,
    /// Comma-separated glob list of files to drop.
    pub exclude_filter: String,
    /// Comma-separated custom feature tags.
    pub custom_features: String,
    /// Destination path, stored relative to the project root.
    pub export_path: String,
    pub enc_pck: bool,
    pub enc_directory: bool,
    /// Comma-separated glob list selecting bodies to encrypt.
    pub enc_in_filter: String,
    /// Comma-separated glob list exempting bodies from encryption.
    pub enc_ex_filter: String,
    pub script_export_mode: i64,
    /// 64 hex digits; decoded with [`crate::key::decode_script_key`].
    pub script_encryption_key: String,
    /// Per-platform option values, seeded from the platform's declarations.
    pub options: BTreeMap<String, Value>,
}

impl ExportPreset {
    pub fn new(name: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            platform: platform.into(),
            ..Self::default()
        }
    }

    /// A preset with its option map seeded from the platform's defaults.
    pub fn for_platform(name: impl Into<String>, platform: &dyn ExportPlatform) -> Self {
        let mut preset = Self::new(name, platform.name().to_owned());
        preset.seed_options(platform);
        preset
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn bool_option(&self, name: &str) -> bool {
        self.option(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn string_option(&self, name: &str) -> &str {
        self.option(name).and_then(Value::as_str).unwrap_or("")
    }

    /// Set the destination path, rebasing absolute inputs onto the project
    /// root so preset files stay machine-independent.
    pub fn set_export_path(&mut self, path: &str, project: &Project) {
        let p = Path::new(path);
        if p.is_absolute() {
            match p.strip_prefix(project.root()) {
                Ok(rel) => self.export_path = rel.to_string_lossy().replace('\\', "/"),
                Err(_) => self.export_path = path.to_owned(),
            }
        } else {
            self.export_path = path.to_owned();
        }
    }

    /// Drop selected files that no longer exist on disk.
    pub fn update_files_to_export(&mut self, project: &Project) {
        self.selected_files
            .retain(|path| project.file_exists(path));
    }

    /// Merge option defaults from `platform`, keeping values the user
    /// already set.
    pub fn seed_options(&mut self, platform: &dyn ExportPlatform) {
        for option in platform.export_options() {
            self.options.entry(option.name).or_insert(option.default);
        }
    }

    /// Sanity-check the encryption configuration. Directory-only encryption
    /// is representable in preset files but useless; the caller surfaces
    /// this as a warning rather than refusing to load.
    pub fn validate_encryption(&self) -> Option<String> {
        if self.enc_directory && !self.enc_pck {
            return Some(
                "encrypt_directory is set without encrypt_pck; the directory will not be encrypted"
                    .to_owned(),
            );
        }
        None
    }
}

const STORE_SECTION_PREFIX: &str = "preset.";
const SAVE_DEBOUNCE: Duration = Duration::from_millis(800);

/// Owns the preset list and its on-disk form at `export_presets.cfg`.
///
/// Rapid edits are coalesced: mutations call [`PresetStore::mark_dirty`],
/// and [`PresetStore::flush_if_due`] writes only once the debounce window
/// has passed without further edits.
pub struct PresetStore {
    path: PathBuf,
    pub presets: Vec<ExportPreset>,
    dirty_since: Option<Instant>,
    block_save: bool,
}

impl PresetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            presets: Vec::new(),
            dirty_since: None,
            block_save: false,
        }
    }

    /// Load presets, seeding options from the matching platform. Presets
    /// with an unknown platform or a malformed `export_filter` are skipped
    /// with a log line; the rest still load.
    pub fn load(
        path: impl Into<PathBuf>,
        platforms: &[&dyn ExportPlatform],
        project: &Project,
    ) -> Result<Self> {
        let mut store = Self::new(path);
        if !store.path.exists() {
            return Ok(store);
        }
        let config = ConfigFile::load(&store.path)?;

        store.block_save = true;
        let mut index = 0;
        loop {
            let section = format!("{STORE_SECTION_PREFIX}{index}");
            if !config.has_section(&section) {
                break;
            }
            match Self::read_preset(&config, &section, platforms, project) {
                Ok(preset) => store.presets.push(preset),
                Err(err) => {
                    tracing::error!("skipping preset {index}: {err}");
                }
            }
            index += 1;
        }
        store.block_save = false;
        Ok(store)
    }

    fn read_preset(
        config: &ConfigFile,
        section: &str,
        platforms: &[&dyn ExportPlatform],
        project: &Project,
    ) -> Result<ExportPreset> {
        let get_str = |key: &str| {
            config
                .get(section, key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned()
        };
        let get_bool =
            |key: &str| config.get(section, key).and_then(Value::as_bool).unwrap_or(false);

        let platform_name = get_str("platform");
        let platform = platforms
            .iter()
            .find(|p| p.name() == platform_name)
            .ok_or_else(|| ExportError::Config(format!("unknown platform '{platform_name}'")))?;

        let filter_str = get_str("export_filter");
        let export_filter = ExportFilter::from_config_str(&filter_str)
            .ok_or_else(|| ExportError::Config(format!("unknown export_filter '{filter_str}'")))?;

        let mut preset = ExportPreset::for_platform(get_str("name"), *platform);
        preset.runnable = get_bool("runnable");
        preset.export_filter = export_filter;
        preset.custom_features = get_str("custom_features");
        preset.include_filter = get_str("include_filter");
        preset.exclude_filter = get_str("exclude_filter");
        preset.export_path = get_str("export_path");
        preset.enc_pck = get_bool("encrypt_pck");
        preset.enc_directory = get_bool("encrypt_directory");
        preset.enc_in_filter = get_str("encryption_include_filters");
        preset.enc_ex_filter = get_str("encryption_exclude_filters");
        preset.script_export_mode = config
            .get(section, "script_export_mode")
            .and_then(Value::as_int)
            .unwrap_or(0);
        preset.script_encryption_key = get_str("script_encryption_key");

        if export_filter.saves_files() {
            if let Some(files) = config.get(section, "export_files").and_then(Value::as_list) {
                for file in files {
                    if project.file_exists(file) {
                        preset.selected_files.insert(file.clone());
                    }
                }
            }
        }

        let options_section = format!("{section}.options");
        for (key, value) in config.section_entries(&options_section) {
            preset.options.insert(key.to_owned(), value.clone());
        }

        Ok(preset)
    }

    pub fn save_now(&mut self) -> Result<()> {
        let mut config = ConfigFile::new();
        for (i, preset) in self.presets.iter().enumerate() {
            let section = format!("{STORE_SECTION_PREFIX}{i}");
            config.set(&section, "name", Value::from(preset.name.clone()));
            config.set(&section, "platform", Value::from(preset.platform.clone()));
            config.set(&section, "runnable", Value::from(preset.runnable));
            config.set(
                &section,
                "custom_features",
                Value::from(preset.custom_features.clone()),
            );
            config.set(
                &section,
                "export_filter",
                Value::from(preset.export_filter.as_config_str()),
            );
            if preset.export_filter.saves_files() {
                config.set(
                    &section,
                    "export_files",
                    Value::List(preset.selected_files.iter().cloned().collect()),
                );
            }
            config.set(
                &section,
                "include_filter",
                Value::from(preset.include_filter.clone()),
            );
            config.set(
                &section,
                "exclude_filter",
                Value::from(preset.exclude_filter.clone()),
            );
            config.set(
                &section,
                "export_path",
                Value::from(preset.export_path.clone()),
            );
            config.set(
                &section,
                "encryption_include_filters",
                Value::from(preset.enc_in_filter.clone()),
            );
            config.set(
                &section,
                "encryption_exclude_filters",
                Value::from(preset.enc_ex_filter.clone()),
            );
            config.set(&section, "encrypt_pck", Value::from(preset.enc_pck));
            config.set(
                &section,
                "encrypt_directory",
                Value::from(preset.enc_directory),
            );
            config.set(
                &section,
                "script_export_mode",
                Value::from(preset.script_export_mode),
            );
            config.set(
                &section,
                "script_encryption_key",
                Value::from(preset.script_encryption_key.clone()),
            );

            let options_section = format!("{section}.options");
            for (key, value) in &preset.options {
                config.set(&options_section, key, value.clone());
            }
        }
        config
            .save(&self.path)
            .map_err(|e| ExportError::io(self.path.clone(), e))?;
        self.dirty_since = None;
        Ok(())
    }

    /// Record an edit; the actual write happens in [`Self::flush_if_due`].
    pub fn mark_dirty(&mut self) {
        if !self.block_save {
            self.dirty_since = Some(Instant::now());
        }
    }

    /// Write the store if the debounce window has elapsed since the last
    /// edit. Returns whether a write happened.
    pub fn flush_if_due(&mut self) -> Result<bool> {
        match self.dirty_since {
            Some(at) if at.elapsed() >= SAVE_DEBOUNCE => {
                self.save_now()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Re-seed option defaults for presets whose platform updated its
    /// option declarations, keeping values the user already set.
    pub fn refresh_options(&mut self, platforms: &[&dyn ExportPlatform]) {
        let mut changed = false;
        for preset in &mut self.presets {
            if let Some(platform) = platforms
                .iter()
                .find(|p| p.name() == preset.platform && p.should_update_export_options())
            {
                preset.seed_options(*platform);
                changed = true;
            }
        }
        if changed {
            self.mark_dirty();
        }
    }
}
