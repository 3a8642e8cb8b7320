use anyhow::Context;
use strata_core::settings::CompositeSettings;

const DOCUMENTATION: &str = r#"# Strata compositing settings. Rewritten whenever defaults are saved, so edits to this
# header and any comments below are lost. Missing keys fall back to their defaults.

# [compositing]
# dirty_waste_ratio: merge two dirty rects when their union wastes at most this fraction of area.
# max_dirty_rects: above this many rects, a dirty region collapses into its bounding box.
# chunk_size: side length, in pixels, of the tiles a refresh is split into.
# max_pass_pixels: largest area a single compositor pass may cover. Larger passes fail.
# undo_limit: number of undoable steps kept per image.

"#;

/// Per-user directory holding `strata.toml`.
#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    dirs::preference_dir().map(|base| base.join(env!("CARGO_PKG_NAME")))
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker threads for compositing scenes in parallel. Defaults to one per core.
    pub threads: Option<usize>,
    pub compositing: CompositeSettings,
    #[serde(skip)]
    failed_to_load: bool,
}
impl Settings {
    const FILENAME: &'static str = "strata.toml";
    /// Settings read once from the preferences directory, shared by every scene.
    /// Defaults when the file is missing or malformed.
    #[must_use]
    pub fn get() -> &'static Self {
        static SETTINGS: std::sync::OnceLock<Settings> = std::sync::OnceLock::new();

        SETTINGS.get_or_init(|| {
            preferences_dir().map_or_else(Self::no_path, |dir| {
                Self::load_or_default(&dir.join(Self::FILENAME))
            })
        })
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("no usable {}, compositing with defaults", Self::FILENAME);
        Self {
            failed_to_load: true,
            ..Self::default()
        }
    }
    #[must_use]
    fn load_or_default(path: &std::path::Path) -> Self {
        let settings: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(path)?;
            let settings: Self = toml::from_str(&string)?;
            Ok(settings)
        };
        match settings {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("couldn't read {}: {e:#}", path.display());
                Self::no_path()
            }
        }
    }
    /// Return true if loading user's settings failed.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    /// Write `strata.toml` into the preferences directory.
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = preferences_dir().context("no preferences directory on this system")?;
        self.save_in(&dir)
    }
    /// Write the settings file into `dir`, creating `dir` itself but none of its parents.
    fn save_in(&self, dir: &std::path::Path) -> anyhow::Result<()> {
        // An existing directory is fine, other failures surface when writing the file.
        let _ = std::fs::DirBuilder::new().create(dir);
        let path = dir.join(Self::FILENAME);
        let body = toml::ser::to_string_pretty(self)?;
        std::fs::write(&path, format!("{DOCUMENTATION}{body}"))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
