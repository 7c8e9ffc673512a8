//! Settings persistence.
//!
//! Each module is stored in its own line-oriented text file:
//!
//! ```text
//! #InternalSettings
//! enabled=True
//! #End
//! #Settings
//! smoothsecond:bool=True
//! mode:enum=vrcosc_core::modules::clock::ClockMode#1
//! names#0:string=first
//! names#1:string=second
//! ids:EMPTY=EMPTY
//! #End
//! ```
//!
//! The `#Settings` section only lists attributes that differ from their
//! defaults. Loading is tolerant: unknown lookups, stale type tags and
//! unparsable values are skipped so older and newer files keep working.

use super::attribute::{AttributeType, AttributeValue, EnumRegistry};
use super::settings::Settings;
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const INTERNAL_SETTINGS_MARKER: &str = "#InternalSettings";
pub const SETTINGS_MARKER: &str = "#Settings";
pub const END_MARKER: &str = "#End";
pub const EMPTY_MARKER: &str = "EMPTY";

const ENABLED_KEY: &str = "enabled";

/// Named text storage for module files.
pub trait SettingsStorage: Send + Sync {
    /// Read a file, `Ok(None)` if it does not exist.
    fn read(&self, name: &str) -> Result<Option<String>>;

    /// Create or replace a file.
    fn write(&self, name: &str, contents: &str) -> Result<()>;
}

/// Stores module files in a directory, replacing them atomically.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Directory the settings files live in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the file `name`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl SettingsStorage for FileStorage {
    fn read(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(name);
        let tmp = self.root.join(format!("{}.tmp", name));
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory storage, for tests and hosts without a disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file before modules load it.
    pub fn insert<N: Into<String>, C: Into<String>>(&self, name: N, contents: C) {
        self.files
            .write()
            .expect("Storage lock poisoned")
            .insert(name.into(), contents.into());
    }

    /// Current contents of `name`, if it was ever written.
    pub fn get(&self, name: &str) -> Option<String> {
        self.files.read().expect("Storage lock poisoned").get(name).cloned()
    }
}

impl SettingsStorage for MemoryStorage {
    fn read(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get(name))
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        self.insert(name, contents);
        Ok(())
    }
}

/// What a load applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// The persisted enabled flag, if present.
    pub enabled: Option<bool>,
    /// Setting lines applied.
    pub applied: usize,
    /// Setting lines skipped as unknown, stale or malformed.
    pub skipped: usize,
}

/// Render a module file.
pub fn serialize(enabled: bool, settings: &Settings) -> String {
    let mut out = String::new();
    out.push_str(INTERNAL_SETTINGS_MARKER);
    out.push('\n');
    out.push_str(&format!("{}={}\n", ENABLED_KEY, format_bool(enabled)));
    out.push_str(END_MARKER);
    out.push('\n');

    if settings.all_default() {
        return out;
    }

    out.push_str(SETTINGS_MARKER);
    out.push('\n');
    for (lookup, attribute) in settings.iter() {
        if attribute.is_default() {
            continue;
        }
        if let Some(values) = attribute.values() {
            if values.is_empty() {
                out.push_str(&format!("{}:{}={}\n", lookup, EMPTY_MARKER, EMPTY_MARKER));
            }
            for (index, value) in values.iter().enumerate() {
                out.push_str(&format!(
                    "{}#{}:{}={}\n",
                    lookup,
                    index,
                    value.attribute_type().tag(),
                    format_value(value)
                ));
            }
        } else if let Some(value) = attribute.value() {
            out.push_str(&format!(
                "{}:{}={}\n",
                lookup,
                value.attribute_type().tag(),
                format_value(value)
            ));
        }
    }
    out.push_str(END_MARKER);
    out.push('\n');
    out
}

/// Apply a module file to `settings`.
pub fn deserialize(contents: &str, settings: &mut Settings, enums: &EnumRegistry) -> LoadReport {
    let mut report = LoadReport::default();
    let mut lines = contents.lines();

    while let Some(line) = lines.next() {
        match line.trim_end() {
            INTERNAL_SETTINGS_MARKER => load_internal(&mut lines, &mut report),
            SETTINGS_MARKER => load_settings(&mut lines, settings, enums, &mut report),
            _ => {}
        }
    }
    report
}

fn load_internal<'a, I: Iterator<Item = &'a str>>(lines: &mut I, report: &mut LoadReport) {
    for line in lines.by_ref() {
        let line = line.trim_end();
        if line == END_MARKER {
            break;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key == ENABLED_KEY {
            match parse_bool(value) {
                Some(enabled) => report.enabled = Some(enabled),
                None => log::warn!("[SETTINGS] Ignoring malformed enabled flag '{}'", value),
            }
        }
    }
}

fn load_settings<'a, I: Iterator<Item = &'a str>>(
    lines: &mut I,
    settings: &mut Settings,
    enums: &EnumRegistry,
    report: &mut LoadReport,
) {
    // List elements are gathered per lookup and applied once the section ends.
    let mut lists: BTreeMap<String, BTreeMap<usize, AttributeValue>> = BTreeMap::new();

    for line in lines.by_ref() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line == END_MARKER {
            break;
        }
        if apply_line(line, settings, enums, &mut lists) {
            report.applied += 1;
        } else {
            report.skipped += 1;
        }
    }

    for (lookup, elements) in lists {
        let Some(attribute) = settings.attribute_mut(&lookup) else {
            continue;
        };
        if let Err(e) = attribute.set_values(elements.into_values().collect()) {
            log::warn!("[SETTINGS] Could not restore list '{}': {}", lookup, e);
        }
    }
}

/// Apply one `lookup[#index]:type=value` line. Returns false if skipped.
fn apply_line(
    line: &str,
    settings: &mut Settings,
    enums: &EnumRegistry,
    lists: &mut BTreeMap<String, BTreeMap<usize, AttributeValue>>,
) -> bool {
    let Some((lookup_type, value)) = line.split_once('=') else {
        log::debug!("[SETTINGS] Skipping malformed line '{}'", line);
        return false;
    };
    let Some((lookup_full, type_tag)) = lookup_type.split_once(':') else {
        log::debug!("[SETTINGS] Skipping malformed line '{}'", line);
        return false;
    };
    let (lookup, index) = match lookup_full.split_once('#') {
        Some((lookup, index)) => (lookup, Some(index)),
        None => (lookup_full, None),
    };

    let Some(attribute) = settings.attribute_mut(lookup) else {
        log::debug!("[SETTINGS] Skipping unknown setting '{}'", lookup);
        return false;
    };

    if attribute.is_list() {
        // `key:EMPTY=EMPTY`; a string element may hold the text EMPTY itself
        if type_tag == EMPTY_MARKER && index.is_none() {
            if !attribute.can_be_empty() {
                return false;
            }
            lists.remove(lookup);
            return attribute.set_values(Vec::new()).is_ok();
        }
        if type_tag != attribute.attribute_type().tag() {
            return false;
        }
        let Some(index) = index.and_then(|i| i.parse::<usize>().ok()) else {
            return false;
        };
        let Some(parsed) = parse_value(attribute.attribute_type(), value, enums) else {
            return false;
        };
        lists
            .entry(lookup.to_string())
            .or_default()
            .insert(index, parsed);
        return true;
    }

    let Some(current) = attribute.value() else {
        return false;
    };
    if type_tag != current.attribute_type().tag() {
        log::debug!(
            "[SETTINGS] Skipping '{}': stored as {} but declared {}",
            lookup,
            type_tag,
            current.attribute_type()
        );
        return false;
    }
    let Some(parsed) = parse_value(current.attribute_type(), value, enums) else {
        log::warn!("[SETTINGS] Could not parse '{}' for setting '{}'", value, lookup);
        return false;
    };
    if !current.same_type(&parsed) {
        return false;
    }
    attribute.set_value(parsed).is_ok()
}

fn parse_value(ty: AttributeType, text: &str, enums: &EnumRegistry) -> Option<AttributeValue> {
    match ty {
        AttributeType::String => Some(AttributeValue::String(text.to_string())),
        AttributeType::Int => text.parse().ok().map(AttributeValue::Int),
        AttributeType::Float => text.parse().ok().map(AttributeValue::Float),
        AttributeType::Bool => parse_bool(text).map(AttributeValue::Bool),
        AttributeType::Enum => {
            let (type_name, value) = text.rsplit_once('#')?;
            let value = value.parse().ok()?;
            enums.decode(type_name, value).map(AttributeValue::Enum)
        }
    }
}

fn format_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Bool(v) => format_bool(*v).to_string(),
        other => other.to_string(),
    }
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::attribute::{AttributeMetadata, ModuleAttribute, SettingEnum};

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Mode {
        Twelve,
        TwentyFour,
    }

    impl SettingEnum for Mode {
        const TYPE_NAME: &'static str = "tests::Mode";
        const VARIANTS: &'static [Self] = &[Mode::Twelve, Mode::TwentyFour];

        fn to_i32(self) -> i32 {
            self as i32
        }

        fn name(self) -> &'static str {
            match self {
                Mode::Twelve => "12 hour",
                Mode::TwentyFour => "24 hour",
            }
        }
    }

    fn meta(name: &str) -> AttributeMetadata {
        AttributeMetadata::new(name, "")
    }

    fn schema() -> (Settings, EnumRegistry) {
        let mut settings = Settings::new();
        settings
            .insert("smooth", ModuleAttribute::single(meta("Smooth"), false.into()))
            .unwrap();
        settings
            .insert("count", ModuleAttribute::single(meta("Count"), 3.into()))
            .unwrap();
        settings
            .insert("scale", ModuleAttribute::single(meta("Scale"), 1.5f32.into()))
            .unwrap();
        settings
            .insert("id", ModuleAttribute::single(meta("Id"), "".into()))
            .unwrap();
        settings
            .insert(
                "mode",
                ModuleAttribute::single(meta("Mode"), AttributeValue::enumeration(Mode::Twelve)),
            )
            .unwrap();
        settings
            .insert(
                "names",
                ModuleAttribute::list(
                    meta("Names"),
                    vec!["a".into()],
                    AttributeType::String,
                    true,
                )
                .unwrap(),
            )
            .unwrap();
        settings
            .insert(
                "ids",
                ModuleAttribute::list(meta("Ids"), vec![1.into(), 2.into()], AttributeType::Int, false)
                    .unwrap(),
            )
            .unwrap();
        let mut enums = EnumRegistry::new();
        enums.register::<Mode>();
        (settings, enums)
    }

    fn set(settings: &mut Settings, lookup: &str, value: AttributeValue) {
        settings.attribute_mut(lookup).unwrap().set_value(value).unwrap();
    }

    #[test]
    fn test_all_default_writes_internal_section_only() {
        let (settings, _) = schema();
        assert_eq!(serialize(true, &settings), "#InternalSettings\nenabled=True\n#End\n");
    }

    #[test]
    fn test_only_changed_values_are_written() {
        let (mut settings, _) = schema();
        set(&mut settings, "smooth", true.into());
        set(&mut settings, "mode", AttributeValue::enumeration(Mode::TwentyFour));

        let text = serialize(false, &settings);
        assert_eq!(
            text,
            "#InternalSettings\nenabled=False\n#End\n#Settings\nsmooth:bool=True\nmode:enum=tests::Mode#1\n#End\n"
        );
    }

    #[test]
    fn test_save_load_recovers_non_default_values() {
        let (mut original, _) = schema();
        set(&mut original, "smooth", true.into());
        set(&mut original, "count", 7.into());
        set(&mut original, "scale", 0.125f32.into());
        set(&mut original, "id", "abc=def:g#h".into());
        set(&mut original, "mode", AttributeValue::enumeration(Mode::TwentyFour));
        original
            .attribute_mut("names")
            .unwrap()
            .set_values(vec!["x".into(), "y".into(), "z".into()])
            .unwrap();
        let text = serialize(true, &original);

        let (mut loaded, enums) = schema();
        let report = deserialize(&text, &mut loaded, &enums);
        assert_eq!(report.enabled, Some(true));
        assert_eq!(report.skipped, 0);
        for (lookup, attribute) in original.iter() {
            let other = loaded.attribute(lookup).unwrap();
            assert_eq!(attribute.value(), other.value(), "{}", lookup);
            assert_eq!(attribute.values(), other.values(), "{}", lookup);
        }
        assert!(loaded.attribute("ids").unwrap().is_default());
    }

    #[test]
    fn test_empty_list_round_trip_and_loading_continues() {
        let (mut original, _) = schema();
        original.attribute_mut("names").unwrap().set_values(Vec::new()).unwrap();
        set(&mut original, "count", 9.into());
        let text = serialize(true, &original);
        assert!(text.contains("names:EMPTY=EMPTY\n"));

        let (mut loaded, enums) = schema();
        deserialize(&text, &mut loaded, &enums);
        assert_eq!(loaded.get::<Vec<String>>("names").unwrap(), Vec::<String>::new());
        assert_eq!(loaded.get::<i32>("count").unwrap(), 9);
    }

    #[test]
    fn test_string_element_spelled_empty_is_kept() {
        let (mut original, _) = schema();
        original
            .attribute_mut("names")
            .unwrap()
            .set_values(vec!["x".into(), "EMPTY".into(), "y".into()])
            .unwrap();
        let text = serialize(true, &original);
        assert!(text.contains("names#1:string=EMPTY\n"));

        let (mut loaded, enums) = schema();
        let report = deserialize(&text, &mut loaded, &enums);
        assert_eq!(report.skipped, 0);
        assert_eq!(
            loaded.get::<Vec<String>>("names").unwrap(),
            vec!["x", "EMPTY", "y"]
        );
    }

    #[test]
    fn test_line_breaks_cannot_end_the_section_early() {
        let (mut original, _) = schema();
        let id = original.attribute_mut("id").unwrap();
        assert!(id.set_value("line1\n#End".into()).is_err());
        set(&mut original, "count", 7.into());
        let text = serialize(true, &original);

        let (mut loaded, enums) = schema();
        deserialize(&text, &mut loaded, &enums);
        assert_eq!(loaded.get::<i32>("count").unwrap(), 7);
        assert_eq!(loaded.get::<String>("id").unwrap(), "");
    }

    #[test]
    fn test_unknown_lookup_is_skipped() {
        let (mut settings, enums) = schema();
        let text = "#InternalSettings\nenabled=True\n#End\n#Settings\nfoo:int=5\n#End\n";
        let report = deserialize(text, &mut settings, &enums);
        assert_eq!(report.skipped, 1);
        assert!(settings.all_default());
    }

    #[test]
    fn test_stale_and_malformed_lines_are_skipped() {
        let (mut settings, enums) = schema();
        let text = "#Settings\n\
                    count:float=2.5\n\
                    smooth:bool=maybe\n\
                    mode:enum=other::Enum#1\n\
                    mode:enum=tests::Mode#7\n\
                    ids:EMPTY=EMPTY\n\
                    no separators here\n\
                    scale:float=0.5\n\
                    #End\n";
        let report = deserialize(text, &mut settings, &enums);
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 6);
        assert_eq!(settings.get::<f32>("scale").unwrap(), 0.5);
        assert_eq!(settings.get::<Vec<i32>>("ids").unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_list_elements_are_ordered_by_index() {
        let (mut settings, enums) = schema();
        let text = "#Settings\nids#2:int=30\nids#0:int=10\nids#1:int=20\n#End\n";
        deserialize(text, &mut settings, &enums);
        assert_eq!(settings.get::<Vec<i32>>("ids").unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_bool_parsing_is_case_insensitive() {
        let (mut settings, enums) = schema();
        let report = deserialize(
            "#InternalSettings\nenabled=false\n#End\n#Settings\nsmooth:bool=true\n#End\n",
            &mut settings,
            &enums,
        );
        assert_eq!(report.enabled, Some(false));
        assert!(settings.get::<bool>("smooth").unwrap());
    }

    #[test]
    fn test_file_storage_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("modules"));
        assert_eq!(storage.read("ClockModule.ini").unwrap(), None);

        storage.write("ClockModule.ini", "first").unwrap();
        storage.write("ClockModule.ini", "second").unwrap();
        assert_eq!(
            storage.read("ClockModule.ini").unwrap().as_deref(),
            Some("second")
        );
        assert!(!storage.path_for("ClockModule.ini.tmp").exists());
    }
}
