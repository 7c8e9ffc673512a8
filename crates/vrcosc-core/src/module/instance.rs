//! A module bound to its settings, parameters and services.

use super::attribute::{AttributeValue, EnumRegistry};
use super::context::ModuleContext;
use super::parameter::{ParameterMetadata, AVATAR_CHANGE_ADDRESS, AVATAR_PARAMETER_PREFIX};
use super::persistence::{self, LoadReport};
use super::player::{Player, VRChatInputParameter};
use super::schema::ModuleSchema;
use super::services::ModuleServices;
use super::settings::{FromSetting, Settings};
use super::{Module, ModuleState};
use crate::error::{Error, Result};
use crate::osc::{OscListener, OscMessage, OscValue};
use crate::timer::{CancellationToken, TimedTask};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

/// Handle to an initialised module. Cheap to clone.
#[derive(Clone)]
pub struct ModuleInstance {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) id: &'static str,
    pub(crate) title: String,
    description: String,
    author: String,
    pub(crate) chatbox_priority: i32,
    behaviour: Mutex<Box<dyn Module>>,
    state: RwLock<ModuleState>,
    settings: RwLock<Settings>,
    parameters: Vec<(String, ParameterMetadata)>,
    enums: EnumRegistry,
    player: RwLock<Player>,
    enabled: AtomicBool,
    pub(crate) services: ModuleServices,
    update_task: Mutex<Option<TimedTask>>,
}

impl ModuleInstance {
    /// Declare the module's attributes and load its persisted settings.
    ///
    /// A module without a settings file starts from its defaults, which are
    /// written out immediately.
    pub fn initialise(behaviour: Box<dyn Module>, services: ModuleServices) -> Result<Self> {
        let mut schema = ModuleSchema::new();
        behaviour.create_attributes(&mut schema)?;
        let (settings, parameters, enums) = schema.into_parts();

        let shared = Arc::new(Shared {
            id: behaviour.type_name(),
            title: behaviour.title().to_string(),
            description: behaviour.description().to_string(),
            author: behaviour.author().to_string(),
            chatbox_priority: behaviour.chatbox_priority(),
            behaviour: Mutex::new(behaviour),
            state: RwLock::new(ModuleState::Stopped),
            settings: RwLock::new(settings),
            parameters,
            enums,
            player: RwLock::new(Player::new()),
            enabled: AtomicBool::new(false),
            services,
            update_task: Mutex::new(None),
        });

        let instance = Self { shared };
        instance.load()?;
        Ok(instance)
    }

    /// Stable identifier, the module's type name.
    pub fn id(&self) -> &str {
        self.shared.id
    }

    /// Name of the settings file, `<id>.ini`.
    pub fn file_name(&self) -> String {
        self.shared.file_name()
    }

    /// Human readable title, used in log tags.
    pub fn title(&self) -> &str {
        &self.shared.title
    }

    pub fn description(&self) -> &str {
        &self.shared.description
    }

    pub fn author(&self) -> &str {
        &self.shared.author
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.shared.state()
    }

    /// Whether the module will start. Persisted with the settings.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Snapshot of the last known avatar state.
    pub fn player(&self) -> Player {
        self.shared.player()
    }

    /// Read access to the settings.
    pub fn with_settings<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        self.shared.with_settings(f)
    }

    /// Typed read of one setting.
    ///
    /// # Arguments
    /// * `lookup` - the key the setting was declared under
    ///
    /// # Returns
    /// `Error::UnknownSetting` for undeclared keys, `Error::SettingType` when
    /// `T` does not match the declared type.
    pub fn setting<T: FromSetting>(&self, lookup: &str) -> Result<T> {
        self.with_settings(|s| s.get::<T>(lookup))
    }

    /// Declared parameters in declaration order, keyed by lookup.
    pub fn parameters(&self) -> &[(String, ParameterMetadata)] {
        &self.shared.parameters
    }

    /// Metadata of one declared parameter.
    pub fn parameter(&self, lookup: &str) -> Option<&ParameterMetadata> {
        self.shared.parameter(lookup)
    }

    /// Start the module.
    ///
    /// Does nothing when the module is disabled or not stopped. If
    /// `on_start` fails the error is returned and the module stays
    /// `Starting` until [`ModuleInstance::stop`].
    pub fn start(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let shared = &self.shared;
        if !self.is_enabled() {
            return Ok(());
        }
        {
            let mut state = shared.state.write().expect("State lock poisoned");
            if *state != ModuleState::Stopped {
                return Ok(());
            }
            *state = ModuleState::Starting;
        }
        log::info!("[MODULE:{}] Starting", shared.title);

        shared.player.write().expect("Player lock poisoned").reset();

        let interval = {
            let ctx = ModuleContext::new(shared);
            let mut behaviour = shared.behaviour();
            if let Err(e) = behaviour.on_start(&ctx, cancel) {
                log::error!("[MODULE:{}] Failed to start: {:#}", shared.title, e);
                return Err(e);
            }
            behaviour.update_interval(&ctx)
        };

        if let Some(interval) = interval {
            let weak = Arc::downgrade(shared);
            let task = TimedTask::start(shared.id, interval, move || match weak.upgrade() {
                Some(shared) => shared.update(),
                None => Ok(()),
            })?;
            *shared.update_task.lock().expect("Update task lock poisoned") = Some(task);
        }

        shared.services.osc.register_listener(
            shared.id,
            Arc::new(ModuleListener {
                shared: Arc::downgrade(shared),
            }),
        );

        shared.set_state(ModuleState::Started);
        log::info!("[MODULE:{}] Started", shared.title);
        Ok(())
    }

    /// Stop the module.
    ///
    /// Does nothing when the module is disabled or already stopped. An error
    /// from `on_stop` is returned after the module has reached `Stopped`.
    pub fn stop(&self) -> anyhow::Result<()> {
        let shared = &self.shared;
        if !self.is_enabled() {
            return Ok(());
        }
        {
            let mut state = shared.state.write().expect("State lock poisoned");
            if *state == ModuleState::Stopped {
                return Ok(());
            }
            *state = ModuleState::Stopping;
        }
        log::info!("[MODULE:{}] Stopping", shared.title);

        shared.services.osc.deregister_listener(shared.id);

        let task = shared
            .update_task
            .lock()
            .expect("Update task lock poisoned")
            .take();
        if let Some(task) = task {
            task.stop();
        }

        let result = {
            let ctx = ModuleContext::new(shared);
            shared.behaviour().on_stop(&ctx)
        };
        if let Err(e) = &result {
            log::error!("[MODULE:{}] Failed to stop cleanly: {:#}", shared.title, e);
        }

        shared.player.write().expect("Player lock poisoned").reset();
        shared.set_state(ModuleState::Stopped);
        log::info!("[MODULE:{}] Stopped", shared.title);
        result
    }

    /// Route one inbound message through the module.
    pub fn dispatch(&self, message: &OscMessage) {
        self.shared.dispatch(message);
    }

    /// Send a value to a declared writable parameter.
    ///
    /// Silently does nothing while the module is stopped.
    pub fn send_parameter<V: Into<OscValue>>(&self, lookup: &str, value: V) -> Result<()> {
        self.shared.send_parameter(lookup, value.into())
    }

    /// Enable or disable the module and persist the flag.
    ///
    /// Disabling a running module stops it first. An `on_stop` error is
    /// returned once the flag has been stored and saved.
    pub fn set_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        let stopped = if !enabled && self.is_enabled() && self.state() != ModuleState::Stopped {
            self.stop()
        } else {
            Ok(())
        };
        {
            let settings = self.shared.settings.write().expect("Settings lock poisoned");
            self.shared.enabled.store(enabled, Ordering::SeqCst);
            self.shared.save(&settings)?;
        }
        stopped
    }

    /// Replace a scalar setting and save. Bounded values are clamped.
    pub fn set_setting<V: Into<AttributeValue>>(&self, lookup: &str, value: V) -> Result<()> {
        let value = value.into();
        self.shared
            .mutate(lookup, |attribute| attribute.set_value(value))
    }

    pub fn set_list(&self, lookup: &str, values: Vec<AttributeValue>) -> Result<()> {
        self.shared
            .mutate(lookup, |attribute| attribute.set_values(values))
    }

    pub fn set_list_item<V: Into<AttributeValue>>(
        &self,
        lookup: &str,
        index: usize,
        value: V,
    ) -> Result<()> {
        let value = value.into();
        self.shared
            .mutate(lookup, |attribute| attribute.set_value_at(index, value))
    }

    pub fn push_list_item<V: Into<AttributeValue>>(&self, lookup: &str, value: V) -> Result<()> {
        let value = value.into();
        self.shared
            .mutate(lookup, |attribute| attribute.push_value(value))
    }

    /// Remove and return one list element, then save.
    pub fn remove_list_item(&self, lookup: &str, index: usize) -> Result<AttributeValue> {
        self.shared
            .mutate(lookup, |attribute| attribute.remove_value(index))
    }

    pub fn reset_setting(&self, lookup: &str) -> Result<()> {
        self.shared.mutate(lookup, |attribute| {
            attribute.reset();
            Ok(())
        })
    }

    pub fn reset_all_settings(&self) -> Result<()> {
        let mut settings = self.shared.settings.write().expect("Settings lock poisoned");
        settings.reset_all();
        self.shared.save(&settings)
    }

    /// Run the button action of a setting. Returns false if it has none.
    pub fn press_button(&self, lookup: &str) -> Result<bool> {
        let attribute = self
            .with_settings(|s| s.attribute(lookup).cloned())
            .ok_or_else(|| Error::UnknownSetting(lookup.to_string()))?;
        Ok(attribute.press_button())
    }

    /// Re-read the settings file, applying whatever it contains.
    ///
    /// The file is saved again afterwards, dropping lines that no longer
    /// match a declared setting.
    pub fn load(&self) -> Result<LoadReport> {
        let shared = &self.shared;
        let name = shared.file_name();
        let mut settings = shared.settings.write().expect("Settings lock poisoned");

        let Some(contents) = shared.services.storage.read(&name)? else {
            log::debug!("[MODULE:{}] No saved settings, writing defaults", shared.title);
            shared.save(&settings)?;
            return Ok(LoadReport::default());
        };

        let report = persistence::deserialize(&contents, &mut settings, &shared.enums);
        if let Some(enabled) = report.enabled {
            shared.enabled.store(enabled, Ordering::SeqCst);
        }
        if report.skipped > 0 {
            log::warn!(
                "[MODULE:{}] Skipped {} unreadable setting line(s) in {}",
                shared.title,
                report.skipped,
                name
            );
        }
        // Rewrite so stale lines do not outlive the load.
        shared.save(&settings)?;
        Ok(report)
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn behaviour(&self) -> MutexGuard<'_, Box<dyn Module>> {
        // A panicking hook poisons the lock; the module itself stays usable.
        self.behaviour.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_name(&self) -> String {
        format!("{}.ini", self.id)
    }

    pub(crate) fn state(&self) -> ModuleState {
        *self.state.read().expect("State lock poisoned")
    }

    fn set_state(&self, state: ModuleState) {
        *self.state.write().expect("State lock poisoned") = state;
    }

    pub(crate) fn player(&self) -> Player {
        self.player.read().expect("Player lock poisoned").clone()
    }

    pub(crate) fn with_settings<R>(&self, f: impl FnOnce(&Settings) -> R) -> R {
        f(&self.settings.read().expect("Settings lock poisoned"))
    }

    fn parameter(&self, lookup: &str) -> Option<&ParameterMetadata> {
        self.parameters
            .iter()
            .find(|(key, _)| key == lookup)
            .map(|(_, meta)| meta)
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let contents = persistence::serialize(self.enabled.load(Ordering::SeqCst), settings);
        self.services.storage.write(&self.file_name(), &contents)
    }

    /// Apply `f` to one attribute and persist, holding the write lock throughout.
    fn mutate<R>(
        &self,
        lookup: &str,
        f: impl FnOnce(&mut super::attribute::ModuleAttribute) -> Result<R>,
    ) -> Result<R> {
        let mut settings = self.settings.write().expect("Settings lock poisoned");
        let attribute = settings
            .attribute_mut(lookup)
            .ok_or_else(|| Error::UnknownSetting(lookup.to_string()))?;
        let result = f(attribute)?;
        self.save(&settings)?;
        Ok(result)
    }

    pub(crate) fn send_parameter(&self, lookup: &str, value: OscValue) -> Result<()> {
        if self.state() == ModuleState::Stopped {
            return Ok(());
        }
        let meta = self
            .parameter(lookup)
            .ok_or_else(|| Error::UndeclaredParameter(lookup.to_string()))?;
        if !meta.mode().can_write() {
            return Err(Error::ReadOnlyParameter(lookup.to_string()));
        }
        self.services.osc.send_value(meta.address(), value)
    }

    fn update(&self) -> anyhow::Result<()> {
        let ctx = ModuleContext::new(self);
        self.behaviour().on_update(&ctx)
    }

    fn dispatch(&self, message: &OscMessage) {
        if !self.enabled.load(Ordering::SeqCst) || self.state() == ModuleState::Stopped {
            return;
        }

        let address = message.address();
        let ctx = ModuleContext::new(self);

        if address.starts_with(AVATAR_CHANGE_ADDRESS) {
            let result = self.behaviour().on_avatar_change(&ctx);
            self.report("on_avatar_change", result);
            return;
        }

        let Some(name) = address.strip_prefix(AVATAR_PARAMETER_PREFIX) else {
            return;
        };
        let value = message.first_value();

        if let Some(parameter) = VRChatInputParameter::from_name(name) {
            let applied = self
                .player
                .write()
                .expect("Player lock poisoned")
                .apply(parameter, value);
            if applied {
                let result = self.behaviour().on_player_state_update(&ctx, parameter);
                self.report("on_player_state_update", result);
            } else {
                log::debug!(
                    "[MODULE:{}] Ignoring {} value {:?}, expected {}",
                    self.title,
                    name,
                    value,
                    parameter.expected_type()
                );
            }
        }

        let Some((lookup, meta)) = self.parameters.iter().find(|(_, meta)| meta.name() == name)
        else {
            return;
        };
        if !meta.mode().can_read() {
            return;
        }
        if value.value_type() != meta.expected() {
            log::warn!(
                "[MODULE:{}] Received {} for parameter '{}' which expects {}",
                self.title,
                value.value_type(),
                lookup,
                meta.expected()
            );
            return;
        }

        let result = match value {
            OscValue::Bool(v) => self.behaviour().on_bool_parameter_received(&ctx, lookup, *v),
            OscValue::Int(v) => self.behaviour().on_int_parameter_received(&ctx, lookup, *v),
            OscValue::Float(v) => self.behaviour().on_float_parameter_received(&ctx, lookup, *v),
            OscValue::String(_) => Ok(()),
        };
        self.report("parameter callback", result);
    }

    fn report(&self, hook: &str, result: anyhow::Result<()>) {
        if let Err(e) = result {
            log::error!("[MODULE:{}] {} failed: {:#}", self.title, hook, e);
        }
    }
}

/// Registered with the OSC client while the module runs.
struct ModuleListener {
    shared: Weak<Shared>,
}

impl OscListener for ModuleListener {
    fn on_data_received(&self, message: &OscMessage) -> anyhow::Result<()> {
        if let Some(shared) = self.shared.upgrade() {
            shared.dispatch(message);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::parameter::ParameterMode;
    use crate::module::persistence::MemoryStorage;
    use crate::osc::ValueType;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        starts: AtomicUsize,
        stops: AtomicUsize,
        floats: AtomicUsize,
        player_updates: AtomicUsize,
    }

    struct Tracked {
        counters: Arc<Counters>,
        fail_start: bool,
        fail_stop: bool,
    }

    impl Module for Tracked {
        fn title(&self) -> &str {
            "Tracked"
        }

        fn create_attributes(&self, schema: &mut ModuleSchema) -> Result<()> {
            schema.create_setting("count", "Count", "", 1)?;
            schema.create_parameter("level", ParameterMode::ReadWrite, "Level", "", ValueType::Float)?;
            schema.create_parameter("input", ParameterMode::Read, "Input", "", ValueType::Bool)?;
            Ok(())
        }

        fn on_start(&mut self, _ctx: &ModuleContext<'_>, _cancel: &CancellationToken) -> anyhow::Result<()> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                anyhow::bail!("refusing to start");
            }
            Ok(())
        }

        fn on_stop(&mut self, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                anyhow::bail!("refusing to stop");
            }
            Ok(())
        }

        fn on_player_state_update(
            &mut self,
            _ctx: &ModuleContext<'_>,
            _parameter: VRChatInputParameter,
        ) -> anyhow::Result<()> {
            self.counters.player_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_float_parameter_received(
            &mut self,
            _ctx: &ModuleContext<'_>,
            lookup: &str,
            _value: f32,
        ) -> anyhow::Result<()> {
            assert_eq!(lookup, "level");
            self.counters.floats.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tracked(fail_start: bool) -> (ModuleInstance, Arc<Counters>, Arc<MemoryStorage>) {
        tracked_in(Arc::new(MemoryStorage::new()), fail_start, false)
    }

    fn tracked_in(
        storage: Arc<MemoryStorage>,
        fail_start: bool,
        fail_stop: bool,
    ) -> (ModuleInstance, Arc<Counters>, Arc<MemoryStorage>) {
        let counters = Arc::new(Counters::default());
        let services = ModuleServices::noop().with_storage(storage.clone());
        let instance = ModuleInstance::initialise(
            Box::new(Tracked {
                counters: counters.clone(),
                fail_start,
                fail_stop,
            }),
            services,
        )
        .unwrap();
        (instance, counters, storage)
    }

    fn message(address: &str, value: impl Into<OscValue>) -> OscMessage {
        OscMessage::single(address, value).unwrap()
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let (instance, _, storage) = tracked(false);
        assert_eq!(instance.file_name(), "Tracked.ini");
        assert_eq!(
            storage.get("Tracked.ini").as_deref(),
            Some("#InternalSettings\nenabled=False\n#End\n")
        );
    }

    #[test]
    fn test_disabled_module_does_not_start() {
        let (instance, counters, _) = tracked(false);
        instance.start(&CancellationToken::new()).unwrap();
        assert_eq!(instance.state(), ModuleState::Stopped);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_start_can_still_stop() {
        let (instance, counters, _) = tracked(true);
        instance.set_enabled(true).unwrap();
        assert!(instance.start(&CancellationToken::new()).is_err());
        assert_eq!(instance.state(), ModuleState::Starting);

        instance.stop().unwrap();
        assert_eq!(instance.state(), ModuleState::Stopped);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_start_twice_runs_hook_once() {
        let (instance, counters, _) = tracked(false);
        instance.set_enabled(true).unwrap();
        instance.start(&CancellationToken::new()).unwrap();
        instance.start(&CancellationToken::new()).unwrap();
        assert_eq!(instance.state(), ModuleState::Started);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        instance.stop().unwrap();
        instance.stop().unwrap();
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_routes_by_table() {
        let (instance, counters, _) = tracked(false);
        instance.set_enabled(true).unwrap();
        instance.start(&CancellationToken::new()).unwrap();

        instance.dispatch(&message("/avatar/parameters/Viseme", 3));
        instance.dispatch(&message("/avatar/parameters/Level", 0.5f32));
        instance.dispatch(&message("/avatar/parameters/Level", 1));
        instance.dispatch(&message("/avatar/parameters/Unknown", 1));
        instance.dispatch(&message("/other/Level", 0.5f32));

        assert_eq!(counters.player_updates.load(Ordering::SeqCst), 1);
        assert_eq!(counters.floats.load(Ordering::SeqCst), 1);
        assert_eq!(instance.player().viseme, crate::module::Viseme::TH);
    }

    #[test]
    fn test_send_parameter_checks_declaration_and_mode() {
        let (instance, _, _) = tracked(false);
        instance.set_enabled(true).unwrap();

        // stopped: silently ignored, even for undeclared keys
        instance.send_parameter("missing", 1).unwrap();

        instance.start(&CancellationToken::new()).unwrap();
        instance.send_parameter("level", 0.25f32).unwrap();
        assert!(matches!(
            instance.send_parameter("missing", 1),
            Err(Error::UndeclaredParameter(_))
        ));
        assert!(matches!(
            instance.send_parameter("input", true),
            Err(Error::ReadOnlyParameter(_))
        ));
    }

    #[test]
    fn test_mutations_are_saved() {
        let (instance, _, storage) = tracked(false);
        instance.set_setting("count", 4).unwrap();
        assert!(storage.get("Tracked.ini").unwrap().contains("count:int=4\n"));

        assert!(matches!(
            instance.set_setting("count", "four"),
            Err(Error::SettingType { .. })
        ));
        instance.reset_setting("count").unwrap();
        assert!(!storage.get("Tracked.ini").unwrap().contains("#Settings"));
    }

    #[test]
    fn test_disabling_a_running_module_stops_it() {
        let (instance, counters, storage) = tracked(false);
        instance.set_enabled(true).unwrap();
        instance.start(&CancellationToken::new()).unwrap();
        instance.set_enabled(false).unwrap();
        assert_eq!(instance.state(), ModuleState::Stopped);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert!(storage.get("Tracked.ini").unwrap().contains("enabled=False"));
    }

    #[test]
    fn test_disable_reports_stop_failure_after_saving() {
        let (instance, counters, storage) =
            tracked_in(Arc::new(MemoryStorage::new()), false, true);
        instance.set_enabled(true).unwrap();
        instance.start(&CancellationToken::new()).unwrap();

        assert!(instance.set_enabled(false).is_err());
        assert!(!instance.is_enabled());
        assert_eq!(instance.state(), ModuleState::Stopped);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
        assert!(storage.get("Tracked.ini").unwrap().contains("enabled=False"));
    }

    #[test]
    fn test_load_rewrites_stale_lines() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            "Tracked.ini",
            "#InternalSettings\nenabled=True\n#End\n#Settings\nold:int=5\ncount:int=3\n#End\n",
        );
        let (instance, _, storage) = tracked_in(storage, false, false);

        assert!(instance.is_enabled());
        assert_eq!(instance.setting::<i32>("count").unwrap(), 3);
        assert_eq!(
            storage.get("Tracked.ini").as_deref(),
            Some("#InternalSettings\nenabled=True\n#End\n#Settings\ncount:int=3\n#End\n")
        );
    }
}
