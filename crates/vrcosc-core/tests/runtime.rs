//! End-to-end behaviour of modules driven over loopback UDP.

use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use vrcosc_core::module::{AttributeType, ModuleContext, ModuleSchema, ParameterMode};
use vrcosc_core::modules::clock::{self, ClockMode, ClockModule, ClockTimeZone};
use vrcosc_core::osc::codec;
use vrcosc_core::{
    CancellationToken, FileStorage, MemoryStorage, Module, ModuleInstance, ModuleServices,
    ModuleState, OscClient, OscMessage, OscValue, SettingsStorage, VRChatInputParameter, ValueType,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct Journal {
    events: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

struct Recorder {
    journal: Arc<Journal>,
}

impl Module for Recorder {
    fn title(&self) -> &str {
        "Recorder"
    }

    fn create_attributes(&self, schema: &mut ModuleSchema) -> vrcosc_core::Result<()> {
        schema.create_list_setting(
            "names",
            "Names",
            "Names to greet",
            AttributeType::String,
            vec!["alice", "bob"],
            true,
        )?;
        schema.create_bounded_setting("volume", "Volume", "", 0.5f32, 0.0, 1.0)?;
        schema.create_parameter(
            "hours",
            ParameterMode::Write,
            "/avatar/parameters/VRCOSC/Clock/Hours",
            "",
            ValueType::Float,
        )?;
        schema.create_parameter("toggle", ParameterMode::Read, "Toggle", "", ValueType::Bool)?;
        Ok(())
    }

    fn on_player_state_update(
        &mut self,
        ctx: &ModuleContext<'_>,
        parameter: VRChatInputParameter,
    ) -> anyhow::Result<()> {
        let player = ctx.player();
        self.journal
            .push(format!("player {} {:?}", parameter.name(), player.viseme));
        Ok(())
    }

    fn on_bool_parameter_received(
        &mut self,
        _ctx: &ModuleContext<'_>,
        lookup: &str,
        value: bool,
    ) -> anyhow::Result<()> {
        self.journal.push(format!("bool {} {}", lookup, value));
        Ok(())
    }
}

fn receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .unwrap();
    socket
}

fn recv(socket: &UdpSocket) -> Option<OscMessage> {
    let mut buf = [0u8; 1536];
    let (len, _) = socket.recv_from(&mut buf).ok()?;
    Some(codec::decode(&buf[..len]).unwrap())
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// A started recorder whose client sends to `target` and receives on a
/// loopback port. Returns the address inbound datagrams should go to.
fn started_recorder(target: &UdpSocket) -> (ModuleInstance, Arc<Journal>, std::net::SocketAddr) {
    init_logging();
    let client = OscClient::new(target.local_addr().unwrap().to_string()).unwrap();
    let inbound = client.enable_receive("127.0.0.1:0").unwrap();
    let journal = Arc::new(Journal::default());
    let services = ModuleServices::noop().with_osc(client);

    let instance = ModuleInstance::initialise(
        Box::new(Recorder {
            journal: journal.clone(),
        }),
        services,
    )
    .unwrap();
    instance.set_enabled(true).unwrap();
    instance.start(&CancellationToken::new()).unwrap();
    (instance, journal, inbound)
}

fn send_to(addr: std::net::SocketAddr, address: &str, value: impl Into<OscValue>) {
    let bytes = codec::encode(&OscMessage::single(address, value).unwrap()).unwrap();
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .send_to(&bytes, addr)
        .unwrap();
}

#[test]
fn test_viseme_updates_player_once() {
    let target = receiver();
    let (instance, journal, inbound) = started_recorder(&target);

    send_to(inbound, "/avatar/parameters/Viseme", 3);
    assert!(wait_until(|| journal.count("player") == 1));
    assert_eq!(journal.events(), vec!["player Viseme TH".to_string()]);

    instance.stop().unwrap();
}

#[test]
fn test_wrong_typed_values_are_dropped() {
    let target = receiver();
    let (instance, journal, inbound) = started_recorder(&target);

    send_to(inbound, "/avatar/parameters/Viseme", 3.0f32);
    send_to(inbound, "/avatar/parameters/Toggle", 1);
    send_to(inbound, "/avatar/parameters/Toggle", true);
    assert!(wait_until(|| journal.count("bool") == 1));
    assert_eq!(journal.events(), vec!["bool toggle true".to_string()]);

    instance.stop().unwrap();
}

#[test]
fn test_nothing_is_dispatched_after_stop() {
    let target = receiver();
    let (instance, journal, inbound) = started_recorder(&target);
    instance.stop().unwrap();
    assert_eq!(instance.state(), ModuleState::Stopped);

    send_to(inbound, "/avatar/parameters/Viseme", 3);
    send_to(inbound, "/avatar/parameters/Toggle", true);
    thread::sleep(Duration::from_millis(300));
    assert!(journal.events().is_empty());
}

#[test]
fn test_send_parameter_reaches_vrchat_and_stops_with_module() {
    let target = receiver();
    let (instance, _, _) = started_recorder(&target);

    instance.send_parameter("hours", 0.5f32).unwrap();
    let message = recv(&target).unwrap();
    assert_eq!(message.address(), "/avatar/parameters/VRCOSC/Clock/Hours");
    assert_eq!(message.values(), &[OscValue::Float(0.5)]);

    instance.stop().unwrap();
    instance.send_parameter("hours", 0.75f32).unwrap();
    assert!(recv(&target).is_none());
}

#[test]
fn test_clock_sends_all_three_hands() {
    init_logging();
    let target = receiver();
    let client = OscClient::new(target.local_addr().unwrap().to_string()).unwrap();
    let instance =
        ModuleInstance::initialise(Box::new(ClockModule::new()), ModuleServices::noop().with_osc(client))
            .unwrap();
    instance.set_enabled(true).unwrap();
    instance.start(&CancellationToken::new()).unwrap();

    let addresses: Vec<String> = (0..3)
        .map(|_| {
            let message = recv(&target).unwrap();
            let value = message.first_value().as_float().unwrap();
            assert!((0.0..1.0).contains(&value), "{} out of range", value);
            message.address().to_string()
        })
        .collect();
    instance.stop().unwrap();

    assert_eq!(
        addresses,
        vec![
            "/avatar/parameters/VRCOSC/Clock/Hours",
            "/avatar/parameters/VRCOSC/Clock/Minutes",
            "/avatar/parameters/VRCOSC/Clock/Seconds",
        ]
    );
}

#[test]
fn test_settings_survive_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn SettingsStorage> = Arc::new(FileStorage::new(dir.path()));

    let first = ModuleInstance::initialise(
        Box::new(ClockModule::new()),
        ModuleServices::noop().with_storage(storage.clone()),
    )
    .unwrap();
    first.set_enabled(true).unwrap();
    first.set_setting(clock::SMOOTH_SECOND, true).unwrap();
    first
        .set_setting(clock::MODE, vrcosc_core::AttributeValue::enumeration(ClockMode::TwentyFour))
        .unwrap();
    first
        .set_setting(clock::TIMEZONE, vrcosc_core::AttributeValue::enumeration(ClockTimeZone::PST))
        .unwrap();
    assert!(dir.path().join("ClockModule.ini").exists());

    let second = ModuleInstance::initialise(
        Box::new(ClockModule::new()),
        ModuleServices::noop().with_storage(storage),
    )
    .unwrap();
    assert!(second.is_enabled());
    assert!(second.setting::<bool>(clock::SMOOTH_SECOND).unwrap());
    assert!(second.setting::<bool>(clock::SMOOTH_MINUTE).unwrap());
    second.with_settings(|s| {
        assert_eq!(s.get_enum::<ClockMode>(clock::MODE).unwrap(), ClockMode::TwentyFour);
        assert_eq!(
            s.get_enum::<ClockTimeZone>(clock::TIMEZONE).unwrap(),
            ClockTimeZone::PST
        );
    });
}

#[test]
fn test_unknown_and_stale_lines_do_not_break_loading() {
    init_logging();
    let storage = Arc::new(MemoryStorage::new());
    storage.insert(
        "Recorder.ini",
        "#InternalSettings\nenabled=True\n#End\n#Settings\nfoo:int=5\nnames:EMPTY=EMPTY\nvolume:float=2\n#End\n",
    );
    let journal = Arc::new(Journal::default());
    let instance = ModuleInstance::initialise(
        Box::new(Recorder { journal }),
        ModuleServices::noop().with_storage(storage.clone()),
    )
    .unwrap();

    assert!(instance.is_enabled());
    assert_eq!(
        instance.setting::<Vec<String>>("names").unwrap(),
        Vec::<String>::new()
    );
    // loaded values are clamped like any other write
    assert_eq!(instance.setting::<f32>("volume").unwrap(), 1.0);

    let rewritten = storage.get("Recorder.ini").unwrap();
    assert!(!rewritten.contains("foo:int"));
    assert!(rewritten.contains("names:EMPTY=EMPTY\n"));
    assert!(rewritten.contains("volume:float=1\n"));
}

#[test]
fn test_list_edits_are_persisted() {
    init_logging();
    let storage = Arc::new(MemoryStorage::new());
    let instance = ModuleInstance::initialise(
        Box::new(Recorder {
            journal: Arc::new(Journal::default()),
        }),
        ModuleServices::noop().with_storage(storage.clone()),
    )
    .unwrap();

    instance.push_list_item("names", "carol").unwrap();
    instance.remove_list_item("names", 0).unwrap();
    let saved = storage.get("Recorder.ini").unwrap();
    assert!(saved.contains("names#0:string=bob\nnames#1:string=carol\n"));

    instance.set_list("names", Vec::new()).unwrap();
    assert!(storage
        .get("Recorder.ini")
        .unwrap()
        .contains("names:EMPTY=EMPTY\n"));
}
