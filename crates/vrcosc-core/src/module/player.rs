//! Snapshot of the local player's avatar state, built from VRChat's
//! built-in input parameters.

use crate::osc::{OscValue, ValueType};

macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            #[default]
            $($variant = $value),+
        }

        impl $name {
            pub fn from_i32(value: i32) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

int_enum! {
    /// Mouth shape reported by VRChat's lip sync.
    pub enum Viseme {
        Sil = 0,
        PP = 1,
        FF = 2,
        TH = 3,
        DD = 4,
        KK = 5,
        CH = 6,
        SS = 7,
        NN = 8,
        RR = 9,
        AA = 10,
        E = 11,
        IH = 12,
        OH = 13,
        OU = 14,
    }
}

int_enum! {
    /// Hand gesture.
    pub enum Gesture {
        Neutral = 0,
        Fist = 1,
        HandOpen = 2,
        FingerPoint = 3,
        Victory = 4,
        RockNRoll = 5,
        HandGun = 6,
        ThumbsUp = 7,
    }
}

int_enum! {
    /// Which tracking devices drive the avatar.
    pub enum TrackingType {
        Uninitialised = 0,
        GenericRig = 1,
        HandsOnly = 2,
        HeadAndHands = 3,
        HeadHandsAndHip = 4,
        HeadHandsHipAndFeet = 5,
        FullBody = 6,
    }
}

/// VRChat's built-in input parameters, with the wire type each one carries.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VRChatInputParameter {
    Viseme,
    Voice,
    GestureLeft,
    GestureRight,
    GestureLeftWeight,
    GestureRightWeight,
    AngularY,
    VelocityX,
    VelocityY,
    VelocityZ,
    Upright,
    Grounded,
    Seated,
    AFK,
    TrackingType,
    VRMode,
    MuteSelf,
    InStation,
}

impl VRChatInputParameter {
    pub const ALL: [VRChatInputParameter; 18] = [
        VRChatInputParameter::Viseme,
        VRChatInputParameter::Voice,
        VRChatInputParameter::GestureLeft,
        VRChatInputParameter::GestureRight,
        VRChatInputParameter::GestureLeftWeight,
        VRChatInputParameter::GestureRightWeight,
        VRChatInputParameter::AngularY,
        VRChatInputParameter::VelocityX,
        VRChatInputParameter::VelocityY,
        VRChatInputParameter::VelocityZ,
        VRChatInputParameter::Upright,
        VRChatInputParameter::Grounded,
        VRChatInputParameter::Seated,
        VRChatInputParameter::AFK,
        VRChatInputParameter::TrackingType,
        VRChatInputParameter::VRMode,
        VRChatInputParameter::MuteSelf,
        VRChatInputParameter::InStation,
    ];

    /// Parameter name as it appears after `/avatar/parameters/`.
    pub fn name(self) -> &'static str {
        match self {
            VRChatInputParameter::Viseme => "Viseme",
            VRChatInputParameter::Voice => "Voice",
            VRChatInputParameter::GestureLeft => "GestureLeft",
            VRChatInputParameter::GestureRight => "GestureRight",
            VRChatInputParameter::GestureLeftWeight => "GestureLeftWeight",
            VRChatInputParameter::GestureRightWeight => "GestureRightWeight",
            VRChatInputParameter::AngularY => "AngularY",
            VRChatInputParameter::VelocityX => "VelocityX",
            VRChatInputParameter::VelocityY => "VelocityY",
            VRChatInputParameter::VelocityZ => "VelocityZ",
            VRChatInputParameter::Upright => "Upright",
            VRChatInputParameter::Grounded => "Grounded",
            VRChatInputParameter::Seated => "Seated",
            VRChatInputParameter::AFK => "AFK",
            VRChatInputParameter::TrackingType => "TrackingType",
            VRChatInputParameter::VRMode => "VRMode",
            VRChatInputParameter::MuteSelf => "MuteSelf",
            VRChatInputParameter::InStation => "InStation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn expected_type(self) -> ValueType {
        match self {
            VRChatInputParameter::Viseme
            | VRChatInputParameter::GestureLeft
            | VRChatInputParameter::GestureRight
            | VRChatInputParameter::TrackingType
            | VRChatInputParameter::VRMode => ValueType::Int,
            VRChatInputParameter::Voice
            | VRChatInputParameter::GestureLeftWeight
            | VRChatInputParameter::GestureRightWeight
            | VRChatInputParameter::AngularY
            | VRChatInputParameter::VelocityX
            | VRChatInputParameter::VelocityY
            | VRChatInputParameter::VelocityZ
            | VRChatInputParameter::Upright => ValueType::Float,
            VRChatInputParameter::Grounded
            | VRChatInputParameter::Seated
            | VRChatInputParameter::AFK
            | VRChatInputParameter::MuteSelf
            | VRChatInputParameter::InStation => ValueType::Bool,
        }
    }
}

/// Last known state of the local avatar.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Player {
    pub viseme: Viseme,
    pub voice: f32,
    pub gesture_left: Gesture,
    pub gesture_right: Gesture,
    pub gesture_left_weight: f32,
    pub gesture_right_weight: f32,
    pub angular_y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub velocity_z: f32,
    pub upright: f32,
    pub grounded: bool,
    pub seated: bool,
    pub afk: bool,
    pub tracking_type: TrackingType,
    pub is_vr: bool,
    pub is_muted: bool,
    pub in_station: bool,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Apply an inbound value for `parameter`.
    ///
    /// Returns `false` and leaves the snapshot untouched when the value has
    /// the wrong type or an out-of-range enum discriminant.
    pub fn apply(&mut self, parameter: VRChatInputParameter, value: &OscValue) -> bool {
        use VRChatInputParameter as P;

        if value.value_type() != parameter.expected_type() {
            return false;
        }

        match (parameter, value) {
            (P::Viseme, OscValue::Int(v)) => match Viseme::from_i32(*v) {
                Some(viseme) => self.viseme = viseme,
                None => return false,
            },
            (P::GestureLeft, OscValue::Int(v)) => match Gesture::from_i32(*v) {
                Some(gesture) => self.gesture_left = gesture,
                None => return false,
            },
            (P::GestureRight, OscValue::Int(v)) => match Gesture::from_i32(*v) {
                Some(gesture) => self.gesture_right = gesture,
                None => return false,
            },
            (P::TrackingType, OscValue::Int(v)) => match TrackingType::from_i32(*v) {
                Some(tracking) => self.tracking_type = tracking,
                None => return false,
            },
            (P::VRMode, OscValue::Int(v)) => self.is_vr = *v == 1,
            (P::Voice, OscValue::Float(v)) => self.voice = *v,
            (P::GestureLeftWeight, OscValue::Float(v)) => self.gesture_left_weight = *v,
            (P::GestureRightWeight, OscValue::Float(v)) => self.gesture_right_weight = *v,
            (P::AngularY, OscValue::Float(v)) => self.angular_y = *v,
            (P::VelocityX, OscValue::Float(v)) => self.velocity_x = *v,
            (P::VelocityY, OscValue::Float(v)) => self.velocity_y = *v,
            (P::VelocityZ, OscValue::Float(v)) => self.velocity_z = *v,
            (P::Upright, OscValue::Float(v)) => self.upright = *v,
            (P::Grounded, OscValue::Bool(v)) => self.grounded = *v,
            (P::Seated, OscValue::Bool(v)) => self.seated = *v,
            (P::AFK, OscValue::Bool(v)) => self.afk = *v,
            (P::MuteSelf, OscValue::Bool(v)) => self.is_muted = *v,
            (P::InStation, OscValue::Bool(v)) => self.in_station = *v,
            _ => return false,
        }
        true
    }
}
