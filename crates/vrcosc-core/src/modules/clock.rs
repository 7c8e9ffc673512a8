//! Sends the current time as normalised hours, minutes and seconds.

use crate::module::{
    Module, ModuleContext, ModuleSchema, ParameterMode, SettingEnum, VRC_OSC_DELTA_UPDATE,
};
use crate::osc::ValueType;
use chrono::{DateTime, Local, NaiveTime, Timelike, Utc};
use chrono_tz::{America, Europe, Tz};
use std::time::Duration;

pub const SMOOTH_SECOND: &str = "smoothsecond";
pub const SMOOTH_MINUTE: &str = "smoothminute";
pub const SMOOTH_HOUR: &str = "smoothhour";
pub const MODE: &str = "mode";
pub const TIMEZONE: &str = "timezone";

pub const HOURS: &str = "hours";
pub const MINUTES: &str = "minutes";
pub const SECONDS: &str = "seconds";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    #[default]
    Twelve,
    TwentyFour,
}

impl ClockMode {
    fn hours_per_turn(self) -> f32 {
        match self {
            ClockMode::Twelve => 12.0,
            ClockMode::TwentyFour => 24.0,
        }
    }
}

impl SettingEnum for ClockMode {
    const TYPE_NAME: &'static str = "vrcosc_core::modules::clock::ClockMode";
    const VARIANTS: &'static [Self] = &[ClockMode::Twelve, ClockMode::TwentyFour];

    fn to_i32(self) -> i32 {
        self as i32
    }

    fn name(self) -> &'static str {
        match self {
            ClockMode::Twelve => "Twelve",
            ClockMode::TwentyFour => "TwentyFour",
        }
    }
}

/// Time source. Named zones follow their daylight saving rules.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockTimeZone {
    #[default]
    Local,
    UTC,
    GMT,
    EST,
    CST,
    MNT,
    PST,
}

impl ClockTimeZone {
    /// The tz database zone, `None` for the system zone.
    pub fn tz(self) -> Option<Tz> {
        match self {
            ClockTimeZone::Local => None,
            ClockTimeZone::UTC => Some(Tz::UTC),
            ClockTimeZone::GMT => Some(Europe::London),
            ClockTimeZone::EST => Some(America::New_York),
            ClockTimeZone::CST => Some(America::Chicago),
            ClockTimeZone::MNT => Some(America::Denver),
            ClockTimeZone::PST => Some(America::Los_Angeles),
        }
    }

    /// Wall-clock time in this zone at `instant`.
    pub fn time_at(self, instant: DateTime<Utc>) -> NaiveTime {
        match self.tz() {
            Some(tz) => instant.with_timezone(&tz).time(),
            None => instant.with_timezone(&Local).time(),
        }
    }

    /// Current wall-clock time in this zone.
    pub fn now(self) -> NaiveTime {
        self.time_at(Utc::now())
    }
}

impl SettingEnum for ClockTimeZone {
    const TYPE_NAME: &'static str = "vrcosc_core::modules::clock::ClockTimeZone";
    const VARIANTS: &'static [Self] = &[
        ClockTimeZone::Local,
        ClockTimeZone::UTC,
        ClockTimeZone::GMT,
        ClockTimeZone::EST,
        ClockTimeZone::CST,
        ClockTimeZone::MNT,
        ClockTimeZone::PST,
    ];

    fn to_i32(self) -> i32 {
        self as i32
    }

    fn name(self) -> &'static str {
        match self {
            ClockTimeZone::Local => "Local",
            ClockTimeZone::UTC => "UTC",
            ClockTimeZone::GMT => "GMT",
            ClockTimeZone::EST => "EST",
            ClockTimeZone::CST => "CST",
            ClockTimeZone::MNT => "MNT",
            ClockTimeZone::PST => "PST",
        }
    }
}

/// Which hands move continuously instead of in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Smoothing {
    pub hour: bool,
    pub minute: bool,
    pub second: bool,
}

/// Normalised hand positions, each in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockHands {
    pub hours: f32,
    pub minutes: f32,
    pub seconds: f32,
}

impl ClockHands {
    pub fn at(time: NaiveTime, smoothing: Smoothing, mode: ClockMode) -> Self {
        // leap seconds report up to 1999ms
        let millis = (time.nanosecond() / 1_000_000).min(999);
        let smooth_seconds = time.second() as f32 + millis as f32 / 1000.0;
        let smooth_minutes = time.minute() as f32 + smooth_seconds / 60.0;
        let smooth_hours = time.hour() as f32 + smooth_minutes / 60.0;

        let hours = if smoothing.hour {
            smooth_hours
        } else {
            time.hour() as f32
        };
        let minutes = if smoothing.minute {
            smooth_minutes
        } else {
            time.minute() as f32
        };
        let seconds = if smoothing.second {
            smooth_seconds
        } else {
            time.second() as f32
        };

        let n = mode.hours_per_turn();
        Self {
            hours: (hours % n) / n,
            minutes: minutes / 60.0,
            seconds: seconds / 60.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ClockModule;

impl ClockModule {
    pub fn new() -> Self {
        Self
    }
}

impl Module for ClockModule {
    fn title(&self) -> &str {
        "Clock"
    }

    fn description(&self) -> &str {
        "Sends your local time as hours, minutes, and seconds"
    }

    fn author(&self) -> &str {
        "VolcanicArts"
    }

    fn create_attributes(&self, schema: &mut ModuleSchema) -> crate::Result<()> {
        schema.create_setting(
            SMOOTH_SECOND,
            "Smooth Second",
            "If the seconds value should be smoothed",
            false,
        )?;
        schema.create_setting(
            SMOOTH_MINUTE,
            "Smooth Minute",
            "If the minutes value should be smoothed",
            true,
        )?;
        schema.create_setting(
            SMOOTH_HOUR,
            "Smooth Hour",
            "If the hours value should be smoothed",
            true,
        )?;
        schema.create_enum_setting(
            MODE,
            "Mode",
            "If the clock should be in 12 hour or 24 hour",
            ClockMode::Twelve,
        )?;
        schema.create_enum_setting(
            TIMEZONE,
            "Timezone",
            "The timezone the clock should follow",
            ClockTimeZone::Local,
        )?;

        for (lookup, name, description) in [
            (HOURS, "Hours", "The current hour normalised"),
            (MINUTES, "Minutes", "The current minute normalised"),
            (SECONDS, "Seconds", "The current second normalised"),
        ] {
            schema.create_parameter(
                lookup,
                ParameterMode::Write,
                &format!("/avatar/parameters/VRCOSC/Clock/{}", name),
                description,
                ValueType::Float,
            )?;
        }
        Ok(())
    }

    fn update_interval(&self, ctx: &ModuleContext<'_>) -> Option<Duration> {
        let smooth_second = ctx.setting::<bool>(SMOOTH_SECOND).unwrap_or(false);
        Some(if smooth_second {
            VRC_OSC_DELTA_UPDATE
        } else {
            Duration::from_secs(1)
        })
    }

    fn on_update(&mut self, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        let smoothing = Smoothing {
            hour: ctx.setting(SMOOTH_HOUR)?,
            minute: ctx.setting(SMOOTH_MINUTE)?,
            second: ctx.setting(SMOOTH_SECOND)?,
        };
        let mode = ctx.setting_enum::<ClockMode>(MODE)?;
        let zone = ctx.setting_enum::<ClockTimeZone>(TIMEZONE)?;

        let hands = ClockHands::at(zone.now(), smoothing, mode);
        ctx.send_parameter(HOURS, hands.hours)?;
        ctx.send_parameter(MINUTES, hands.minutes)?;
        ctx.send_parameter(SECONDS, hands.seconds)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const STEPPED: Smoothing = Smoothing {
        hour: false,
        minute: false,
        second: false,
    };

    fn time(h: u32, m: u32, s: u32, ms: u32) -> NaiveTime {
        NaiveTime::from_hms_milli_opt(h, m, s, ms).unwrap()
    }

    #[test]
    fn test_stepped_twelve_hour() {
        let hands = ClockHands::at(time(18, 30, 15, 500), STEPPED, ClockMode::Twelve);
        assert_eq!(hands.hours, 0.5);
        assert_eq!(hands.minutes, 0.5);
        assert_eq!(hands.seconds, 0.25);
    }

    #[test]
    fn test_twenty_four_hour_mode() {
        let hands = ClockHands::at(time(18, 0, 0, 0), STEPPED, ClockMode::TwentyFour);
        assert_eq!(hands.hours, 0.75);
    }

    #[test]
    fn test_smoothing_includes_fractions() {
        let smooth = Smoothing {
            hour: true,
            minute: true,
            second: true,
        };
        let hands = ClockHands::at(time(6, 30, 30, 0), smooth, ClockMode::Twelve);
        assert!((hands.seconds - 0.5).abs() < 1e-6);
        assert!((hands.minutes - 30.5 / 60.0).abs() < 1e-6);
        assert!((hands.hours - (6.0 + 30.5 / 60.0) / 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_named_zones_observe_daylight_saving() {
        let summer = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();

        assert_eq!(ClockTimeZone::GMT.time_at(summer), time(13, 0, 0, 0));
        assert_eq!(ClockTimeZone::GMT.time_at(winter), time(12, 0, 0, 0));
        assert_eq!(ClockTimeZone::UTC.time_at(summer), time(12, 0, 0, 0));
        assert_eq!(ClockTimeZone::EST.time_at(summer), time(8, 0, 0, 0));
        assert_eq!(ClockTimeZone::EST.time_at(winter), time(7, 0, 0, 0));
        assert_eq!(ClockTimeZone::CST.time_at(summer), time(7, 0, 0, 0));
        assert_eq!(ClockTimeZone::MNT.time_at(summer), time(6, 0, 0, 0));
        assert_eq!(ClockTimeZone::PST.time_at(summer), time(5, 0, 0, 0));
        assert_eq!(ClockTimeZone::PST.time_at(winter), time(4, 0, 0, 0));
    }

    #[test]
    fn test_zone_discriminants_round_trip() {
        assert_eq!(ClockTimeZone::Local.tz(), None);
        for zone in ClockTimeZone::VARIANTS {
            assert_eq!(ClockTimeZone::from_i32(zone.to_i32()), Some(*zone));
        }
    }
}
