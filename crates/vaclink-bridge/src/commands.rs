//! Named command catalog.
//!
//! The robot speaks in numeric `infoType` codes with free-form JSON
//! payloads. This module pins down the known codes and provides builders
//! for the device's capabilities, so callers (entity glue, CLIs) work with
//! names instead of magic numbers. Each builder returns a [`Command`] tuple
//! consumable by [`VacBridge::send`](crate::VacBridge::send).

use serde_json::{json, Value};

/// A ready-to-send command: numeric code plus payload.
pub type Command = (u32, Value);

/// Start/resume a cleaning cycle.
pub const CMD_CLEAN: u32 = 21005;
/// Dock control (`start` returns to base, `stop` aborts the return).
pub const CMD_DOCK: u32 = 21012;
/// Pause the current cycle.
pub const CMD_PAUSE: u32 = 21017;
/// Remote-control codes (locate beep, manual drive).
pub const CMD_CTRL: u32 = 21020;
/// Suction / fan speed.
pub const CMD_FAN_SPEED: u32 = 21022;
/// Device settings (LED, volume, carpet boost, wall-follow, reboot).
pub const CMD_SETTING: u32 = 21024;

/// Suction levels accepted by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    Quiet,
    Auto,
    Strong,
    Max,
}

impl FanSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanSpeed::Quiet => "quiet",
            FanSpeed::Auto => "auto",
            FanSpeed::Strong => "strong",
            FanSpeed::Max => "max",
        }
    }
}

impl std::fmt::Display for FanSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Begin a whole-home smart clean.
pub fn start_cleaning() -> Command {
    (CMD_CLEAN, json!({"mode": "smartClean", "globalCleanTimes": 1}))
}

/// Pause the cleaning cycle in place.
pub fn pause() -> Command {
    (CMD_PAUSE, json!({"cmd": "pause"}))
}

/// Abort an in-progress return to dock.
pub fn stop() -> Command {
    (CMD_DOCK, json!({"cmd": "stop"}))
}

/// Send the robot back to its charging base.
pub fn return_to_dock() -> Command {
    (CMD_DOCK, json!({"cmd": "start"}))
}

/// Set the suction level for whole-home cleaning.
pub fn set_fan_speed(speed: FanSpeed) -> Command {
    (CMD_FAN_SPEED, json!({"cmd": speed.as_str(), "cleanType": "total"}))
}

/// Toggle the status LED.
pub fn set_led(on: bool) -> Command {
    (CMD_SETTING, json!({"cmd": "setledswitch", "value": i32::from(on)}))
}

/// Toggle soft wall-follow (collision prevention).
pub fn set_collision_prevention(on: bool) -> Command {
    (CMD_SETTING, json!({"cmd": "setSoftAlongWall", "value": i32::from(on)}))
}

/// Toggle automatic suction boost on carpet.
pub fn set_auto_boost(on: bool) -> Command {
    (CMD_SETTING, json!({"cmd": "setAutoBoost", "value": i32::from(on)}))
}

/// Speaker volume, 0 (mute) through 10 (max). Values above 10 are clamped.
pub fn set_volume(level: u8) -> Command {
    (CMD_SETTING, json!({"cmd": "setVolume", "value": level.min(10)}))
}

/// Make the robot beep so it can be found.
pub fn locate() -> Command {
    (CMD_CTRL, json!({"ctrlCode": 3010}))
}

/// Reboot the device.
pub fn reboot() -> Command {
    (CMD_SETTING, json!({"cmd": "reboot", "value": 20}))
}

// Error codes reported in the `errorState` telemetry field.
pub const ERROR_NO_WATERTANK: i64 = -2602;
pub const ERROR_NO_DUSTBIN: i64 = -2406;
pub const ERROR_FLOOR_UNEVEN: i64 = -2304;
pub const ERROR_NOT_ON_FLOOR: i64 = -2601;
pub const ERROR_STUCK: i64 = -2502;

/// Human-readable description for a known `errorState` code.
pub fn describe_error(code: i64) -> Option<&'static str> {
    match code {
        ERROR_NO_WATERTANK => Some("water tank not installed"),
        ERROR_NO_DUSTBIN => Some("dustbin not installed"),
        ERROR_FLOOR_UNEVEN => Some("floor too uneven"),
        ERROR_NOT_ON_FLOOR => Some("robot not on the floor"),
        ERROR_STUCK => Some("robot is stuck"),
        _ => None,
    }
}
