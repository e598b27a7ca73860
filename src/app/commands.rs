//! Inbound commands and settings.
//!
//! Two text surfaces feed the service: command lines (`status`,
//! `flush 3000`, `heater on`, ...) and `key=value` setting lines.  Both are
//! resolved through static dispatch tables so adapters (serial console,
//! message bus, screen link) share one parser.  Keys and command words
//! are case-insensitive.
//!
//! Setting handlers only touch a candidate [`SystemConfig`]; the service
//! validates the candidate before it replaces the live config.  Keys that
//! trigger an action instead of (or besides) a config change report it as
//! a [`SettingAction`].

use crate::app::ports::Led;
use crate::config::{BrewMode, ProfilingMode, ProfilingSource, ProfilingTarget, SystemConfig};
use crate::error::CommandError;
use crate::pins::{AdcChannel, InputPin, OutputPin};
use crate::profile::EspressoProfile;

// ───────────────────────────────────────────────────────────────
// Commands
// ───────────────────────────────────────────────────────────────

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Help,
    Status,
    LastError,
    /// DEBUG ↔ HEATING.
    ToggleDebug,
    /// Programmatic flush for the given milliseconds.
    Flush(u64),
    /// A `key=value` setting line.
    Set(String),
    PumpPid,
    CalibrateScale,
    CalibrateNext(f32),
    TareScale,

    // -- DEBUG only --
    Heater(bool),
    Pump(bool),
    FillValve(bool),
    /// Pump dimmer level, 0–100 %.
    Dimmer(f32),
    CheckLevelIc,
    ReadWeight,
    /// Manual heater duty; `None` hands control back to the loop.
    PidOutput(Option<f32>),
    Buzzer(bool),
    Led(Led, bool),
    WritePin(OutputPin, bool),
    ReadPin(InputPin),
    ReadAdc(AdcChannel),
    ReadHxTemp,
    ReadBoilerTemp,
    ComputedBoiler,
    ReadPressure,
    /// `None` toggles.
    RawData(Option<bool>),
}

impl AppCommand {
    /// Hardware pokes and raw reads are refused outside DEBUG.
    pub fn debug_only(&self) -> bool {
        matches!(
            self,
            Self::Heater(_)
                | Self::Pump(_)
                | Self::FillValve(_)
                | Self::Dimmer(_)
                | Self::CheckLevelIc
                | Self::ReadWeight
                | Self::PidOutput(_)
                | Self::Buzzer(_)
                | Self::Led(..)
                | Self::WritePin(..)
                | Self::ReadPin(_)
                | Self::ReadAdc(_)
                | Self::ReadHxTemp
                | Self::ReadBoilerTemp
                | Self::ComputedBoiler
                | Self::ReadPressure
                | Self::RawData(_)
        )
    }
}

pub type CommandParser = fn(Option<&str>) -> Result<AppCommand, CommandError>;

const COMMANDS: &[(&str, CommandParser)] = &[
    ("help", |_| Ok(AppCommand::Help)),
    ("status", |_| Ok(AppCommand::Status)),
    ("lasterror", |_| Ok(AppCommand::LastError)),
    ("debug", |_| Ok(AppCommand::ToggleDebug)),
    ("flush", parse_flush),
    ("set", |args| {
        let line = args.ok_or(CommandError::MissingArgument("set <key>=<value>"))?;
        Ok(AppCommand::Set(line.to_owned()))
    }),
    ("pumppid", |_| Ok(AppCommand::PumpPid)),
    ("calibratescale", |_| Ok(AppCommand::CalibrateScale)),
    ("calibratenext", |args| {
        // The tare step takes no weight.
        let grams = match args {
            Some(a) => parse_f32(a, "calibratenext <grams>")?,
            None => 0.0,
        };
        Ok(AppCommand::CalibrateNext(grams))
    }),
    ("tare_scale", |_| Ok(AppCommand::TareScale)),
    ("heater", |args| Ok(AppCommand::Heater(parse_on_off(args, "heater on|off")?))),
    ("pump", |args| Ok(AppCommand::Pump(parse_on_off(args, "pump on|off")?))),
    ("fillvalve", |args| Ok(AppCommand::FillValve(parse_on_off(args, "fillvalve on|off")?))),
    ("dimmer", |args| {
        let pct = parse_f32(require(args, "dimmer <0-100>")?, "dimmer <0-100>")?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(CommandError::InvalidValue("dimmer <0-100>"));
        }
        Ok(AppCommand::Dimmer(pct))
    }),
    ("checkic", |_| Ok(AppCommand::CheckLevelIc)),
    ("readweight", |_| Ok(AppCommand::ReadWeight)),
    ("pidoutput", parse_pid_output),
    ("buzzer", |args| Ok(AppCommand::Buzzer(parse_on_off(args, "buzzer on|off")?))),
    ("ledmain", |args| Ok(AppCommand::Led(Led::Main, parse_on_off(args, "ledmain on|off")?))),
    ("ledheater", |args| {
        Ok(AppCommand::Led(Led::Heater, parse_on_off(args, "ledheater on|off")?))
    }),
    ("ledwater", |args| Ok(AppCommand::Led(Led::Water, parse_on_off(args, "ledwater on|off")?))),
    ("writepin", parse_write_pin),
    ("readpin", |args| {
        let name = require(args, "readpin <name>")?;
        InputPin::from_name(name)
            .map(AppCommand::ReadPin)
            .ok_or(CommandError::InvalidValue("not an input pin"))
    }),
    ("readadc", |args| {
        let idx: u8 = require(args, "readadc <0-3>")?
            .parse()
            .map_err(|_| CommandError::InvalidValue("readadc <0-3>"))?;
        AdcChannel::from_index(idx)
            .map(AppCommand::ReadAdc)
            .ok_or(CommandError::InvalidValue("readadc <0-3>"))
    }),
    ("readhxtemp", |_| Ok(AppCommand::ReadHxTemp)),
    ("readboilertemp", |_| Ok(AppCommand::ReadBoilerTemp)),
    ("computedboiler", |_| Ok(AppCommand::ComputedBoiler)),
    ("readpress", |_| Ok(AppCommand::ReadPressure)),
    ("rawdata", |args| {
        let mode = match args.map(str::to_ascii_lowercase).as_deref() {
            Some("on") => Some(true),
            Some("off") => Some(false),
            _ => None,
        };
        Ok(AppCommand::RawData(mode))
    }),
];

/// Parse one command line: the first word selects the handler, the rest
/// is its argument string.
pub fn parse_command(line: &str) -> Result<AppCommand, CommandError> {
    let line = line.trim();
    let (word, args) = match line.split_once(char::is_whitespace) {
        Some((w, rest)) => (w, Some(rest.trim()).filter(|a| !a.is_empty())),
        None => (line, None),
    };
    COMMANDS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(word))
        .ok_or(CommandError::UnknownCommand)
        .and_then(|(_, parse)| parse(args))
}

/// Words understood by [`parse_command`], in help order.
pub fn command_names() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|(name, _)| *name)
}

fn parse_flush(args: Option<&str>) -> Result<AppCommand, CommandError> {
    let ms: u64 = require(args, "flush <ms>")?
        .parse()
        .map_err(|_| CommandError::InvalidValue("flush <ms>"))?;
    Ok(AppCommand::Flush(ms))
}

fn parse_pid_output(args: Option<&str>) -> Result<AppCommand, CommandError> {
    let arg = require(args, "pidoutput <0-100|auto>")?;
    if arg.eq_ignore_ascii_case("auto") {
        return Ok(AppCommand::PidOutput(None));
    }
    let pct = parse_f32(arg, "pidoutput <0-100|auto>")?;
    if !(0.0..=100.0).contains(&pct) {
        return Err(CommandError::InvalidValue("pidoutput <0-100|auto>"));
    }
    Ok(AppCommand::PidOutput(Some(pct)))
}

fn parse_write_pin(args: Option<&str>) -> Result<AppCommand, CommandError> {
    let usage = "writepin <name> <high|low>";
    let mut parts = require(args, usage)?.split_whitespace();
    let (Some(name), Some(level)) = (parts.next(), parts.next()) else {
        return Err(CommandError::MissingArgument(usage));
    };
    let pin = OutputPin::from_name(name).ok_or(CommandError::InvalidValue("not an output pin"))?;
    let high = match level.to_ascii_lowercase().as_str() {
        "high" | "hi" | "1" => true,
        "low" | "lo" | "0" => false,
        _ => return Err(CommandError::InvalidValue(usage)),
    };
    Ok(AppCommand::WritePin(pin, high))
}

fn require<'a>(args: Option<&'a str>, usage: &'static str) -> Result<&'a str, CommandError> {
    args.ok_or(CommandError::MissingArgument(usage))
}

fn parse_on_off(args: Option<&str>, usage: &'static str) -> Result<bool, CommandError> {
    match require(args, usage)?.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(CommandError::InvalidValue(usage)),
    }
}

fn parse_f32(s: &str, what: &'static str) -> Result<f32, CommandError> {
    s.trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(CommandError::InvalidValue(what))
}

// ───────────────────────────────────────────────────────────────
// Settings
// ───────────────────────────────────────────────────────────────

/// What the service still has to do after a setting handler ran.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingAction {
    /// Only the config changed (possibly not at all).
    Stored,
    TareScale,
    StartCalibration,
    CalibrationStep(f32),
    StartCleaning,
    /// Republish telemetry.
    Request,
    /// Recognised key whose value asks for nothing (`tare_scale=false`).
    Ignored,
}

pub type SettingHandler = fn(&mut SystemConfig, &str) -> Result<SettingAction, CommandError>;

const SETTINGS: &[(&str, SettingHandler)] = &[
    ("mqtt_server", |c, v| set_string(&mut c.mqtt_server, v, "mqtt_server too long")),
    ("mqtt_port", |c, v| {
        c.mqtt_port = v
            .trim()
            .parse()
            .map_err(|_| CommandError::InvalidValue("mqtt_port"))?;
        Ok(SettingAction::Stored)
    }),
    ("mqtt_user", |c, v| set_string(&mut c.mqtt_user, v, "mqtt_user too long")),
    ("mqtt_password", |c, v| set_string(&mut c.mqtt_password, v, "mqtt_password too long")),
    ("tempsetbrew", |c, v| {
        if v.trim().eq_ignore_ascii_case("auto") {
            c.brew_temp_override = false;
            return Ok(SettingAction::Stored);
        }
        let t = parse_f32(v, "tempsetbrew")?;
        if t <= 0.0 {
            return Err(CommandError::InvalidValue("tempsetbrew must be > 0"));
        }
        c.brew_temp_c = t;
        c.brew_temp_override = true;
        Ok(SettingAction::Stored)
    }),
    ("tempsetsteam", |c, v| store(&mut c.steam_temp_c, v, "tempsetsteam")),
    ("tempsetsteamboost", |c, v| store(&mut c.steam_boost_temp_c, v, "tempsetsteamboost")),
    ("kp_temperature", |c, v| store(&mut c.heater_gains.kp, v, "kp_temperature")),
    ("ki_temperature", |c, v| store(&mut c.heater_gains.ki, v, "ki_temperature")),
    ("kd_temperature", |c, v| store(&mut c.heater_gains.kd, v, "kd_temperature")),
    ("kp_pressure", |c, v| store(&mut c.pressure_gains.kp, v, "kp_pressure")),
    ("ki_pressure", |c, v| store(&mut c.pressure_gains.ki, v, "ki_pressure")),
    ("kd_pressure", |c, v| store(&mut c.pressure_gains.kd, v, "kd_pressure")),
    ("kp_flow", |c, v| store(&mut c.flow_gains.kp, v, "kp_flow")),
    ("ki_flow", |c, v| store(&mut c.flow_gains.ki, v, "ki_flow")),
    ("kd_flow", |c, v| store(&mut c.flow_gains.kd, v, "kd_flow")),
    ("flow_kalman_me", |c, v| store(&mut c.flow_kalman.measurement_error, v, "flow_kalman_me")),
    ("flow_kalman_e", |c, v| store(&mut c.flow_kalman.estimate_error, v, "flow_kalman_e")),
    ("flow_kalman_q", |c, v| store(&mut c.flow_kalman.process_noise, v, "flow_kalman_q")),
    ("weight_kalman_me", |c, v| {
        store(&mut c.weight_kalman.measurement_error, v, "weight_kalman_me")
    }),
    ("weight_kalman_e", |c, v| store(&mut c.weight_kalman.estimate_error, v, "weight_kalman_e")),
    ("weight_kalman_q", |c, v| store(&mut c.weight_kalman.process_noise, v, "weight_kalman_q")),
    ("tare_scale", |_, v| {
        Ok(if parse_flag(v) == Some(true) {
            SettingAction::TareScale
        } else {
            SettingAction::Ignored
        })
    }),
    ("calibratescale", |_, _| Ok(SettingAction::StartCalibration)),
    ("calibration_step", |_, v| {
        Ok(SettingAction::CalibrationStep(parse_f32(v, "calibration_step")?))
    }),
    ("profiling_mode", |c, v| {
        c.profiling_mode =
            ProfilingMode::parse(v.trim()).ok_or(CommandError::InvalidValue("profiling_mode"))?;
        Ok(SettingAction::Stored)
    }),
    ("profiling_source", |c, v| {
        let v = v.trim();
        c.profiling_source = if v.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(ProfilingSource::parse(v).ok_or(CommandError::InvalidValue("profiling_source"))?)
        };
        Ok(SettingAction::Stored)
    }),
    ("profiling_target", |c, v| {
        c.profiling_target = ProfilingTarget::parse(v.trim())
            .ok_or(CommandError::InvalidValue("profiling_target"))?;
        Ok(SettingAction::Stored)
    }),
    ("profiling_flat_value", |c, v| {
        store(&mut c.profiling_flat_value, v, "profiling_flat_value")
    }),
    ("profile_data", |c, v| {
        c.profile = EspressoProfile::from_json(v)?;
        Ok(SettingAction::Stored)
    }),
    ("start_cleaning", |_, v| {
        Ok(if parse_flag(v) == Some(true) {
            SettingAction::StartCleaning
        } else {
            SettingAction::Ignored
        })
    }),
    ("brewmode", |c, v| {
        match v.trim().to_ascii_lowercase().as_str() {
            "coffee" => {
                c.brew_mode = BrewMode::Coffee;
                c.brew_mode_override = true;
            }
            "steam" => {
                c.brew_mode = BrewMode::Steam;
                c.brew_mode_override = true;
            }
            "auto" => c.brew_mode_override = false,
            _ => return Err(CommandError::InvalidValue("brewmode coffee|steam|auto")),
        }
        Ok(SettingAction::Stored)
    }),
    ("steamboost", set_steam_boost),
    ("enablesteamboost", set_steam_boost),
    ("request", |_, _| Ok(SettingAction::Request)),
];

/// Split a `key=value` line and find the handler for `key`.  Returns the
/// canonical key name together with the raw value.
pub fn lookup_setting(line: &str) -> Result<(&'static str, &str, SettingHandler), CommandError> {
    let (key, value) = line.split_once('=').ok_or(CommandError::MissingSeparator)?;
    let key = key.trim();
    SETTINGS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(name, handler)| (*name, value, *handler))
        .ok_or(CommandError::UnknownKey)
}

/// Apply one setting line to `config`.  Convenience for callers that do
/// not need the key name.
pub fn apply_setting(config: &mut SystemConfig, line: &str) -> Result<SettingAction, CommandError> {
    let (_, value, handler) = lookup_setting(line)?;
    handler(config, value)
}

fn set_steam_boost(c: &mut SystemConfig, v: &str) -> Result<SettingAction, CommandError> {
    let on = parse_flag(v).ok_or(CommandError::InvalidValue("steamboost true|false"))?;
    c.steam_boost = on;
    c.brew_mode_override = true;
    Ok(SettingAction::Stored)
}

fn store(field: &mut f32, value: &str, key: &'static str) -> Result<SettingAction, CommandError> {
    *field = parse_f32(value, key)?;
    Ok(SettingAction::Stored)
}

fn set_string<const N: usize>(
    field: &mut heapless::String<N>,
    value: &str,
    too_long: &'static str,
) -> Result<SettingAction, CommandError> {
    let mut s = heapless::String::new();
    s.push_str(value.trim())
        .map_err(|()| CommandError::InvalidValue(too_long))?;
    *field = s;
    Ok(SettingAction::Stored)
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
