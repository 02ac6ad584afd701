//! Protocol constants and the ordered mapping tables.

use serde::{Deserialize, Serialize};

/// Timestamp format for `timeOfSample` and event timestamps
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.0Z";

pub const PAYLOAD_VERSION: &str = "3";

/// Entities that are never exposed, whatever the filter says
pub const NEVER_EXPOSED_ENTITIES: &[&str] = &["group.all_locks"];

pub const MANUFACTURER: &str = "Alexa Bridge";

/// Locales Unlock-by-voice is allowed in
pub const UNLOCK_LOCALES: &[&str] = &["de-DE", "en-US", "ja-JP"];

pub const LOCALES_ALL: &[&str] = &[
    "ar-SA", "de-DE", "en-AU", "en-CA", "en-GB", "en-IN", "en-US", "es-ES", "es-MX", "es-US",
    "fr-CA", "fr-FR", "hi-IN", "it-IT", "ja-JP", "nl-NL", "pl-PL", "pt-BR",
];

/// Doorbell events are not offered in every locale
pub const LOCALES_DOORBELL: &[&str] = &[
    "de-DE", "en-AU", "en-CA", "en-GB", "en-IN", "en-US", "es-ES", "es-MX", "es-US", "fr-CA",
    "fr-FR", "it-IT", "ja-JP",
];

/// Speaker/StepSpeaker volume control locales
pub const LOCALES_SPEAKER: &[&str] = &[
    "de-DE", "en-AU", "en-CA", "en-GB", "en-IN", "en-US", "es-ES", "es-MX", "fr-FR", "it-IT",
    "ja-JP",
];

/// Camera streaming is not offered in nl-NL or pl-PL
pub const LOCALES_CAMERA: &[&str] = &[
    "ar-SA", "de-DE", "en-AU", "en-CA", "en-GB", "en-IN", "en-US", "es-ES", "es-MX", "es-US",
    "fr-CA", "fr-FR", "hi-IN", "it-IT", "ja-JP", "pt-BR",
];

/// Interfaces only available in the US
pub const LOCALES_US: &[&str] = &["en-US"];

/// Backend HVAC mode -> Alexa thermostat mode.
///
/// Order matters: reverse lookups take the first matching row, so "off"
/// wins over "fan_only" for Alexa "OFF" and "heat_cool" over "auto".
pub const THERMOSTAT_MODES: &[(&str, &str)] = &[
    ("heat", "HEAT"),
    ("cool", "COOL"),
    ("heat_cool", "AUTO"),
    ("auto", "AUTO"),
    ("off", "OFF"),
    ("fan_only", "OFF"),
    ("dry", "CUSTOM"),
];

/// Backend HVAC mode -> Alexa custom mode name (thermostatMode CUSTOM)
pub const THERMOSTAT_MODES_CUSTOM: &[(&str, &str)] = &[("dry", "DEHUMIDIFY")];

/// Backend preset -> Alexa thermostat mode
pub const THERMOSTAT_PRESETS: &[(&str, &str)] = &[("eco", "ECO")];

/// Placeholder preset meaning "no preset active"
pub const PRESET_MODE_NA: &str = "-";

/// Fan speed tier -> percentage
pub const FAN_SPEED_PERCENTAGES: &[(&str, i64)] =
    &[("off", 0), ("low", 33), ("medium", 66), ("high", 100)];

/// Sound modes the EqualizerController can expose
pub const EQUALIZER_MODES: &[&str] = &["MOVIE", "MUSIC", "NIGHT", "SPORT", "TV"];

/// Normalized backend source name -> Alexa input name
pub const VALID_SOURCE_NAMES: &[(&str, &str)] = &[
    ("antenna", "ANTENNA"),
    ("airplay", "AIRPLAY"),
    ("aux", "AUX 1"),
    ("aux1", "AUX 1"),
    ("aux2", "AUX 2"),
    ("bluetooth", "BLUETOOTH"),
    ("bluray", "BLURAY"),
    ("cable", "CABLE"),
    ("cd", "CD"),
    ("coax", "COAX 1"),
    ("composite", "COMPOSITE 1"),
    ("dock", "DOCK"),
    ("dvd", "DVD"),
    ("game", "GAME"),
    ("gameconsole", "GAME"),
    ("hdmi", "HDMI 1"),
    ("hdmi1", "HDMI 1"),
    ("hdmi2", "HDMI 2"),
    ("hdmi3", "HDMI 3"),
    ("hdmi4", "HDMI 4"),
    ("hdmiarc", "HDMI ARC"),
    ("input1", "INPUT 1"),
    ("input2", "INPUT 2"),
    ("line1", "LINE 1"),
    ("mediaplayer", "MEDIA PLAYER"),
    ("optical", "OPTICAL 1"),
    ("phono", "PHONO"),
    ("playstation", "PLAYSTATION"),
    ("radio", "RADIO"),
    ("satellite", "SATELLITE"),
    ("satellitetv", "SATELLITE"),
    ("tape", "TAPE"),
    ("tuner", "TUNER"),
    ("tv", "TV"),
    ("usb", "USB 1"),
    ("video1", "VIDEO 1"),
    ("video2", "VIDEO 2"),
    ("xbox", "XBOX"),
];

/// First table row whose key matches
pub fn lookup<'a, V: Copy>(table: &'a [(&'a str, V)], key: &str) -> Option<V> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// First backend key mapping to `value`, restricted to `candidates`
pub fn reverse_lookup<'a>(
    table: &'a [(&'a str, &'a str)],
    value: &str,
    candidates: &[String],
) -> Option<&'a str> {
    table
        .iter()
        .find(|(k, v)| *v == value && candidates.iter().any(|c| c == k))
        .map(|(k, _)| *k)
}

/// Lowercase and drop separators, as done for source names
pub fn normalize_source(source: &str) -> String {
    source
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' '))
        .collect()
}

/// Temperature unit the backend displays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempUnit {
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    /// Alexa `scale` token
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Celsius => "CELSIUS",
            Self::Fahrenheit => "FAHRENHEIT",
        }
    }

    /// Parse a backend unit string ("°C", "°F", "C", "F")
    pub fn from_unit(unit: &str) -> Option<Self> {
        match unit.trim_start_matches('°') {
            "C" => Some(Self::Celsius),
            "F" => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}

/// Alexa display categories
pub mod display_category {
    pub const ACTIVITY_TRIGGER: &str = "ACTIVITY_TRIGGER";
    pub const CAMERA: &str = "CAMERA";
    pub const CONTACT_SENSOR: &str = "CONTACT_SENSOR";
    pub const DOOR: &str = "DOOR";
    pub const DOORBELL: &str = "DOORBELL";
    pub const EXTERIOR_BLIND: &str = "EXTERIOR_BLIND";
    pub const FAN: &str = "FAN";
    pub const GARAGE_DOOR: &str = "GARAGE_DOOR";
    pub const INTERIOR_BLIND: &str = "INTERIOR_BLIND";
    pub const LIGHT: &str = "LIGHT";
    pub const MOTION_SENSOR: &str = "MOTION_SENSOR";
    pub const OTHER: &str = "OTHER";
    pub const REMOTE: &str = "REMOTE";
    pub const SCENE_TRIGGER: &str = "SCENE_TRIGGER";
    pub const SECURITY_PANEL: &str = "SECURITY_PANEL";
    pub const SMARTLOCK: &str = "SMARTLOCK";
    pub const SMARTPLUG: &str = "SMARTPLUG";
    pub const SPEAKER: &str = "SPEAKER";
    pub const SWITCH: &str = "SWITCH";
    pub const TEMPERATURE_SENSOR: &str = "TEMPERATURE_SENSOR";
    pub const THERMOSTAT: &str = "THERMOSTAT";
    pub const TV: &str = "TV";
    pub const VACUUM_CLEANER: &str = "VACUUM_CLEANER";
    pub const WATER_HEATER: &str = "WATER_HEATER";
}

/// `supported_features` bits reported by backend entities
pub mod features {
    pub mod alarm {
        pub const ARM_HOME: u64 = 1;
        pub const ARM_AWAY: u64 = 2;
        pub const ARM_NIGHT: u64 = 4;
    }

    pub mod camera {
        pub const STREAM: u64 = 2;
    }

    pub mod climate {
        pub const TARGET_TEMPERATURE: u64 = 1;
        pub const TARGET_TEMPERATURE_RANGE: u64 = 2;
        pub const TURN_OFF: u64 = 128;
        pub const TURN_ON: u64 = 256;
    }

    pub mod cover {
        pub const OPEN: u64 = 1;
        pub const CLOSE: u64 = 2;
        pub const SET_POSITION: u64 = 4;
        pub const STOP: u64 = 8;
        pub const OPEN_TILT: u64 = 16;
        pub const CLOSE_TILT: u64 = 32;
        pub const SET_TILT_POSITION: u64 = 128;
    }

    pub mod fan {
        pub const SET_SPEED: u64 = 1;
        pub const OSCILLATE: u64 = 2;
        pub const DIRECTION: u64 = 4;
        pub const PRESET_MODE: u64 = 8;
    }

    pub mod humidifier {
        pub const MODES: u64 = 1;
    }

    pub mod media_player {
        pub const PAUSE: u64 = 1;
        pub const SEEK: u64 = 2;
        pub const VOLUME_SET: u64 = 4;
        pub const VOLUME_MUTE: u64 = 8;
        pub const PREVIOUS_TRACK: u64 = 16;
        pub const NEXT_TRACK: u64 = 32;
        pub const TURN_ON: u64 = 128;
        pub const TURN_OFF: u64 = 256;
        pub const PLAY_MEDIA: u64 = 512;
        pub const VOLUME_STEP: u64 = 1024;
        pub const SELECT_SOURCE: u64 = 2048;
        pub const STOP: u64 = 4096;
        pub const PLAY: u64 = 16384;
        pub const SELECT_SOUND_MODE: u64 = 65536;
    }

    pub mod remote {
        pub const ACTIVITY: u64 = 4;
    }

    pub mod vacuum {
        pub const TURN_ON: u64 = 1;
        pub const TURN_OFF: u64 = 2;
        pub const PAUSE: u64 = 4;
        pub const RETURN_HOME: u64 = 16;
        pub const FAN_SPEED: u64 = 32;
        pub const START: u64 = 8192;
    }

    pub mod valve {
        pub const OPEN: u64 = 1;
        pub const CLOSE: u64 = 2;
        pub const SET_POSITION: u64 = 4;
        pub const STOP: u64 = 8;
    }

    pub mod water_heater {
        pub const TARGET_TEMPERATURE: u64 = 1;
        pub const OPERATION_MODE: u64 = 2;
        pub const ON_OFF: u64 = 8;
    }
}
